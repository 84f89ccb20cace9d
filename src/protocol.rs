//! Control channel protocol
//!
//! A request is one line, `<id> <verb>`. The response is plain UTF-8 text
//! and the server closes the connection after writing it.

use std::fmt;
use std::str::FromStr;

use crate::registry::ServiceDefinition;
use crate::supervisor::ServiceStatus;

pub const SOCKET_PATH: &str = "/run/moodberry.sock";

/// Longest request the server will read
pub const MAX_REQUEST_LEN: usize = 128;

/// Control verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    Status,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Status => "status",
        }
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "status" => Ok(Self::Status),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as read off the socket
///
/// The verb is kept as text: an unknown id must be reported before an
/// unknown verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: String,
    pub verb: String,
}

impl Request {
    /// Split a request into its first two whitespace-separated words
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        Self {
            id: words.next().unwrap_or_default().to_string(),
            verb: words.next().unwrap_or_default().to_string(),
        }
    }

    pub fn new(id: &str, verb: Verb) -> Self {
        Self {
            id: id.to_string(),
            verb: verb.as_str().to_string(),
        }
    }

    /// Wire form, newline terminated
    pub fn to_line(&self) -> String {
        format!("{} {}\n", self.id, self.verb)
    }
}

/// Response written back to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Enabled,
    Disabled,
    Started,
    Stopped,
    Restarted,
    /// Pre-rendered status block
    Status(String),
    NotFound,
    UnknownVerb(String),
    Failed(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => writeln!(f, "Enabled"),
            Self::Disabled => writeln!(f, "Disabled"),
            Self::Started => writeln!(f, "Started"),
            Self::Stopped => writeln!(f, "Stopped"),
            Self::Restarted => writeln!(f, "Restarted"),
            Self::Status(block) => f.write_str(block),
            Self::NotFound => writeln!(f, "Service not found"),
            Self::UnknownVerb(verb) => writeln!(f, "Unknown command: {}", verb),
            Self::Failed(reason) => writeln!(f, "Failed: {}", reason),
        }
    }
}

/// Render the status block for one service
///
/// Only a running service gets the detail lines and its journal excerpt.
pub fn format_status(def: &ServiceDefinition, status: ServiceStatus, log: &[String]) -> String {
    let mut out = format!("{} {}: \"{}\"\n", status.icon(), def.id, def.name);

    if status == ServiceStatus::Running {
        out.push_str(&format!("    Description: \"{}\"\n", def.description));
        out.push_str(&format!("    Start: {}\n", def.start_command));
        out.push_str(&format!("    Enabled?: {}\n", def.enabled));
        out.push_str("    Log:\n");
        for line in log {
            out.push_str(line);
            out.push('\n');
        }
    }

    out
}
