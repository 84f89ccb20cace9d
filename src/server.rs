//! Control socket server
//!
//! One connection is read, dispatched and answered before the next one is
//! accepted; the caller drives that loop (see `daemon`).

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::protocol::{format_status, Request, Response, Verb, MAX_REQUEST_LEN};
use crate::supervisor::{Launcher, ServiceStatus, Supervisor};

/// How long a client gets to send its request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Bind the control socket, replacing a stale one
    pub fn bind(path: &Path) -> std::io::Result<Self> {
        let _ = std::fs::remove_file(path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let listener = UnixListener::bind(path)?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn accept(&self) -> std::io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Read one request, dispatch it and write the response
pub async fn serve_connection<L: Launcher>(
    stream: UnixStream,
    supervisor: &mut Supervisor<L>,
) -> std::io::Result<()> {
    serve_within(stream, supervisor, REQUEST_TIMEOUT).await
}

/// A client that stays silent past `limit` is disconnected unanswered
async fn serve_within<L: Launcher>(
    mut stream: UnixStream,
    supervisor: &mut Supervisor<L>,
    limit: Duration,
) -> std::io::Result<()> {
    let line = match tokio::time::timeout(limit, read_request(&mut stream)).await {
        Ok(result) => result?,
        Err(_) => {
            log::warn!("Control client sent no request within {:?}", limit);
            return Ok(());
        }
    };

    let request = Request::parse(&line);
    log::debug!("Control request: {:?}", request);

    let response = dispatch(supervisor, &request);
    stream.write_all(response.to_string().as_bytes()).await?;
    stream.shutdown().await
}

/// Read up to the first newline, EOF, or the request size limit
async fn read_request(stream: &mut UnixStream) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(MAX_REQUEST_LEN);
    let mut chunk = [0u8; MAX_REQUEST_LEN];

    while buf.len() < MAX_REQUEST_LEN && !buf.contains(&b'\n') {
        let n = stream.read(&mut chunk[..MAX_REQUEST_LEN - buf.len()]).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Execute a request against the supervisor
///
/// Every verb checks the id first, so an unknown id always gets the same
/// answer.
pub fn dispatch<L: Launcher>(supervisor: &mut Supervisor<L>, request: &Request) -> Response {
    let id = request.id.as_str();
    if !supervisor.registry().contains(id) {
        return Response::NotFound;
    }

    let verb = match request.verb.parse::<Verb>() {
        Ok(verb) => verb,
        Err(unknown) => return Response::UnknownVerb(unknown),
    };

    match verb {
        Verb::Enable => match supervisor.set_enabled(id, true) {
            Ok(()) => Response::Enabled,
            Err(e) => Response::Failed(e.to_string()),
        },

        Verb::Disable => match supervisor.set_enabled(id, false) {
            Ok(()) => Response::Disabled,
            Err(e) => Response::Failed(e.to_string()),
        },

        Verb::Start => {
            supervisor.start_explicit(id);
            Response::Started
        }

        Verb::Stop => match supervisor.stop(id) {
            Ok(_) => Response::Stopped,
            Err(e) => Response::Failed(e.to_string()),
        },

        Verb::Restart => match supervisor.restart(id) {
            Ok(()) => Response::Restarted,
            Err(e) => Response::Failed(e.to_string()),
        },

        Verb::Status => status_block(supervisor, id),
    }
}

fn status_block<L: Launcher>(supervisor: &Supervisor<L>, id: &str) -> Response {
    let Some(def) = supervisor.registry().get(id) else {
        return Response::NotFound;
    };

    let status = supervisor.status(id);
    let log = if status == ServiceStatus::Running {
        supervisor.journal().matching(&def.name).unwrap_or_else(|e| {
            log::warn!(
                "Failed to read journal {}: {}",
                supervisor.journal().path().display(),
                e
            );
            Vec::new()
        })
    } else {
        Vec::new()
    };

    Response::Status(format_status(def, status, &log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;
    use crate::registry::ServiceRegistry;
    use crate::supervisor::ProcessLauncher;

    fn empty_supervisor(tag: &str) -> Supervisor {
        let path = std::env::temp_dir()
            .join(format!("moodberry-server-{}-{}", std::process::id(), tag))
            .join("journal.log");
        let journal = Journal::open(&path).unwrap();
        Supervisor::new(ServiceRegistry::new(), ProcessLauncher::new(), journal)
    }

    #[tokio::test]
    async fn test_silent_client_gets_no_answer() {
        let mut supervisor = empty_supervisor("silent");
        let (mut client, server) = UnixStream::pair().unwrap();

        serve_within(server, &mut supervisor, Duration::from_millis(50))
            .await
            .unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "");
    }

    #[tokio::test]
    async fn test_serve_answers_request() {
        let mut supervisor = empty_supervisor("answer");
        let (mut client, server) = UnixStream::pair().unwrap();
        client.write_all(b"ghost status\n").await.unwrap();

        serve_within(server, &mut supervisor, Duration::from_secs(5))
            .await
            .unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "Service not found\n");
    }

    #[tokio::test]
    async fn test_read_request_stops_at_newline() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        client.write_all(b"web status\ntrailing").await.unwrap();

        let line = read_request(&mut server).await.unwrap();
        assert_eq!(line, "web status");
    }

    #[tokio::test]
    async fn test_read_request_until_eof() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        client.write_all(b"db start").await.unwrap();
        client.shutdown().await.unwrap();

        let line = read_request(&mut server).await.unwrap();
        assert_eq!(line, "db start");
    }

    #[tokio::test]
    async fn test_read_request_is_bounded() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        let long = vec![b'x'; MAX_REQUEST_LEN * 2];
        client.write_all(&long).await.unwrap();

        let line = read_request(&mut server).await.unwrap();
        assert_eq!(line.len(), MAX_REQUEST_LEN);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let path = std::env::temp_dir().join(format!("moodberry-bind-{}.sock", std::process::id()));
        std::fs::write(&path, b"stale").unwrap();

        let server = ControlServer::bind(&path).unwrap();
        assert_eq!(server.path(), path.as_path());
        drop(server);
        assert!(!path.exists());
    }
}
