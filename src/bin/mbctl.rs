//! mbctl - CLI for moodberryd
//!
//! Sends one `<id> <verb>` request over /run/moodberry.sock and prints the
//! answer.

use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use moodberry::protocol::{Request, Response, Verb, SOCKET_PATH};

#[derive(Parser)]
#[command(name = "mbctl")]
#[command(about = "Control the moodberry service supervisor")]
struct Args {
    /// Control socket path
    #[arg(long, global = true, default_value = SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a service at boot
    Enable {
        /// Service id (descriptor name without .yml)
        id: String,
    },

    /// Skip a service at boot
    Disable {
        /// Service id
        id: String,
    },

    /// Start a service and its dependencies
    Start {
        /// Service id
        id: String,
    },

    /// Send SIGTERM to a service
    Stop {
        /// Service id
        id: String,
    },

    /// Stop and start a service again
    Restart {
        /// Service id
        id: String,
    },

    /// Show service status
    Status {
        /// Service id
        id: String,
    },
}

impl Command {
    fn request(self) -> Request {
        let (id, verb) = match self {
            Command::Enable { id } => (id, Verb::Enable),
            Command::Disable { id } => (id, Verb::Disable),
            Command::Start { id } => (id, Verb::Start),
            Command::Stop { id } => (id, Verb::Stop),
            Command::Restart { id } => (id, Verb::Restart),
            Command::Status { id } => (id, Verb::Status),
        };
        Request::new(&id, verb)
    }
}

fn call(socket: &Path, request: &Request) -> std::io::Result<String> {
    let mut stream = UnixStream::connect(socket)?;
    stream.write_all(request.to_line().as_bytes())?;
    stream.shutdown(Shutdown::Write)?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    Ok(response)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let request = args.command.request();
    log::debug!("Sending {:?} to {}", request, args.socket.display());

    match call(&args.socket, &request) {
        Ok(response) => {
            print!("{}", response);
            if response == Response::NotFound.to_string() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("mbctl: cannot reach daemon at {}: {}", args.socket.display(), e);
            eprintln!("  start with: sudo moodberryd");
            std::process::exit(1);
        }
    }
}
