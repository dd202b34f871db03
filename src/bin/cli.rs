//! AtlasKV Client CLI
//!
//! Command-line interface for talking to a Redis-compatible server.

use std::process;
use std::time::Duration;

use atlaskv_client::{Client, Config, Endpoint, Reply};
use clap::{Parser, Subcommand};
use crossbeam::channel;
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasKV client CLI
#[derive(Parser, Debug)]
#[command(name = "atlaskv-client")]
#[command(about = "CLI for Redis-compatible key-value servers")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    server: String,

    /// Unix socket path; overrides --server
    #[arg(short = 'u', long)]
    socket: Option<String>,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Ping the server
    Ping,

    /// Send any command and print the raw reply
    Raw {
        /// Command words, e.g. `LRANGE list 0 -1`
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },

    /// Resend a command on an interval and print every reply
    Watch {
        /// Interval between sends in milliseconds
        #[arg(short, long, default_value = "1000")]
        interval_ms: u64,

        /// Stop after this many replies (0 runs until the connection drops)
        #[arg(short, long, default_value = "0")]
        count: usize,

        /// Command words
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,atlaskv_client=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let endpoint = match endpoint_from_args(&args) {
        Ok(endpoint) => endpoint,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    let config = Config::builder()
        .endpoint(endpoint)
        .blocking_timeout(Some(Duration::from_millis(args.timeout_ms)))
        .build();

    let client = match Client::connect(config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to connect: {}", e);
            process::exit(1);
        }
    };

    let status = match run(&client, args.command) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("(error) {}", e);
            1
        }
    };

    if let Err(e) = client.stop() {
        tracing::error!("Failed to stop client: {}", e);
    }
    process::exit(status);
}

fn endpoint_from_args(args: &Args) -> Result<Endpoint, String> {
    if let Some(path) = &args.socket {
        return Ok(Endpoint::unix(path));
    }

    let (host, port) = args
        .server
        .rsplit_once(':')
        .ok_or_else(|| format!("Server address must be host:port, got `{}`", args.server))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("Invalid port `{}`: {}", port, e))?;
    Ok(Endpoint::tcp(host, port))
}

fn run(client: &Client, command: Commands) -> atlaskv_client::Result<()> {
    match command {
        Commands::Get { key } => match client.get(&key)? {
            Some(value) => println!("\"{}\"", value),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            client.set(&key, &value)?;
            println!("OK");
        }
        Commands::Del { key } => println!("(integer) {}", client.del(&key)?),
        Commands::Ping => println!("{}", client.ping()?),
        Commands::Raw { words } => {
            let reply: Reply = client.submit_blocking(words.join(" "))?;
            print!("{}", format_reply(&reply, 0));
        }
        Commands::Watch {
            interval_ms,
            count,
            words,
        } => watch(client, words.join(" "), Duration::from_millis(interval_ms), count)?,
    }
    Ok(())
}

/// Print replies of a repeating command until `count` arrive or the client stops
fn watch(
    client: &Client,
    text: String,
    interval: Duration,
    count: usize,
) -> atlaskv_client::Result<()> {
    let (tx, rx) = channel::unbounded();

    let id = client
        .command::<Reply>(text)
        .repeat(interval)
        .callback(move |_, outcome| {
            let _ = tx.send(outcome);
        })
        .submit()?;

    let mut received = 0;
    while count == 0 || received < count {
        match rx.recv_timeout(interval + client.config().poll_interval * 10) {
            Ok(Ok(reply)) => print!("{}", format_reply(&reply, 0)),
            Ok(Err(e)) => println!("(error) {}", e),
            Err(channel::RecvTimeoutError::Timeout) => {
                if !client.is_running() {
                    break;
                }
                continue;
            }
            Err(channel::RecvTimeoutError::Disconnected) => break,
        }
        received += 1;
    }

    // Already released if the connection dropped
    client.cancel(id);
    Ok(())
}

/// Render a reply the way redis-cli does
fn format_reply(reply: &Reply, indent: usize) -> String {
    match reply {
        Reply::Status(s) => format!("{}\n", s),
        Reply::Error(e) => format!("(error) {}\n", e),
        Reply::Integer(n) => format!("(integer) {}\n", n),
        Reply::Bulk(bytes) => format!("\"{}\"\n", String::from_utf8_lossy(bytes)),
        Reply::Nil => "(nil)\n".to_string(),
        Reply::Array(items) if items.is_empty() => "(empty array)\n".to_string(),
        Reply::Array(items) => {
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(&" ".repeat(indent));
                }
                let prefix = format!("{}) ", i + 1);
                out.push_str(&prefix);
                out.push_str(&format_reply(item, indent + prefix.len()));
            }
            out
        }
    }
}
