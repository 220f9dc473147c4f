//! Relay server. Serves the chat page and fans messages out to every
//! connected browser.

use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use relay_hub::{HubConfig, RelayServer, ServerConfig};

/// Real-time message relay.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "RELAY_BIND", default_value = "0.0.0.0:3300")]
    bind: String,

    /// Directory served under /static
    #[arg(long, env = "RELAY_STATIC_DIR", default_value = "./static")]
    static_dir: PathBuf,

    /// Messages buffered ahead of the dispatcher
    #[arg(long, env = "RELAY_QUEUE_CAPACITY", default_value_t = HubConfig::default().queue_capacity)]
    queue_capacity: usize,

    /// Largest accepted inbound payload in bytes
    #[arg(long, env = "RELAY_MAX_MESSAGE_BYTES", default_value_t = HubConfig::default().max_message_bytes)]
    max_message_bytes: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind,
            static_dir: args.static_dir,
            hub: HubConfig {
                queue_capacity: args.queue_capacity,
                max_message_bytes: args.max_message_bytes,
            },
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl-C: {e}"),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting relay on {} (static files from {})",
        config.bind_addr,
        config.static_dir.display()
    );

    let server = RelayServer::new(config);
    if let Err(e) = server.run(shutdown_signal()).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["relay-server"]);
        let config = ServerConfig::from(args);
        assert_eq!(config.bind_addr, "0.0.0.0:3300");
        assert_eq!(config.static_dir, PathBuf::from("./static"));
        assert_eq!(config.hub.queue_capacity, 1024);
        assert_eq!(config.hub.max_message_bytes, 65536);
    }

    #[test]
    fn test_args_override() {
        let args = Args::parse_from([
            "relay-server",
            "--bind",
            "127.0.0.1:9000",
            "--queue-capacity",
            "8",
        ]);
        let config = ServerConfig::from(args);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.hub.queue_capacity, 8);
    }
}
