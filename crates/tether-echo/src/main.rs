use std::thread;
use std::time::Duration;

use clap::Parser;
use tether_net::config::DEFAULT_QUEUE_WARN_WATERMARK;
use tether_net::{Event, MAX_PAYLOAD, NetConfig, Server};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Tether echo server
#[derive(Parser, Debug)]
#[command(name = "tether-echo")]
#[command(about = "Echoes every framed message back to its sender", long_about = None)]
struct Args {
    /// TCP bind address
    #[arg(short, long, default_value = "0.0.0.0:7777")]
    bind: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    /// Maximum payload size in bytes (capped at 65535)
    #[arg(long, default_value_t = MAX_PAYLOAD)]
    max_payload: usize,

    /// Warn when this many events are waiting in the inbound queue
    #[arg(long, default_value_t = DEFAULT_QUEUE_WARN_WATERMARK)]
    queue_warn_watermark: usize,

    /// Drop connections that stay silent for N seconds (0 disables)
    #[arg(long, default_value_t = 0)]
    read_timeout_secs: u64,

    /// Sleep between polls of the inbound queue, in milliseconds
    #[arg(long, default_value_t = 1)]
    poll_interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = NetConfig {
        max_payload: args.max_payload,
        queue_warn_watermark: args.queue_warn_watermark,
        read_timeout: (args.read_timeout_secs > 0)
            .then(|| Duration::from_secs(args.read_timeout_secs)),
        ..NetConfig::default()
    };

    let server = Server::listen(args.bind.as_str(), config)?;
    info!("Echo server started on {}", server.local_addr());
    info!("Log level: {}", args.log_level);

    let tick = Duration::from_millis(args.poll_interval_ms);
    loop {
        while let Some(ev) = server.get_next_event() {
            match ev {
                Event::Connected { conn_id } => {
                    info!(conn_id, peer = ?server.peer_addr(conn_id), "Client connected");
                }
                Event::Data { conn_id, payload } => {
                    debug!(conn_id, len = payload.len(), "Echoing");
                    if let Err(e) = server.send(conn_id, &payload) {
                        warn!(conn_id, error = %e, "Echo failed");
                    }
                }
                Event::Disconnected { conn_id, reason } => {
                    info!(conn_id, %reason, "Client disconnected");
                }
            }
        }
        thread::sleep(tick);
    }
}
