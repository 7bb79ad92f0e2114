//! Headless VNC client example - connect and log server events.
//!
//! Usage:
//!   cargo run --example headless_connect -- localhost:5900 [password]

use rfb_client::{ClientConfig, ClientConn, ServerEvent};
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let Some(address) = args.next() else {
        eprintln!("usage: headless_connect <host>:<port> [password]");
        std::process::exit(2);
    };
    let password = args.next();

    info!("connecting to {}", address);
    let socket = tokio::net::TcpStream::connect(&address).await?;

    let (events_tx, events_rx) = flume::bounded(32);
    let mut config = match password {
        Some(password) => ClientConfig::with_password(password),
        None => ClientConfig::default(),
    };
    config.events = Some(events_tx);

    let conn = match ClientConn::connect(socket, config).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("connection failed: {}", e);
            return Err(e.into());
        }
    };

    let (width, height) = conn.framebuffer_size();
    info!("desktop \"{}\" is {}x{}", conn.desktop_name(), width, height);

    // Full update first, incremental from then on.
    conn.framebuffer_update_request(false, 0, 0, width, height)
        .await?;

    while let Ok(event) = events_rx.recv_async().await {
        match event {
            ServerEvent::FramebufferUpdate(update) => {
                info!("update: {} rectangles", update.rectangles.len());
                conn.request_update().await?;
            }
            ServerEvent::SetColorMapEntries(entries) => {
                info!("color map: {} entries", entries.colors.len());
            }
            ServerEvent::Bell => info!("bell"),
            ServerEvent::ServerCutText(cut) => info!("clipboard: {:?}", cut.text),
            ServerEvent::Custom(message) => {
                info!(
                    "custom message {}: {} bytes",
                    message.message_type,
                    message.payload.len()
                );
            }
            ServerEvent::Disconnected { reason } => {
                match reason {
                    Some(reason) => error!("disconnected: {}", reason),
                    None => info!("disconnected"),
                }
                break;
            }
        }
    }

    info!(
        "session totals: {} bytes in, {} bytes out",
        conn.bytes_received(),
        conn.bytes_sent()
    );
    Ok(())
}
