//! Entry point for `gbn-transfer`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing, exit status).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Env;

use gbn_transfer::config::{
    DEFAULT_MAX_TIMEOUTS, DEFAULT_TEARDOWN_REPEATS, DEFAULT_TICK, DEFAULT_TIMEOUT,
    DEFAULT_WINDOW,
};
use gbn_transfer::socket::UdpTransport;
use gbn_transfer::{receive_file, send_path, ReceiverConfig, SenderConfig};

/// Reliable file transfer over UDP with Go-Back-N.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a listening receiver.
    Send {
        /// Port the receiver listens on.
        outbound_port: u16,
        /// Port to listen on for ACKs.
        inbound_port: u16,
        /// File to send.
        source_path: PathBuf,
        /// Name the receiver stores the file under.
        dest_name: String,
        /// Receiver host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Window size N.
        #[arg(long, default_value_t = DEFAULT_WINDOW, value_parser = clap::value_parser!(u16).range(1..))]
        window: u16,
        /// Retransmission timeout in milliseconds.
        #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,
        /// Pause between sends in milliseconds.
        #[arg(long, default_value_t = DEFAULT_TICK.as_millis() as u64)]
        tick_ms: u64,
        /// Give up after this many timeouts in a row (0 = never).
        #[arg(long, default_value_t = DEFAULT_MAX_TIMEOUTS)]
        max_timeouts: u32,
    },
    /// Receive one file into a directory.
    Receive {
        /// Port to listen on for data.
        inbound_port: u16,
        /// Port the sender listens on for ACKs.
        outbound_port: u16,
        /// Directory to write the file into.
        output_dir: PathBuf,
        /// Sender host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Copies of the teardown ACK to send.
        #[arg(long, default_value_t = DEFAULT_TEARDOWN_REPEATS)]
        teardown_repeats: usize,
        /// Fail if nothing arrives for this many milliseconds.
        #[arg(long)]
        idle_timeout_ms: Option<u64>,
        /// Keep answering late end-of-file resends for this many milliseconds.
        #[arg(long, default_value_t = 0)]
        linger_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    // RUST_LOG controls verbosity.
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.mode {
        Mode::Send {
            outbound_port,
            inbound_port,
            source_path,
            dest_name,
            host,
            window,
            timeout_ms,
            tick_ms,
            max_timeouts,
        } => {
            let transport = bind(inbound_port, &host, outbound_port).await?;
            let config = SenderConfig {
                window_size: window,
                timeout: Duration::from_millis(timeout_ms),
                tick: Duration::from_millis(tick_ms),
                max_timeouts: (max_timeouts > 0).then_some(max_timeouts),
            };
            log::info!(
                "Sending {} to {} as {dest_name:?}",
                source_path.display(),
                transport.peer()
            );
            let report = send_path(&transport, &source_path, &dest_name, &config)
                .await
                .with_context(|| format!("sending {}", source_path.display()))?;
            log::info!(
                "Sent {} bytes in {} segments ({} transmissions, {} timeouts, {} duplicate ACKs)",
                report.bytes_sent,
                report.segments,
                report.transmissions,
                report.timeouts,
                report.duplicate_acks
            );
        }
        Mode::Receive {
            inbound_port,
            outbound_port,
            output_dir,
            host,
            teardown_repeats,
            idle_timeout_ms,
            linger_ms,
        } => {
            let transport = bind(inbound_port, &host, outbound_port).await?;
            let config = ReceiverConfig {
                teardown_repeats,
                idle_timeout: idle_timeout_ms.map(Duration::from_millis),
                linger: Duration::from_millis(linger_ms),
            };
            log::info!(
                "Listening on {} for a file, writing into {}",
                transport.local_addr()?,
                output_dir.display()
            );
            let report = receive_file(&transport, &output_dir, &config)
                .await
                .context("receiving file")?;
            log::info!(
                "Received {} bytes into {} ({} segments, {} duplicate ACKs)",
                report.bytes_written,
                report.path.display(),
                report.segments,
                report.duplicate_acks
            );
        }
    }
    Ok(())
}

/// Listen on `inbound_port` and address everything to `host:outbound_port`.
async fn bind(inbound_port: u16, host: &str, outbound_port: u16) -> anyhow::Result<UdpTransport> {
    let peer = tokio::net::lookup_host((host, outbound_port))
        .await
        .with_context(|| format!("resolving {host}"))?
        .next()
        .with_context(|| format!("no address for {host}"))?;
    let listen = SocketAddr::new(unspecified_like(&peer), inbound_port);
    Ok(UdpTransport::bind(listen, peer).await?)
}

fn unspecified_like(peer: &SocketAddr) -> std::net::IpAddr {
    match peer {
        SocketAddr::V4(_) => std::net::Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => std::net::Ipv6Addr::UNSPECIFIED.into(),
    }
}
