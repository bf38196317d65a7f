//! Command-line monitor.
//!
//! Opens one serial port, UDP socket or TCP server, prints everything that
//! arrives with a timestamp, and sends each line typed on stdin back over
//! the channel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{self, SignalKind};

use portmon::config::{self, DEFAULT_BAUD_RATE, DEFAULT_PORT};
use portmon::display::{self, LogFile};
use portmon::tracing::{self, prelude::*};
use portmon::transport::serial::available_ports;
use portmon::{
    Chunk, Controller, ControllerConfig, LifecycleEvent, Observer, SendError, TransportConfig,
};

#[derive(Parser)]
#[command(name = "portmon", version, about = "Monitor a serial port, UDP socket or TCP connection")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Show received bytes as hex
    #[arg(long, global = true)]
    hex: bool,

    /// Append every displayed line to monitor_log.txt
    #[arg(long, global = true)]
    log: bool,

    /// Append every displayed line to this file instead
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Mode {
    /// Monitor a serial device
    Serial {
        /// Device path, e.g. /dev/ttyUSB0
        path: String,

        #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
        baud: u32,

        /// Read timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Listen for UDP datagrams
    Udp {
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Where to send commands before any datagram has arrived
        #[arg(long)]
        peer: Option<SocketAddr>,
    },
    /// Wait for one TCP connection
    Tcp {
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// List serial devices and exit
    ListPorts,
}

/// Prints to stdout and mirrors into the capture file.
struct Console {
    hex: bool,
    log: Option<Mutex<LogFile>>,
}

impl Console {
    fn print(&self, text: &str) {
        let line = display::stamp(text);
        println!("{line}");
        if let Some(log) = &self.log {
            let mut log = log.lock();
            if let Err(e) = log.append_line(&line) {
                warn!(path = %log.path().display(), error = %e, "Failed to write log file");
            }
        }
    }
}

impl Observer for Console {
    fn on_chunk(&self, chunk: &Chunk) {
        self.print(&display::render_chunk(chunk, self.hex));
    }

    fn on_event(&self, event: LifecycleEvent) {
        self.print(&display::render_event(&event));
    }
}

/// Build the transport for a monitoring mode; `None` for `list-ports`.
fn transport_config(mode: Mode, defaults: &ControllerConfig) -> Result<Option<TransportConfig>> {
    let config = match mode {
        Mode::Serial {
            path,
            baud,
            timeout_ms,
        } => TransportConfig::serial(path, baud).with_read_timeout(
            timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.serial_read_timeout),
        ),
        Mode::Udp { ip, port, peer } => {
            let udp = TransportConfig::udp(config::socket_addr(&ip, port)?);
            match peer {
                Some(peer) => udp.with_default_peer(peer),
                None => udp,
            }
        }
        Mode::Tcp { ip, port } => TransportConfig::tcp(config::socket_addr(&ip, port)?),
        Mode::ListPorts => return Ok(None),
    };
    Ok(Some(config))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stderr();
    let cli = Cli::parse();

    let defaults = ControllerConfig::from_env()?;
    let Some(transport) = transport_config(cli.mode, &defaults)? else {
        for port in available_ports()? {
            println!("{port}");
        }
        return Ok(());
    };

    let log_path = match (cli.log_file, cli.log) {
        (Some(path), _) => Some(path),
        (None, true) => Some(PathBuf::from(display::DEFAULT_LOG_FILE)),
        (None, false) => None,
    };
    let log = match log_path {
        Some(path) => Some(Mutex::new(
            LogFile::open(&path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => None,
    };
    let console = Arc::new(Console { hex: cli.hex, log });

    let mut controller = Controller::with_config(console.clone(), defaults);
    let waits_for_peer = transport.mode().awaits_peer();
    controller.start(transport).await?;
    if let (true, Some(addr)) = (waits_for_peer, controller.local_addr()) {
        console.print(&format!("TCP server started on {addr}. Waiting for connection..."));
    }
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
            _ = controller.wait_until_idle() => {
                info!("Session ended.");
                break;
            }
            line = commands.next_line(), if stdin_open => match line? {
                Some(command) if command.is_empty() => {}
                Some(command) => match controller.send(command.as_bytes()).await {
                    Ok(()) => console.print(&format!("Sent: {command}")),
                    // Write failures were already reported as events
                    Err(SendError::NotConnected) => {
                        console.print("Error sending command: not connected")
                    }
                    Err(_) => {}
                },
                None => stdin_open = false,
            },
        }
    }

    trace!("Shutting down.");
    controller.stop().await;
    info!("Exiting.");
    Ok(())
}
