use std::io::BufRead;
use std::sync::mpsc as std_mpsc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use volume_bridge_lib::config::DEFAULT_BAUD_RATE;
use volume_bridge_lib::{Bridge, BridgeConfig, SessionEvent};

#[derive(Parser, Debug)]
#[command(name = "volume-bridge")]
#[command(version)]
#[command(about = "Bridge audio endpoint volume to a serial hardware controller", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Serial baud rate
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// List active audio output devices
    Devices,
    /// Print the volume of a device
    GetVolume { index: usize },
    /// Set the volume of a device (0.0 - 1.0)
    SetVolume { index: usize, level: f32 },
    /// Stream telemetry lines from a port until Enter is pressed
    Monitor {
        port: String,
        /// Print every event as a JSON line
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = BridgeConfig::default();
    config.session.baud_rate = cli.baud;
    let mut bridge = Bridge::new(config).context("Failed to start bridge")?;

    match cli.command {
        Command::Ports => {
            for port in bridge.list_ports() {
                println!("{}", port);
            }
        }
        Command::Devices => {
            for (index, device) in bridge.list_devices().iter().enumerate() {
                println!("{}: {}", index, device.display_name);
            }
        }
        Command::GetVolume { index } => {
            let level = bridge
                .display_volume(index)
                .with_context(|| format!("Failed to read volume of device {}", index))?;
            println!("{:.2}", level);
        }
        Command::SetVolume { index, level } => {
            let written = bridge
                .set_volume(index, level)
                .with_context(|| format!("Failed to set volume of device {}", index))?;
            println!("{:.2}", written);
        }
        Command::Monitor { port, json } => monitor(&mut bridge, &port, cli.baud, json)?,
    }

    Ok(())
}

fn monitor(bridge: &mut Bridge, port: &str, baud: u32, json: bool) -> Result<()> {
    let events = bridge.take_events().context("Telemetry stream already taken")?;
    bridge
        .start(port)
        .with_context(|| format!("Failed to open {}", port))?;
    eprintln!("Monitoring {} at {} baud, press Enter to stop", port, baud);

    let (done_tx, done_rx) = std_mpsc::channel::<()>();

    let printer_done = done_tx.clone();
    let printer = thread::spawn(move || {
        let result = print_events(events, json);
        let _ = printer_done.send(());
        result
    });

    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = done_tx.send(());
    });

    let _ = done_rx.recv();
    bridge.stop().context("Failed to stop session")?;

    match printer.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("Telemetry printer panicked"),
    }
}

/// Print events until the session reports Closed
fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>, json: bool) -> Result<()> {
    while let Some(event) = events.blocking_recv() {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            match &event {
                SessionEvent::Opened { port, .. } => eprintln!("Opened {}", port),
                SessionEvent::Line(line) => println!("{}", line.text),
                SessionEvent::Closed { port, reason, .. } => eprintln!("Closed {}: {:?}", port, reason),
            }
        }
        if let SessionEvent::Closed { .. } = event {
            break;
        }
    }
    Ok(())
}
