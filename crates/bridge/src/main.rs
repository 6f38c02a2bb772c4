//! usbdevinfo bridge
//!
//! Device-info bridge service. Enumerates USB and input-subsystem devices
//! into one deduplicated catalog, decodes descriptor trees, and coordinates
//! asynchronous permission grants. Front-ends drive it over line-delimited
//! JSON on stdin/stdout: one method call per line in, one reply or push
//! event per line out.

use anyhow::{Context, Result};
use bridge::config::BridgeConfig;
use bridge::dispatch::{DispatchOptions, dispatch};
use bridge::platform::Platform;
use bridge::platform::sim::SimPlatform;
use bridge::usb::spawn_bridge_worker;
use clap::Parser;
use common::{BridgeCommand, BridgeHandle, create_bridge, setup_logging};
use protocol::{BridgeEvent, MethodCall};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "usbdevinfo-bridge")]
#[command(
    author,
    version,
    about = "USB device-info bridge - enumerate devices and broker permission grants"
)]
#[command(long_about = "
Serves a merged catalog of USB and input-subsystem devices over a
line-delimited JSON protocol on stdin/stdout. Each request line is a
method call ({\"id\":1,\"method\":\"listDevices\"}); each output line is a
reply or a push event (devices_changed, permission_result).

EXAMPLES:
    # Run with default config
    usbdevinfo-bridge

    # Run with custom config
    usbdevinfo-bridge --config /path/to/bridge.toml

    # Print the device catalog and exit
    usbdevinfo-bridge --list-devices

    # Run with debug logging
    usbdevinfo-bridge --log-level debug

CONFIGURATION:
    The bridge looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usbdevinfo/bridge.toml
    3. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Print the device catalog and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = BridgeConfig::default();
        let path = BridgeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        BridgeConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        BridgeConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.bridge.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usbdevinfo-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let platform: Box<dyn Platform> =
        Box::new(SimPlatform::with_demo_fixtures(config.demo.auto_grant));

    let (bridge, worker) = create_bridge();
    let worker_handle = spawn_bridge_worker(worker, platform);

    let result = if args.list_devices {
        list_devices_mode(&bridge).await
    } else {
        serve(&bridge, &config).await
    };

    info!("Shutting down device worker...");
    if let Err(e) = bridge.send_command(BridgeCommand::Shutdown).await {
        error!("Error shutting down device worker: {:#}", e);
    }
    match worker_handle.join() {
        Ok(Err(e)) => error!("Device worker error: {:#}", e),
        Err(e) => error!("Device worker thread panicked: {:?}", e),
        Ok(Ok(())) => {}
    }

    result
}

/// Print the device catalog and exit
async fn list_devices_mode(bridge: &BridgeHandle) -> Result<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    bridge
        .send_command(BridgeCommand::ListDevices { response: tx })
        .await
        .context("Failed to send ListDevices command")?;

    let devices = rx
        .await
        .context("Failed to receive device list")?
        .context("Failed to enumerate devices")?;

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Found {} device(s):\n", devices.len());
    for device in devices {
        println!(
            "  [{}] {:04x}:{:04x} - {} {}",
            device.device_key,
            device.vendor_id,
            device.product_id,
            device
                .manufacturer_name
                .as_deref()
                .unwrap_or("Unknown Manufacturer"),
            device.product_name.as_deref().unwrap_or("Unknown Product")
        );
        println!(
            "      Class {:02x}:{:02x}:{:02x} Interfaces: {} Permission: {}",
            device.device_class,
            device.device_subclass,
            device.device_protocol,
            device.interface_count,
            if device.has_permission { "yes" } else { "no" }
        );
        if let Some(speed) = &device.speed {
            println!("      Speed: {}", speed);
        }
        if let Some(serial) = &device.serial_number {
            println!("      Serial: {}", serial);
        }
        println!();
    }

    Ok(())
}

/// Serve the JSON line protocol on stdin/stdout until EOF or Ctrl+C
async fn serve(bridge: &BridgeHandle, config: &BridgeConfig) -> Result<()> {
    let options = DispatchOptions {
        permission_timeout: config.permission_timeout(),
    };

    // Push events interleave with replies; stdout locks per line so they
    // never tear.
    let event_bridge = bridge.clone();
    let event_pump = tokio::spawn(async move {
        while let Ok(event) = event_bridge.recv_event().await {
            emit(&event);
        }
    });

    emit(&BridgeEvent::Ready);
    info!("Bridge ready, serving on stdin/stdout");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read from stdin")? {
                    Some(line) => handle_line(bridge, options, &line).await,
                    None => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                break;
            }
        }
    }

    event_pump.abort();
    Ok(())
}

async fn handle_line(bridge: &BridgeHandle, options: DispatchOptions, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let call: MethodCall = match serde_json::from_str(line) {
        Ok(call) => call,
        Err(e) => {
            // No usable call id to reply to; log and move on.
            warn!("discarding malformed request line: {e}");
            return;
        }
    };

    // Dispatch concurrently: a permission request pends until the OS
    // verdict arrives and must not stall later calls.
    let bridge = bridge.clone();
    tokio::spawn(async move {
        let reply = dispatch(&bridge, options, call).await;
        emit(&reply);
    });
}

fn emit<T: serde::Serialize>(message: &T) {
    match serde_json::to_string(message) {
        Ok(json) => println!("{json}"),
        Err(e) => debug!("failed to serialize outgoing message: {e}"),
    }
}
