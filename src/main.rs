mod cli;
mod domain;
mod infrastructure;
mod monitor;

use anyhow::{Context, Result};
use cli::Command;
use domain::address::BluetoothAddress;
use domain::settings::{Settings, SettingsService};
use infrastructure::actions::{self, PresenceAction};
use infrastructure::bluetooth::ReplayScanner;
use monitor::{MonitorConfig, MonitorSummary, PresenceMonitor};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse();

    let mut settings_service = SettingsService::load(args.config.clone())?;

    let _logging_guard = infrastructure::logging::init_logger(
        &settings_service.get().log_settings,
        args.log_level.as_deref(),
    )
    .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
    .ok();

    info!("Using settings from {}", settings_service.path().display());

    match args.command.unwrap_or(Command::Run {
        address: None,
        replay: None,
    }) {
        Command::Run { address, replay } => {
            run_monitor(settings_service.get(), address.as_deref(), replay).await
        }
        Command::Scan { seconds } => scan_devices(Duration::from_secs(seconds)).await,
        Command::TestAction {
            delay_secs,
            hold_secs,
        } => {
            let action = actions::from_settings(&settings_service.get().action)?;
            test_action(
                action,
                Duration::from_secs(delay_secs),
                Duration::from_secs(hold_secs),
            )
            .await
        }
        Command::SetAddress { address } => {
            let address: BluetoothAddress = address.parse()?;
            settings_service.get_mut().target_address = Some(address);
            settings_service.save()?;
            info!(
                "Tracking {} from now on ({})",
                address,
                settings_service.path().display()
            );
            Ok(())
        }
    }
}

async fn run_monitor(
    settings: &Settings,
    address: Option<&str>,
    replay: Option<PathBuf>,
) -> Result<()> {
    let target = match address {
        Some(address) => address.parse()?,
        None => settings.target_address.ok_or_else(|| {
            anyhow::anyhow!("No phone address configured, pass --address or run set-address")
        })?,
    };

    let config = MonitorConfig {
        target,
        presence: settings
            .presence
            .to_config()
            .context("Invalid presence settings")?,
        scan_window: settings.scan_window(),
        poll_interval: settings.poll_interval(),
    };
    let action = actions::from_settings(&settings.action)?;

    let shutdown = wait_for_shutdown(tokio::signal::ctrl_c());

    let summary = match replay {
        Some(path) => {
            let scanner = ReplayScanner::open(&path).await?;
            PresenceMonitor::new(config, scanner, action)?
                .run(shutdown)
                .await
        }
        None => run_live(config, action, shutdown).await?,
    };

    info!(
        "Stopped after {} cycles ({} enters, {} exits), last state: {}",
        summary.cycles, summary.entered, summary.exited, summary.final_state
    );
    Ok(())
}

/// Resolves when `signal` fires. If the signal cannot be watched the run
/// continues until killed instead of stopping at once.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to listen for Ctrl-C, stop the process to exit: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(windows)]
async fn run_live(
    config: MonitorConfig,
    action: Box<dyn PresenceAction + Send>,
    shutdown: impl Future<Output = ()>,
) -> Result<MonitorSummary> {
    let scanner = infrastructure::bluetooth::BleScanner::new();
    Ok(PresenceMonitor::new(config, scanner, action)?
        .run(shutdown)
        .await)
}

#[cfg(not(windows))]
async fn run_live(
    _config: MonitorConfig,
    _action: Box<dyn PresenceAction + Send>,
    _shutdown: impl Future<Output = ()>,
) -> Result<MonitorSummary> {
    anyhow::bail!("Live BLE scanning is only supported on Windows, use --replay <file>")
}

/// One-off listing of every advertising device, strongest first.
#[cfg(windows)]
async fn scan_devices(duration: Duration) -> Result<()> {
    use domain::models::ScannedDevice;
    use infrastructure::bluetooth::{BleScanner, DeviceScanner};
    use std::collections::HashMap;

    println!("Scanning... keep phone nearby and Bluetooth ON");

    let mut scanner = BleScanner::new();
    let heard = scanner.scan(duration).await?.unwrap_or_default();
    scanner.stop()?;

    // Keep the latest advertisement per address
    let mut latest: HashMap<BluetoothAddress, ScannedDevice> = HashMap::new();
    for device in heard {
        latest.insert(device.address, device);
    }
    let mut devices: Vec<ScannedDevice> = latest.into_values().collect();
    devices.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));

    for device in &devices {
        println!(
            "{}  {}  RSSI={}",
            device.address, device.name, device.signal_strength
        );
    }
    info!("Scan found {} devices", devices.len());
    Ok(())
}

#[cfg(not(windows))]
async fn scan_devices(_duration: Duration) -> Result<()> {
    anyhow::bail!("Live BLE scanning is only supported on Windows")
}

/// Drive the configured action by hand: OFF after `delay`, ON after `hold`.
async fn test_action(
    mut action: Box<dyn PresenceAction + Send>,
    delay: Duration,
    hold: Duration,
) -> Result<()> {
    info!("Waiting {}s before switching OFF", delay.as_secs());
    tokio::time::sleep(delay).await;
    action.turn_off()?;

    info!("Waiting {}s before switching ON", hold.as_secs());
    tokio::time::sleep(hold).await;
    action.turn_on(None)?;

    if let Some(pending) = action.finish() {
        pending.await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_follows_signal() {
        let signal = async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok::<(), std::io::Error>(())
        };
        let result = tokio::time::timeout(Duration::from_secs(5), wait_for_shutdown(signal)).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_signal_never_shuts_down() {
        let signal = async { Err::<(), _>(std::io::Error::other("no signal handler")) };
        let result =
            tokio::time::timeout(Duration::from_secs(3600), wait_for_shutdown(signal)).await;
        assert!(result.is_err());
    }
}
