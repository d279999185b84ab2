//! Presence Actions
//!
//! Effects driven by presence transitions. The monitor invokes exactly one
//! call per transition and only logs failures; nothing is fed back.

use crate::domain::settings::ActionSettings;
use anyhow::{Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub trait PresenceAction {
    /// The tracked device arrived. `rssi` is the smoothed reading that
    /// triggered it, `None` for manual triggers.
    fn turn_on(&mut self, rssi: Option<f64>) -> Result<()>;

    /// The tracked device left.
    fn turn_off(&mut self) -> Result<()>;

    /// Stop accepting calls and hand back the work still in flight, if any.
    fn finish(&mut self) -> Option<JoinHandle<()>> {
        None
    }
}

/// Build the action selected in the settings.
///
/// The command action starts its worker task, so this must run inside the
/// tokio runtime.
pub fn from_settings(settings: &ActionSettings) -> Result<Box<dyn PresenceAction + Send>> {
    match settings {
        ActionSettings::Log => Ok(Box::new(LogAction)),
        ActionSettings::Command {
            on,
            off,
            timeout_secs,
        } => Ok(Box::new(CommandAction::spawn(
            on,
            off,
            Duration::from_secs(*timeout_secs),
        )?)),
        #[cfg(windows)]
        ActionSettings::Display => Ok(Box::new(DisplayPowerAction)),
        #[cfg(not(windows))]
        ActionSettings::Display => {
            anyhow::bail!("Display power control is only supported on Windows")
        }
    }
}

/// Logs the transition and does nothing else.
pub struct LogAction;

impl PresenceAction for LogAction {
    fn turn_on(&mut self, rssi: Option<f64>) -> Result<()> {
        match rssi {
            Some(rssi) => info!("ENTER -> ambience ON (RSSI={})", rssi as i32),
            None => info!("ENTER -> ambience ON"),
        }
        Ok(())
    }

    fn turn_off(&mut self) -> Result<()> {
        info!("LEFT -> ambience OFF");
        Ok(())
    }
}

struct Invocation {
    argv: Vec<String>,
    rssi: Option<f64>,
}

/// Runs an external program for each transition.
///
/// Programs run one at a time, in call order, on a worker task; `turn_on` and
/// `turn_off` only queue them. A program still running after `timeout` is
/// killed. The smoothed RSSI is exported to the ON command as `PRESENCE_RSSI`.
pub struct CommandAction {
    on: Vec<String>,
    off: Vec<String>,
    sender: Option<mpsc::UnboundedSender<Invocation>>,
    worker: Option<JoinHandle<()>>,
}

impl CommandAction {
    pub fn spawn(on: &[String], off: &[String], timeout: Duration) -> Result<Self> {
        if on.is_empty() || off.is_empty() {
            anyhow::bail!("Command action needs both an 'on' and an 'off' command");
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_invocations(receiver, timeout));

        Ok(Self {
            on: on.to_vec(),
            off: off.to_vec(),
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn submit(&self, argv: &[String], rssi: Option<f64>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Command action already finished"))?;
        sender
            .send(Invocation {
                argv: argv.to_vec(),
                rssi,
            })
            .map_err(|_| anyhow::anyhow!("Command worker has stopped"))
    }
}

impl PresenceAction for CommandAction {
    fn turn_on(&mut self, rssi: Option<f64>) -> Result<()> {
        self.submit(&self.on, rssi)
    }

    fn turn_off(&mut self) -> Result<()> {
        self.submit(&self.off, None)
    }

    fn finish(&mut self) -> Option<JoinHandle<()>> {
        // Closing the channel lets the worker drain the queue and exit
        self.sender = None;
        self.worker.take()
    }
}

async fn run_invocations(mut receiver: mpsc::UnboundedReceiver<Invocation>, timeout: Duration) {
    while let Some(invocation) = receiver.recv().await {
        if let Err(e) = execute(&invocation.argv, invocation.rssi, timeout).await {
            error!("Presence command failed: {:#}", e);
        }
    }
    debug!("Command worker stopped");
}

async fn execute(argv: &[String], rssi: Option<f64>, timeout: Duration) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("Empty command"))?;
    debug!("Running {:?}", argv);

    let mut command = tokio::process::Command::new(program);
    command.args(args).stdin(Stdio::null());
    if let Some(rssi) = rssi {
        command.env("PRESENCE_RSSI", format!("{:.0}", rssi));
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to run '{}'", program))?;

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    let status = match waited {
        Ok(status) => status.with_context(|| format!("Failed to wait for '{}'", program))?,
        Err(_) => {
            warn!("'{}' still running after {:?}, killing it", program, timeout);
            child
                .kill()
                .await
                .with_context(|| format!("Failed to kill '{}'", program))?;
            anyhow::bail!("'{}' timed out after {:?}", program, timeout);
        }
    };
    if !status.success() {
        anyhow::bail!("'{}' exited with {}", program, status);
    }
    Ok(())
}

/// Powers the monitors on and off through a broadcast `SC_MONITORPOWER`.
#[cfg(windows)]
pub struct DisplayPowerAction;

#[cfg(windows)]
impl DisplayPowerAction {
    const POWER_ON: isize = -1;
    const POWER_OFF: isize = 2;

    fn set_monitor_power(state: isize) {
        use windows::Win32::Foundation::{LPARAM, WPARAM};
        use windows::Win32::UI::WindowsAndMessaging::{
            SendMessageW, HWND_BROADCAST, SC_MONITORPOWER, WM_SYSCOMMAND,
        };

        debug!("Broadcasting SC_MONITORPOWER {}", state);
        unsafe {
            SendMessageW(
                HWND_BROADCAST,
                WM_SYSCOMMAND,
                Some(WPARAM(SC_MONITORPOWER as usize)),
                Some(LPARAM(state)),
            );
        }
    }
}

#[cfg(windows)]
impl PresenceAction for DisplayPowerAction {
    fn turn_on(&mut self, rssi: Option<f64>) -> Result<()> {
        info!("Screen ON (RSSI={:?})", rssi.map(|r| r as i32));
        Self::set_monitor_power(Self::POWER_ON);
        Ok(())
    }

    fn turn_off(&mut self) -> Result<()> {
        info!("Screen OFF");
        Self::set_monitor_power(Self::POWER_OFF);
        Ok(())
    }
}
