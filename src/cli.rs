use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Turns ambience or the screen on while your phone is nearby.
#[derive(Parser, Debug)]
#[command(name = "ble_presence", version, about)]
pub struct Args {
    /// Settings file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Track the phone and drive the configured action (default).
    Run {
        /// Address of the phone to track, overrides the settings file.
        #[arg(short, long)]
        address: Option<String>,

        /// Read recorded scan windows from a JSON-lines file instead of the radio.
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// List every advertising device once, to find the phone's address.
    Scan {
        /// How long to listen.
        #[arg(short, long, default_value_t = 8)]
        seconds: u64,
    },

    /// Switch the configured action OFF and back ON.
    TestAction {
        /// Wait before switching OFF.
        #[arg(long, default_value_t = 5)]
        delay_secs: u64,

        /// How long to stay OFF before switching back ON.
        #[arg(long, default_value_t = 10)]
        hold_secs: u64,
    },

    /// Store the phone's address in the settings file.
    SetAddress {
        address: String,
    },
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let args = Args::try_parse_from(["ble_presence"]).unwrap();
        assert!(args.command.is_none());
        assert!(args.config.is_none());
    }

    #[test]
    fn test_run_with_overrides() {
        let args = Args::try_parse_from([
            "ble_presence",
            "run",
            "--address",
            "30:bb:7d:4c:3e:5c",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(
            args.command,
            Some(Command::Run {
                address: Some("30:bb:7d:4c:3e:5c".to_string()),
                replay: None,
            })
        );
    }

    #[test]
    fn test_scan_defaults() {
        let args = Args::try_parse_from(["ble_presence", "scan"]).unwrap();
        assert_eq!(args.command, Some(Command::Scan { seconds: 8 }));
    }

    #[test]
    fn test_test_action_defaults() {
        let args =
            Args::try_parse_from(["ble_presence", "test-action", "--hold-secs", "3"]).unwrap();
        assert_eq!(
            args.command,
            Some(Command::TestAction {
                delay_secs: 5,
                hold_secs: 3,
            })
        );
    }
}
