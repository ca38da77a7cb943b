//! Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Configure encoding appliances and their downstream delivery platforms.
#[derive(Parser, Debug)]
#[command(name = "edgecast")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List devices visible to the configured token
    Devices {
        /// Also fetch every device's state
        #[arg(long, default_value_t = false)]
        fleet: bool,
    },

    /// Show one device's state, shadow versions and alerts
    Status {
        #[arg(short, long)]
        device: String,
    },

    /// Apply a profile to a device and its downstream platforms
    Deploy {
        #[arg(short, long)]
        device: String,

        /// Profile JSON file; deployment state is written back to it
        #[arg(short, long)]
        profile: PathBuf,

        /// Configure downstream platforms even if device configuration fails
        #[arg(long, default_value_t = false)]
        bypass: bool,

        /// Address the platforms should pull from
        #[arg(long)]
        device_ip: Option<String>,

        /// Ports held by other profiles (comma separated)
        #[arg(long, value_delimiter = ',')]
        ports_in_use: Vec<u16>,
    },

    /// Switch one output on or off
    Toggle {
        #[arg(short, long)]
        device: String,

        /// Output entry id
        #[arg(short, long)]
        output: i64,

        #[arg(value_enum)]
        state: Switch,
    },

    /// Disable and re-enable every enabled output
    Restart {
        #[arg(short, long)]
        device: String,
    },

    /// Send a raw device command such as `reboot`
    Command {
        #[arg(short, long)]
        device: String,

        name: String,

        /// JSON parameters
        #[arg(long)]
        params: Option<String>,
    },

    /// Inspect and manage device alerts
    Alerts {
        #[command(subcommand)]
        action: AlertAction,
    },

    /// Delete the downstream entity created for one output intent
    RemoveDownstream {
        #[arg(short, long)]
        profile: PathBuf,

        /// Output intent id
        #[arg(short, long)]
        intent: String,

        /// Confirm the deletion
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AlertAction {
    List {
        #[arg(short, long)]
        device: String,
    },
    Mute {
        #[arg(short, long)]
        device: String,
        #[arg(short, long)]
        alert: String,
    },
    Unmute {
        #[arg(short, long)]
        device: String,
        #[arg(short, long)]
        alert: String,
    },
    Delete {
        #[arg(short, long)]
        device: String,
        #[arg(short, long)]
        alert: String,
        /// Confirm the deletion
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}
