pub mod check;
pub mod config;
pub mod json_output;
pub mod stampede;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "callerid",
    version,
    about = "Caller identity propagation and authentication caching"
)]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (defaults to callerid.toml in the user config dir)
    #[arg(long, global = true, env = "CALLERID_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(callerid::config::default_config_path)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Authenticate a user from a users file, repeating to exercise the cache
    Check {
        /// Users file (TOML)
        #[arg(long)]
        users: PathBuf,
        /// Principal name; omit for an anonymous login
        principal: Option<String>,
        /// Password to present
        #[arg(long, env = "CALLERID_PASSWORD")]
        password: Option<String>,
        /// Number of logins to perform
        #[arg(long, default_value_t = 2)]
        repeat: usize,
    },

    /// Race concurrent first-time logins for one principal
    Stampede {
        /// Users file (TOML)
        #[arg(long)]
        users: PathBuf,
        /// Principal name
        principal: String,
        /// Password to present
        #[arg(long, env = "CALLERID_PASSWORD")]
        password: Option<String>,
        /// Concurrent logins
        #[arg(long, default_value_t = 8)]
        threads: usize,
        /// Override the configured locking strategy: simple or serialized
        #[arg(long)]
        locking: Option<String>,
        /// Artificial authenticator latency in milliseconds
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
