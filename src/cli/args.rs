//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vpnscope - VPN portal connectivity monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subcommand to execute (defaults to `status`)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Portal base URL
    #[arg(long, global = true, env = "VPNSCOPE_PORTAL_URL")]
    pub portal_url: Option<String>,

    /// VPN network in CIDR form (e.g. 10.8.0.0/24)
    #[arg(long, global = true, env = "VPN_NETWORK")]
    pub vpn_network: Option<String>,

    /// Alternate configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show VPN membership and portal health once
    Status,
    /// Run DNS, connectivity and stability diagnostics once
    Diagnose,
    /// Keep polling and print every status change
    Watch {
        /// Seconds between server health polls
        #[arg(long)]
        health_interval: Option<u64>,
    },
    /// Sign in to the portal with an identity-provider token
    Login {
        /// ID token issued by the identity provider
        #[arg(long, env = "VPNSCOPE_CREDENTIAL", hide_env_values = true)]
        credential: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// Download the signed-in user's OpenVPN configuration
    DownloadConfig {
        /// Directory to save into (defaults to the download folder)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}
