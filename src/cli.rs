use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ScenarioConfig;

/// nettest - connectivity checks and roundtrip smoke tests for the storage stack
#[derive(Parser)]
#[command(name = "nettest")]
#[command(about = "Network diagnostics for the coordinator/storage-node/client stack")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check TCP reachability of NM/SS ports
    Ping(PingArgs),
    /// Start local NM/SS/client binaries and run a CREATE/WRITE/READ smoke test
    Roundtrip(RoundtripArgs),
    /// Validate a roundtrip configuration file
    Validate {
        /// Path to the JSON configuration file
        config: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PingArgs {
    /// NM IP or hostname to probe
    #[arg(long, default_value = "127.0.0.1")]
    pub nm_ip: String,
    /// NM client port
    #[arg(long, default_value_t = 8000)]
    pub nm_port: u16,
    /// SS IP or hostname to probe
    #[arg(long)]
    pub ss_ip: Option<String>,
    /// SS client port
    #[arg(long)]
    pub ss_port: Option<u16>,
    /// Connection timeout in seconds
    #[arg(long, default_value_t = 2.0)]
    pub timeout: f64,
}

#[derive(Args, Debug, Clone)]
pub struct RoundtripArgs {
    /// Load every option from this JSON file instead of the flags below
    #[arg(long, conflicts_with_all = [
        "nm_host", "nm_ip", "nm_client_port", "nm_ss_port", "ss_host", "ss_ip",
        "ss_client_port", "ss_admin_port", "ss_id", "ss_advertise_ip", "username",
        "file_name", "wait_timeout", "client_timeout", "component_verbose",
        "exec_allow", "keep_procs", "bin_dir", "log_dir",
    ])]
    pub config: Option<PathBuf>,

    /// Bind address for NM server sockets
    #[arg(long, default_value = "0.0.0.0")]
    pub nm_host: String,
    /// IP the SS/client use to reach the NM
    #[arg(long, default_value = "127.0.0.1")]
    pub nm_ip: String,
    /// NM client port
    #[arg(long, default_value_t = 8000)]
    pub nm_client_port: u16,
    /// NM storage registration port
    #[arg(long, default_value_t = 8001)]
    pub nm_ss_port: u16,
    /// Bind address for SS client/admin sockets
    #[arg(long, default_value = "0.0.0.0")]
    pub ss_host: String,
    /// IP used to probe SS readiness
    #[arg(long, default_value = "127.0.0.1")]
    pub ss_ip: String,
    /// SS client-facing port
    #[arg(long, default_value_t = 9000)]
    pub ss_client_port: u16,
    /// SS admin port
    #[arg(long, default_value_t = 9100)]
    pub ss_admin_port: u16,
    /// Identifier passed to SS during registration
    #[arg(long, default_value = "nettest-ss")]
    pub ss_id: String,
    /// Override SS advertise IP (defaults to detected interface)
    #[arg(long)]
    pub ss_advertise_ip: Option<String>,
    /// Username for the scripted client run
    #[arg(long, default_value = "nettest-user")]
    pub username: String,
    /// Test filename (defaults to timestamped net_test_<n>.txt)
    #[arg(long)]
    pub file_name: Option<String>,
    /// Seconds to wait for server sockets
    #[arg(long, default_value_t = 15.0)]
    pub wait_timeout: f64,
    /// Seconds to wait for client completion
    #[arg(long, default_value_t = 30.0)]
    pub client_timeout: f64,
    /// Pass --verbose to NM/SS/Client for detailed socket logs
    #[arg(long)]
    pub component_verbose: bool,
    /// Start NM with --exec-allow (defaults to restricted EXEC)
    #[arg(long)]
    pub exec_allow: bool,
    /// Do not terminate NM/SS when the test finishes (manual debugging)
    #[arg(long)]
    pub keep_procs: bool,
    /// Directory holding the nm, ss and client binaries
    #[arg(long, default_value = "bin")]
    pub bin_dir: PathBuf,
    /// Directory for NM/SS log files
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

impl RoundtripArgs {
    /// Flags as a scenario configuration (ignores `--config`)
    pub fn to_config(&self) -> ScenarioConfig {
        ScenarioConfig {
            nm_host: self.nm_host.clone(),
            nm_ip: self.nm_ip.clone(),
            nm_client_port: self.nm_client_port,
            nm_ss_port: self.nm_ss_port,
            ss_host: self.ss_host.clone(),
            ss_ip: self.ss_ip.clone(),
            ss_client_port: self.ss_client_port,
            ss_admin_port: self.ss_admin_port,
            ss_id: self.ss_id.clone(),
            ss_advertise_ip: self.ss_advertise_ip.clone(),
            username: self.username.clone(),
            file_name: self.file_name.clone(),
            wait_timeout_secs: self.wait_timeout,
            client_timeout_secs: self.client_timeout,
            component_verbose: self.component_verbose,
            exec_allow: self.exec_allow,
            keep_procs: self.keep_procs,
            bin_dir: self.bin_dir.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
