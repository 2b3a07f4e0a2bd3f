//! Scenario configuration
//!
//! One `ScenarioConfig` holds every resolved parameter of a roundtrip run.
//! It is built from CLI flags or loaded from a JSON file, validated once, and
//! never mutated afterwards.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{NetTestError, Result};

/// Resolved parameters for one roundtrip run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    // Coordinator
    pub nm_host: String, // bind address passed to the coordinator
    pub nm_ip: String,   // address the storage node, client and prober use
    pub nm_client_port: u16,
    pub nm_ss_port: u16,

    // Storage node
    pub ss_host: String,
    pub ss_ip: String,
    pub ss_client_port: u16,
    pub ss_admin_port: u16,
    pub ss_id: String,
    pub ss_advertise_ip: Option<String>,

    // Client session
    pub username: String,
    pub file_name: Option<String>,

    // Budgets in seconds
    pub wait_timeout_secs: f64,
    pub client_timeout_secs: f64,

    // Behaviour
    pub component_verbose: bool,
    pub exec_allow: bool,
    pub keep_procs: bool,

    // Layout
    pub bin_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            nm_host: "0.0.0.0".to_string(),
            nm_ip: "127.0.0.1".to_string(),
            nm_client_port: 8000,
            nm_ss_port: 8001,
            ss_host: "0.0.0.0".to_string(),
            ss_ip: "127.0.0.1".to_string(),
            ss_client_port: 9000,
            ss_admin_port: 9100,
            ss_id: "nettest-ss".to_string(),
            ss_advertise_ip: None,
            username: "nettest-user".to_string(),
            file_name: None,
            wait_timeout_secs: 15.0,
            client_timeout_secs: 30.0,
            component_verbose: false,
            exec_allow: false,
            keep_procs: false,
            bin_dir: PathBuf::from("bin"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl ScenarioConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize scenario configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse scenario configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("nm_host", &self.nm_host),
            ("nm_ip", &self.nm_ip),
            ("ss_host", &self.ss_host),
            ("ss_ip", &self.ss_ip),
        ] {
            if value.trim().is_empty() {
                return Err(NetTestError::config(format!("{} must not be empty", name)));
            }
        }

        for (name, port) in [
            ("nm_client_port", self.nm_client_port),
            ("nm_ss_port", self.nm_ss_port),
            ("ss_client_port", self.ss_client_port),
            ("ss_admin_port", self.ss_admin_port),
        ] {
            if port == 0 {
                return Err(NetTestError::config(format!("{} must be non-zero", name)));
            }
        }
        if self.nm_client_port == self.nm_ss_port {
            return Err(NetTestError::config(
                "nm_client_port and nm_ss_port must differ",
            ));
        }
        if self.ss_client_port == self.ss_admin_port {
            return Err(NetTestError::config(
                "ss_client_port and ss_admin_port must differ",
            ));
        }

        for (name, secs) in [
            ("wait_timeout_secs", self.wait_timeout_secs),
            ("client_timeout_secs", self.client_timeout_secs),
        ] {
            if Duration::try_from_secs_f64(secs).map_or(true, |d| d.is_zero()) {
                return Err(NetTestError::config(format!(
                    "{} must be a positive number of seconds (got {})",
                    name, secs
                )));
            }
        }

        check_token("ss_id", &self.ss_id)?;
        check_token("username", &self.username)?;
        if let Some(ip) = &self.ss_advertise_ip {
            check_token("ss_advertise_ip", ip)?;
        }
        if let Some(name) = &self.file_name {
            check_token("file_name", name)?;
            if name.contains('/') || name.contains('\\') {
                return Err(NetTestError::config(
                    "file_name must not contain path separators",
                ));
            }
        }

        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.wait_timeout_secs).unwrap_or_default()
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.client_timeout_secs).unwrap_or_default()
    }

    /// Configured file name, or `net_test_<unix-seconds>.txt`
    pub fn resolve_file_name(&self) -> String {
        self.file_name.clone().unwrap_or_else(|| {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("net_test_{}.txt", secs)
        })
    }

    /// Coordinator arguments (binary excluded)
    pub fn coordinator_args(&self) -> Vec<String> {
        let mut args = vec![
            "--host".to_string(),
            self.nm_host.clone(),
            "--port".to_string(),
            self.nm_client_port.to_string(),
            "--ss-port".to_string(),
            self.nm_ss_port.to_string(),
        ];
        if self.component_verbose {
            args.push("--verbose".to_string());
        }
        if self.exec_allow {
            args.push("--exec-allow".to_string());
        }
        args
    }

    /// Storage-node arguments (binary excluded)
    pub fn storage_args(&self) -> Vec<String> {
        let mut args = vec![
            "--host".to_string(),
            self.ss_host.clone(),
            "--client-port".to_string(),
            self.ss_client_port.to_string(),
            "--admin-port".to_string(),
            self.ss_admin_port.to_string(),
            "--nm-ip".to_string(),
            self.nm_ip.clone(),
            "--nm-port".to_string(),
            self.nm_ss_port.to_string(),
            "--ss-id".to_string(),
            self.ss_id.clone(),
        ];
        if let Some(ip) = &self.ss_advertise_ip {
            args.push("--advertise-ip".to_string());
            args.push(ip.clone());
        }
        if self.component_verbose {
            args.push("--verbose".to_string());
        }
        args
    }

    /// Client arguments (binary excluded)
    pub fn client_args(&self) -> Vec<String> {
        let mut args = vec![
            "--nm-ip".to_string(),
            self.nm_ip.clone(),
            "--nm-port".to_string(),
            self.nm_client_port.to_string(),
            "--username".to_string(),
            self.username.clone(),
        ];
        if self.component_verbose {
            args.push("--verbose".to_string());
        }
        args
    }
}

/// Non-empty and free of whitespace, so it survives as one argv/transcript token
fn check_token(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(NetTestError::config(format!("{} must not be empty", name)));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(NetTestError::config(format!(
            "{} must not contain whitespace",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScenarioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wait_timeout(), Duration::from_secs(15));
        assert_eq!(config.client_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ScenarioConfig {
            nm_client_port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ScenarioConfig {
            wait_timeout_secs: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ScenarioConfig {
            client_timeout_secs: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ScenarioConfig {
            file_name: Some("two words.txt".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ScenarioConfig {
            file_name: Some("../escape.txt".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ScenarioConfig {
            ss_client_port: 9100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_vectors() {
        let config = ScenarioConfig {
            component_verbose: true,
            exec_allow: true,
            ss_advertise_ip: Some("10.0.0.5".to_string()),
            ..Default::default()
        };

        assert_eq!(
            config.coordinator_args(),
            ["--host", "0.0.0.0", "--port", "8000", "--ss-port", "8001", "--verbose", "--exec-allow"]
        );
        assert_eq!(
            config.storage_args(),
            [
                "--host", "0.0.0.0", "--client-port", "9000", "--admin-port", "9100", "--nm-ip",
                "127.0.0.1", "--nm-port", "8001", "--ss-id", "nettest-ss", "--advertise-ip",
                "10.0.0.5", "--verbose",
            ]
        );
        assert_eq!(
            config.client_args(),
            ["--nm-ip", "127.0.0.1", "--nm-port", "8000", "--username", "nettest-user", "--verbose"]
        );
    }

    #[test]
    fn test_quiet_command_vectors_omit_flags() {
        let config = ScenarioConfig::default();
        assert!(!config.coordinator_args().contains(&"--verbose".to_string()));
        assert!(!config.coordinator_args().contains(&"--exec-allow".to_string()));
        assert!(!config.storage_args().contains(&"--advertise-ip".to_string()));
    }

    #[test]
    fn test_resolve_file_name() {
        let config = ScenarioConfig {
            file_name: Some("net_test_1.txt".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_file_name(), "net_test_1.txt");

        let generated = ScenarioConfig::default().resolve_file_name();
        assert!(generated.starts_with("net_test_"));
        assert!(generated.ends_with(".txt"));
    }

    #[test]
    fn test_save_and_load_partial_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{ "nm_client_port": 18000, "keep_procs": true }"#).unwrap();

        let config = ScenarioConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.nm_client_port, 18000);
        assert!(config.keep_procs);
        assert_eq!(config.ss_client_port, 9000);

        config.save_to_file(file.path()).unwrap();
        let reloaded = ScenarioConfig::load_from_file(file.path()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{ "nm_clinet_port": 18000 }"#).unwrap();
        assert!(ScenarioConfig::load_from_file(file.path()).is_err());
    }
}
