//! Configuration management for the valve switch
//!
//! The configuration lives in an INI file (the same one the access point was
//! paired with) and is layered as: built-in defaults, then the file, then
//! command-line / environment overrides applied by the binary.
//!
//! ```ini
//! [AUTH]
//! authtoken = 0123456789ABCDEF...
//! accesspoint = 3014-F711-A000-0000-0000-0000
//!
//! [SWITCH]
//! plug_label = Schalt-Mess-Steckdose
//! valve_device_type = FLOOR_TERMINAL_BLOCK_12
//! sync_interval = 15m
//! ```

use crate::error::{Result, ValveSwitchError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_FILE: &str = "/opt/hmip_elli/bin/config.ini";

/// Default label of the switched outlet
pub const DEFAULT_PLUG_LABEL: &str = "Schalt-Mess-Steckdose";

/// Default monitored valve device type
pub const DEFAULT_VALVE_DEVICE_TYPE: &str = "FLOOR_TERMINAL_BLOCK_12";

/// Default interval between full syncs (15 minutes)
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(900);

/// Default HomematicIP endpoint lookup service
pub const DEFAULT_LOOKUP_URL: &str = "https://lookup.homematic.com:48335";

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Access point credentials
    #[serde(default, alias = "AUTH")]
    pub auth: AuthConfig,

    /// Switching behavior
    #[serde(default, alias = "SWITCH")]
    pub switch: SwitchSettings,

    /// Cloud endpoint settings
    #[serde(default, alias = "CLOUD")]
    pub cloud: CloudConfig,
}

/// Access point credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Auth token registered with the access point
    #[serde(default)]
    pub authtoken: String,

    /// Access point id (SGTIN, dashes allowed)
    #[serde(default)]
    pub accesspoint: String,
}

/// Switching behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchSettings {
    /// Label of the switched outlet
    pub plug_label: String,

    /// Device type of the monitored valves (substring match)
    pub valve_device_type: String,

    /// Interval between full syncs
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,

    /// Run one full sync before listening for events
    pub sync_on_startup: bool,

    /// Channel of the outlet that carries the switch
    pub channel_index: u8,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            plug_label: DEFAULT_PLUG_LABEL.to_string(),
            valve_device_type: DEFAULT_VALVE_DEVICE_TYPE.to_string(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            sync_on_startup: true,
            channel_index: 1,
        }
    }
}

/// Cloud endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Endpoint lookup service
    pub lookup_url: Url,

    /// HTTP request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            lookup_url: Url::parse(DEFAULT_LOOKUP_URL).expect("default lookup URL is valid"),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Overrides collected from the command line / environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub authtoken: Option<String>,
    pub accesspoint: Option<String>,
    pub plug_label: Option<String>,
    pub valve_device_type: Option<String>,
    pub sync_interval: Option<Duration>,
    pub sync_on_startup: Option<bool>,
    pub lookup_url: Option<Url>,
}

impl SwitchConfig {
    /// Load configuration from an INI file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ValveSwitchError::config(format!(
                "Configuration file {} not found",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Ini))
            .build()?;
        let loaded: Self = settings.try_deserialize()?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(loaded)
    }

    /// Parse configuration from INI text
    pub fn from_ini_str(contents: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Ini))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Apply command-line / environment overrides on top of the file values
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(authtoken) = overrides.authtoken {
            self.auth.authtoken = authtoken;
        }
        if let Some(accesspoint) = overrides.accesspoint {
            self.auth.accesspoint = accesspoint;
        }
        if let Some(plug_label) = overrides.plug_label {
            self.switch.plug_label = plug_label;
        }
        if let Some(valve_device_type) = overrides.valve_device_type {
            self.switch.valve_device_type = valve_device_type;
        }
        if let Some(sync_interval) = overrides.sync_interval {
            self.switch.sync_interval = sync_interval;
        }
        if let Some(sync_on_startup) = overrides.sync_on_startup {
            self.switch.sync_on_startup = sync_on_startup;
        }
        if let Some(lookup_url) = overrides.lookup_url {
            self.cloud.lookup_url = lookup_url;
        }
    }

    /// Access point id as the cloud expects it: upper case, no dashes
    pub fn accesspoint_id(&self) -> String {
        self.auth
            .accesspoint
            .trim()
            .replace('-', "")
            .to_ascii_uppercase()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.authtoken.trim().is_empty() {
            return Err(ValveSwitchError::config(
                "authtoken missing. Set it in the [AUTH] section or via HMIP_AUTHTOKEN",
            ));
        }

        let accesspoint = self.accesspoint_id();
        if accesspoint.len() != 24 || !accesspoint.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValveSwitchError::config(format!(
                "accesspoint '{}' is not a 24 digit SGTIN",
                self.auth.accesspoint.trim()
            )));
        }

        if self.switch.plug_label.trim().is_empty() {
            return Err(ValveSwitchError::config("plug_label must not be empty"));
        }
        if self.switch.valve_device_type.trim().is_empty() {
            return Err(ValveSwitchError::config(
                "valve_device_type must not be empty",
            ));
        }
        if self.switch.sync_interval.is_zero() {
            return Err(ValveSwitchError::config("sync_interval must be positive"));
        }

        Ok(())
    }
}
