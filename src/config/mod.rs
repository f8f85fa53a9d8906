//! Configuration for the demo server
//!
//! Settings are read from a TOML file. Every section is optional and falls
//! back to its defaults, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::protocol::core::{seat_capability, shm_format};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerConfig {
    /// Listening socket
    #[serde(default)]
    pub socket: SocketConfig,

    /// The advertised `wl_output`
    #[serde(default)]
    pub output: OutputConfig,

    /// The advertised `wl_seat`
    #[serde(default)]
    pub seat: SeatConfig,

    /// Shared memory formats
    #[serde(default)]
    pub shm: ShmConfig,

    /// Main loop settings
    #[serde(default)]
    pub event_loop: EventLoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SocketConfig {
    /// Socket name inside `XDG_RUNTIME_DIR`; the first free `wayland-N`
    /// when unset
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Position in the global compositor space
    pub x: i32,
    pub y: i32,

    /// Physical size (millimeters)
    pub physical_width: i32,
    pub physical_height: i32,

    /// Current mode (pixels)
    pub width: i32,
    pub height: i32,

    /// Refresh rate (mHz)
    pub refresh: i32,

    /// Integer scale factor
    pub scale: i32,

    /// `wl_output.transform` value (0-7)
    #[serde(default)]
    pub transform: i32,

    pub make: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatConfig {
    pub name: String,

    /// Any of "pointer", "keyboard", "touch"
    pub capabilities: Vec<String>,

    /// Hide the seat global from every client
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShmConfig {
    /// Format names, e.g. "argb8888"
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLoopConfig {
    /// Timeout of one dispatch round (milliseconds, -1 blocks)
    pub dispatch_timeout_ms: i32,

    /// Interval of the client statistics log (seconds, 0 disables)
    #[serde(default)]
    pub stats_interval_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            physical_width: 530,
            physical_height: 300,
            width: 1920,
            height: 1080,
            refresh: 60_000,
            scale: 1,
            transform: 0,
            make: "wlserver".to_string(),
            model: "virtual".to_string(),
        }
    }
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self {
            name: "seat0".to_string(),
            capabilities: vec!["pointer".to_string(), "keyboard".to_string()],
            hidden: false,
        }
    }
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            formats: vec!["argb8888".to_string(), "xrgb8888".to_string()],
        }
    }
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: 16,
            stats_interval_secs: 0,
        }
    }
}

impl SeatConfig {
    /// `wl_seat.capabilities` bitmask
    pub fn capability_mask(&self) -> u32 {
        self.capabilities
            .iter()
            .filter_map(|name| seat_capability::from_name(name))
            .fold(0, |mask, bit| mask | bit)
    }
}

impl ShmConfig {
    /// `wl_shm.format` codes, in configuration order
    pub fn format_codes(&self) -> Vec<u32> {
        self.formats
            .iter()
            .filter_map(|name| shm_format::from_name(name))
            .collect()
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: ServerConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.socket.name {
            if name.is_empty() || name.contains('/') {
                anyhow::bail!("Invalid socket name {:?}: must be a non-empty file name", name);
            }
        }

        if self.output.width <= 0 || self.output.height <= 0 {
            anyhow::bail!(
                "Invalid output mode {}x{}: dimensions must be positive",
                self.output.width,
                self.output.height
            );
        }
        if self.output.refresh < 0 {
            anyhow::bail!("Invalid output refresh: must not be negative");
        }
        if self.output.scale < 1 {
            anyhow::bail!("Invalid output scale: must be at least 1");
        }
        if !(0..=7).contains(&self.output.transform) {
            anyhow::bail!("Invalid output transform {}: must be between 0 and 7", self.output.transform);
        }

        if self.seat.name.is_empty() {
            anyhow::bail!("Invalid seat name: must not be empty");
        }
        for capability in &self.seat.capabilities {
            if seat_capability::from_name(capability).is_none() {
                anyhow::bail!("Invalid seat capability: {}", capability);
            }
        }

        for format in &self.shm.formats {
            if shm_format::from_name(format).is_none() {
                anyhow::bail!("Invalid shm format: {}", format);
            }
        }
        let codes = self.shm.format_codes();
        for required in [shm_format::ARGB8888, shm_format::XRGB8888] {
            if !codes.contains(&required) {
                anyhow::bail!(
                    "Invalid shm formats: {} is mandatory",
                    shm_format::name(required).unwrap_or("?")
                );
            }
        }

        if self.event_loop.dispatch_timeout_ms < -1 {
            anyhow::bail!("Invalid dispatch_timeout_ms: must be -1 or greater");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}


#[cfg(test)]
mod property_tests;
