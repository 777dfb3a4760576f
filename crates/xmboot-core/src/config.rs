//! Boot session configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::flash::{FlashError, MemoryRegion};
use crate::protocol::TransferMode;
use crate::state::ReceiverConfig;

/// Configuration for a boot session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Serial device path (ignored when running fully simulated).
    pub port: Option<String>,
    /// Baud rate for the serial device.
    pub baud: u32,
    /// Trailer mode requested from the sender.
    pub mode: TransferMode,
    /// Base address of the application image. Must be page-aligned.
    pub app_start: u32,
    /// First address past the programmable range.
    pub flash_end: u32,
    /// Erase granularity in bytes. Must be a power of two.
    pub page_size: u32,
    /// Deadline for every received byte, in milliseconds.
    pub byte_timeout_ms: u64,
    /// Start-of-transfer control bytes sent before giving up.
    pub handshake_retries: u32,
    /// Consecutive rejected frames tolerated before cancelling.
    pub packet_retries: u32,
    /// Whole-transfer attempts before the session gives up.
    pub max_attempts: u32,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            mode: TransferMode::default(),
            // Bootloader occupies the first two pages; the image follows.
            app_start: 0x0800_1000,
            flash_end: 0x0802_0000,
            page_size: 0x800,
            byte_timeout_ms: 1_000,
            handshake_retries: 16,
            packet_retries: 10,
            max_attempts: 8,
        }
    }
}

impl BootConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BootConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validated memory layout.
    pub fn memory_region(&self) -> Result<MemoryRegion, FlashError> {
        MemoryRegion::new(self.app_start, self.flash_end, self.page_size)
    }

    /// Receiver bounds derived from this configuration.
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            mode: self.mode,
            byte_timeout: Duration::from_millis(self.byte_timeout_ms),
            handshake_retries: self.handshake_retries,
            packet_retries: self.packet_retries,
        }
    }
}
