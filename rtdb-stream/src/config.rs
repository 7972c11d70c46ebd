//! Configuration types for the rtdb-stream crate
//!
//! This module defines configuration structures that control how the bridge
//! buffers vendor callbacks and where it delivers them.

use std::fmt;
use std::str::FromStr;

use tokio::runtime::Handle;

use crate::error::BridgeError;

/// What to do with elements the consumer has not picked up yet.
///
/// Terminal signals (completion, error) are never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Queue every element
    Buffer,
    /// Keep only the newest undelivered element
    Latest,
    /// Queue up to `n` elements and drop newer ones while full
    Bounded(usize),
}

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::Buffer
    }
}

impl fmt::Display for Backpressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backpressure::Buffer => f.write_str("buffer"),
            Backpressure::Latest => f.write_str("latest"),
            Backpressure::Bounded(n) => write!(f, "bounded:{}", n),
        }
    }
}

impl FromStr for Backpressure {
    type Err = BridgeError;

    /// Parses `buffer`, `latest` or `bounded:<n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        match value.as_str() {
            "buffer" => Ok(Backpressure::Buffer),
            "latest" => Ok(Backpressure::Latest),
            other => {
                let capacity = other
                    .strip_prefix("bounded:")
                    .ok_or_else(|| {
                        BridgeError::Configuration(format!("Unknown backpressure mode: {}", s))
                    })?
                    .parse::<usize>()
                    .map_err(|e| {
                        BridgeError::Configuration(format!(
                            "Invalid bounded capacity in {}: {}",
                            s, e
                        ))
                    })?;
                Ok(Backpressure::Bounded(capacity))
            }
        }
    }
}

/// Configuration for the bridges
///
/// Controls buffering of vendor callbacks and the execution context events
/// are delivered on.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Buffering policy for undelivered elements
    /// Default: Buffer
    pub backpressure: Backpressure,

    /// Runtime to re-dispatch events onto before handing them to the consumer
    /// Default: None (consumer polls the vendor-fed queue directly)
    pub observe_on: Option<Handle>,

    /// Emit a trace event for every forwarded element
    /// Default: false
    pub log_events: bool,
}

impl BridgeConfig {
    /// Environment variable read by [`BridgeConfig::from_env`]
    pub const BACKPRESSURE_ENV: &'static str = "RTDB_BACKPRESSURE";

    /// Create a new BridgeConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a BridgeConfig that only keeps the newest undelivered element,
    /// suited to "current state" streams where intermediate values are noise
    pub fn latest_only() -> Self {
        Self {
            backpressure: Backpressure::Latest,
            ..Default::default()
        }
    }

    /// Create a BridgeConfig from the environment, falling back to defaults
    /// when `RTDB_BACKPRESSURE` is unset
    pub fn from_env() -> Result<Self, BridgeError> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(Self::BACKPRESSURE_ENV) {
            config.backpressure = value.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), BridgeError> {
        if let Backpressure::Bounded(0) = self.backpressure {
            return Err(BridgeError::Configuration(
                "Bounded backpressure capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_observe_on(mut self, handle: Handle) -> Self {
        self.observe_on = Some(handle);
        self
    }

    pub fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }
}
