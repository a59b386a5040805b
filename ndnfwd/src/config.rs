use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use ndnfw_core::Name;

use crate::face::FaceId;
use crate::fib::Strategy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub forwarder: ForwarderConfig,
    pub pcct: PcctConfig,
    pub suppress: SuppressConfig,
    pub ndt: NdtConfig,
    pub logging: LoggingConfig,
    pub fib: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Number of forwarding workers, each owning one PCCT partition
    pub workers: usize,
    /// Number of input dispatchers; faces are spread across them
    pub inputs: usize,
    pub burst_size: usize,
    /// Capacity of each input-to-worker queue
    pub queue_capacity: usize,
    /// Seed for the per-worker nonce generators; random when unset
    pub nonce_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PcctConfig {
    /// Total PIT + CS entries per partition
    pub max_entries: usize,
    pub cs_capacity: usize,
    pub cs_enabled: bool,
    /// How long stale Data stays usable for non-MustBeFresh Interests
    pub cs_stale_retention_ms: u64,
    pub max_downstreams: usize,
    /// Slots visited by the expiry sweep on each poll
    pub sweep_budget: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressConfig {
    pub min_ms: u64,
    pub multiplier: f64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NdtConfig {
    /// Number of leading name components hashed
    pub prefix_len: usize,
    /// The table has 2^table_bits slots
    pub table_bits: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub nexthops: Vec<FaceId>,
    #[serde(default)]
    pub strategy: Strategy,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            inputs: 1,
            burst_size: 64,
            queue_capacity: 4096,
            nonce_seed: None,
        }
    }
}

impl Default for PcctConfig {
    fn default() -> Self {
        Self {
            max_entries: 65536,
            cs_capacity: 32768,
            cs_enabled: true,
            cs_stale_retention_ms: 4000,
            max_downstreams: 16,
            sweep_budget: 64,
        }
    }
}

impl PcctConfig {
    pub fn cs_stale_retention(&self) -> Duration {
        Duration::from_millis(self.cs_stale_retention_ms)
    }
}

impl Default for SuppressConfig {
    fn default() -> Self {
        Self {
            min_ms: 10,
            multiplier: 2.0,
            max_ms: 100,
        }
    }
}

impl Default for NdtConfig {
    fn default() -> Self {
        Self {
            prefix_len: 2,
            table_bits: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let fwd = &self.forwarder;
        if fwd.workers == 0 || fwd.workers > 255 {
            return invalid(format!("workers must be in 1..=255, got {}", fwd.workers));
        }
        if fwd.inputs == 0 {
            return invalid("inputs must be at least 1".to_string());
        }
        if fwd.burst_size == 0 || fwd.queue_capacity == 0 {
            return invalid("burst_size and queue_capacity must be positive".to_string());
        }

        let pcct = &self.pcct;
        if pcct.max_entries == 0 || pcct.max_entries > u32::MAX as usize {
            return invalid(format!("pcct.max_entries out of range: {}", pcct.max_entries));
        }
        if pcct.max_downstreams == 0 {
            return invalid("pcct.max_downstreams must be at least 1".to_string());
        }

        let suppress = &self.suppress;
        if !suppress.multiplier.is_finite() || suppress.multiplier < 1.0 {
            return invalid(format!(
                "suppress.multiplier must be >= 1, got {}",
                suppress.multiplier
            ));
        }
        if suppress.min_ms > suppress.max_ms {
            return invalid(format!(
                "suppress.min_ms ({}) exceeds suppress.max_ms ({})",
                suppress.min_ms, suppress.max_ms
            ));
        }

        if self.ndt.table_bits > 20 {
            return invalid(format!("ndt.table_bits must be <= 20, got {}", self.ndt.table_bits));
        }

        for route in &self.fib {
            if route.nexthops.is_empty() {
                return invalid(format!("route {} has no nexthops", route.prefix));
            }
            route.name()?;
        }

        Ok(())
    }
}

impl RouteConfig {
    pub fn name(&self) -> Result<Name, ConfigError> {
        self.prefix
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("route prefix {}: {}", self.prefix, e)))
    }
}
