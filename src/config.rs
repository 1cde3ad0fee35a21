use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the orchestration engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConveyorConfig {
    /// Job runner settings
    pub runner: RunnerConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Full-restart attempt budget per job
    pub max_attempts: u32,
    /// Lease TTL around each work unit, in seconds
    pub lease_ttl_seconds: i64,
    /// Worker index on this host (part of the worker identity)
    pub worker_index: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            runner: RunnerConfig {
                max_attempts: 3,
                lease_ttl_seconds: 30,
                worker_index: 0,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
        }
    }
}

impl ConveyorConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. Configuration file (conveyor.toml)
    /// 3. Environment variables (prefixed with CONVEYOR_)
    pub fn load() -> Result<Self> {
        let defaults = ConveyorConfig::default();
        let mut builder = Config::builder()
            .set_default("runner.max_attempts", defaults.runner.max_attempts)?
            .set_default("runner.lease_ttl_seconds", defaults.runner.lease_ttl_seconds)?
            .set_default("runner.worker_index", defaults.runner.worker_index)?
            .set_default("observability.log_level", defaults.observability.log_level)?;

        if Path::new("conveyor.toml").exists() {
            builder = builder.add_source(File::with_name("conveyor"));
        }

        builder = builder.add_source(
            Environment::with_prefix("CONVEYOR")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ConveyorConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ConveyorConfig::load_env_file();
        ConveyorConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ConveyorConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
