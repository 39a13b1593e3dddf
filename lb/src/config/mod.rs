pub mod types;


pub use types::*;

use anyhow::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a file and apply environment variable
    /// overrides. The file format is chosen by extension; yaml is the
    /// documented default, toml and json are accepted for parity with
    /// deployment tooling.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .yaml, .toml or .json"),
            None => anyhow::bail!("config file has no extension, use .yaml, .toml or .json"),
        };

        config.apply_env_overrides()?;
        config.validate()?;

        tracing::info!(
            port = config.port,
            backends = config.backends.len(),
            strategy = %config.strategy,
            "loaded configuration"
        );
        Ok(config)
    }

    /// Environment overrides, applied after file parse. `BACKENDS`
    /// replaces the configured list wholesale.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("PORT") {
            self.port = v
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("invalid PORT value: {e}"))?;
        }
        if let Ok(v) = std::env::var("BACKENDS") {
            self.backends = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("DATABASE_PATH") {
            self.database_path = v;
        }
        if let Ok(v) = std::env::var("STRATEGY") {
            self.strategy = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be non-zero");
        }
        if self.backends.is_empty() {
            anyhow::bail!("no backends configured");
        }
        for backend in &self.backends {
            let uri: http::Uri = backend
                .parse()
                .map_err(|e| anyhow::anyhow!("backend '{}' is not a valid url: {e}", backend))?;
            if uri.scheme().is_none() || uri.authority().is_none() {
                anyhow::bail!("backend '{}' must be an absolute url (scheme + host)", backend);
            }
        }
        crate::balancer::Strategy::from_name(&self.strategy)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        if self.rate_limit.capacity == 0 {
            anyhow::bail!("rate_limit.capacity must be positive");
        }
        if self.rate_limit.refill_rate == 0 {
            anyhow::bail!("rate_limit.refill_rate must be positive");
        }
        if self.database_path.is_empty() {
            anyhow::bail!("databasePath must not be empty");
        }
        Ok(())
    }
}
