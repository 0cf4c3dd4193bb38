mod types;
pub mod watcher;

pub use types::*;
pub use watcher::{watch_config_async, ConfigWatcher};

use crate::vars::ConditionSet;
use anyhow::{Context, Result};
use hyper::Method;
use std::collections::HashSet;
use std::path::Path;

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_yaml(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Parse without validating.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yml::from_str(content).with_context(|| "Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        // Validate entrypoints
        if self.entrypoints.is_empty() {
            anyhow::bail!("At least one entrypoint must be defined");
        }
        for (name, entrypoint) in &self.entrypoints {
            entrypoint
                .address
                .parse::<std::net::SocketAddr>()
                .with_context(|| {
                    format!("Invalid address for entrypoint '{}': {}", name, entrypoint.address)
                })?;
        }

        // Validate upstreams
        for (name, upstream) in &self.upstreams {
            if upstream.servers.is_empty() {
                anyhow::bail!("Upstream '{}' must have at least one server", name);
            }
            if upstream.timeout_ms == 0 {
                anyhow::bail!("Upstream '{}' must have a non-zero timeout_ms", name);
            }
            for server in &upstream.servers {
                let url = url::Url::parse(&server.url).with_context(|| {
                    format!("Invalid server URL in upstream '{}': {}", name, server.url)
                })?;
                // Requests keep their own path and query
                if url.path() != "/" || url.query().is_some() {
                    anyhow::bail!(
                        "Server URL in upstream '{}' must not carry a path or query: {}",
                        name,
                        server.url
                    );
                }
            }
        }

        // Validate routes
        let mut names = HashSet::new();
        for route in &self.routes {
            if !names.insert(route.name.as_str()) {
                anyhow::bail!("Duplicate route name '{}'", route.name);
            }

            if !self.upstreams.contains_key(&route.upstream) {
                anyhow::bail!(
                    "Route '{}' references non-existent upstream '{}'",
                    route.name,
                    route.upstream
                );
            }

            for method in &route.methods {
                method
                    .parse::<Method>()
                    .with_context(|| format!("Route '{}' has invalid method '{}'", route.name, method))?;
            }

            ConditionSet::compile(&route.vars)
                .with_context(|| format!("Route '{}' has invalid nginx vars", route.name))?;
        }

        Ok(())
    }
}
