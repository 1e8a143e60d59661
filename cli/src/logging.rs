//! Tracing initialisation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level, per-crate overrides and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
    /// crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".into(), components: HashMap::new(), json: false }
    }
}

impl LogConfig {
    /// Parse `"eventsync_rpc=debug,eventsync_evm=trace"` style overrides.
    pub fn with_overrides(mut self, spec: Option<&str>) -> Self {
        for part in spec.into_iter().flat_map(|s| s.split(',')) {
            if let Some((component, level)) = part.split_once('=') {
                self.components.insert(component.trim().to_string(), level.trim().to_string());
            }
        }
        self
    }

    /// `"info,eventsync_rpc=debug"`
    fn directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_overrides() {
        let cfg = LogConfig { level: "warn".into(), ..Default::default() }
            .with_overrides(Some("eventsync-rpc=debug, eventsync_evm=trace,bogus"));
        assert_eq!(cfg.directives(), "warn,eventsync_rpc=debug,eventsync_evm=trace");
    }
}
