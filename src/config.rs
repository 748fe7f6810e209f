//! Configuration consumed by namespaces, the builder, and instrumentation.
//!
//! | Field                          | Default        | Env override                              |
//! |--------------------------------|----------------|-------------------------------------------|
//! | `default_namespace`            | `typed_cache`  | `TYPED_CACHE_DEFAULT_NAMESPACE`           |
//! | `delimiter`                    | `:`            | `TYPED_CACHE_DELIMITER`                   |
//! | `instrumentation.enabled`      | `false`        | `TYPED_CACHE_INSTRUMENTATION_ENABLED`     |
//! | `instrumentation.namespace`    | `typed_cache`  | `TYPED_CACHE_INSTRUMENTATION_NAMESPACE`   |
//! | `instrumentation.instrumenter` | `null`         | `TYPED_CACHE_INSTRUMENTER`                |
//!
//! The config is a plain value: pass it to
//! [`CacheBuilder::with_config`](crate::builder::CacheBuilder::with_config) or
//! [`Namespace::at_with`](crate::namespace::Namespace::at_with). It derives
//! `Deserialize`, so it can be embedded in an application's own settings file.

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "typed_cache";
pub const DEFAULT_DELIMITER: &str = ":";
pub const DEFAULT_INSTRUMENTER: &str = "null";

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_namespace: String,
    pub delimiter: String,
    pub instrumentation: InstrumentationConfig,
}

/// Settings for the instrumented decorator and instrumenter registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Whether [`with_instrumentation`](crate::builder::CacheBuilder::with_instrumentation)
    /// resolves `instrumenter` or falls back to the null instrumenter.
    pub enabled: bool,
    /// Prefix of every event name (`<namespace>.<operation>`).
    pub namespace: String,
    /// Registry name of the instrumenter to use when enabled.
    pub instrumenter: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            instrumentation: InstrumentationConfig::default(),
        }
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace: DEFAULT_NAMESPACE.to_string(),
            instrumenter: DEFAULT_INSTRUMENTER.to_string(),
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by any `TYPED_CACHE_*` variables that are set.
    pub fn from_env() -> Self {
        Self::default().merge_env(|name| std::env::var(name).ok())
    }

    fn merge_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ns) = lookup("TYPED_CACHE_DEFAULT_NAMESPACE") {
            self.default_namespace = ns;
        }
        if let Some(delim) = lookup("TYPED_CACHE_DELIMITER").filter(|d| !d.is_empty()) {
            self.delimiter = delim;
        }
        if let Some(enabled) = lookup("TYPED_CACHE_INSTRUMENTATION_ENABLED") {
            self.instrumentation.enabled = matches!(
                enabled.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(ns) = lookup("TYPED_CACHE_INSTRUMENTATION_NAMESPACE") {
            self.instrumentation.namespace = ns;
        }
        if let Some(name) = lookup("TYPED_CACHE_INSTRUMENTER") {
            self.instrumentation.instrumenter = name;
        }
        self
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_instrumentation_enabled(mut self, enabled: bool) -> Self {
        self.instrumentation.enabled = enabled;
        self
    }

    pub fn with_instrumentation_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.instrumentation.namespace = namespace.into();
        self
    }

    pub fn with_instrumenter(mut self, name: impl Into<String>) -> Self {
        self.instrumentation.instrumenter = name.into();
        self
    }
}
