//! Container configuration
//!
//! Configuration is a plain serde-deserializable struct so it can be loaded
//! from whatever format the host application already uses.

use crate::opaque_key::{
    ByReferenceModuleOpaqueKeyFactory, DeepHashedModuleOpaqueKeyFactory, KeyGenerationStrategy,
    ModuleOpaqueKeyFactory,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// How module opaque keys are computed.
///
/// The strategy is process-wide. Mixing strategies between containers that
/// share module declarations is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpaqueKeyStrategy {
    /// Identity of the module reference; structurally equal dynamic modules
    /// built separately get different keys.
    ByReference {
        /// Salt the random id with a hash of the shallow metadata
        #[serde(default)]
        shallow: bool,
    },
    /// Content hash of the dynamic metadata
    #[default]
    DeepHash,
}

/// Settings applied when an [`ApplicationContext`](crate::ApplicationContext) is created.
///
/// # Examples
///
/// ```rust
/// use modular_di::{ContainerConfig, OpaqueKeyStrategy};
/// use std::time::Duration;
///
/// let config = ContainerConfig::new()
///     .opaque_keys(OpaqueKeyStrategy::ByReference { shallow: true })
///     .serialization_warn_threshold(Duration::from_millis(5));
///
/// assert_eq!(config.strategy, OpaqueKeyStrategy::ByReference { shallow: true });
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Opaque key strategy
    pub strategy: OpaqueKeyStrategy,
    /// Warn when hashing dynamic metadata takes longer than this
    #[serde(with = "millis")]
    pub serialization_warn_threshold: Duration,
    /// Run `on_module_init` hooks during creation
    pub lifecycle_hooks: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            strategy: OpaqueKeyStrategy::default(),
            serialization_warn_threshold: Duration::from_millis(10),
            lifecycle_hooks: true,
        }
    }
}

impl ContainerConfig {
    /// Default configuration
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the opaque key strategy
    pub fn opaque_keys(mut self, strategy: OpaqueKeyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the slow-serialization warning threshold
    pub fn serialization_warn_threshold(mut self, threshold: Duration) -> Self {
        self.serialization_warn_threshold = threshold;
        self
    }

    /// Skip `on_module_init` hooks
    pub fn without_lifecycle_hooks(mut self) -> Self {
        self.lifecycle_hooks = false;
        self
    }

    /// Build the key factory for the configured strategy
    pub fn key_factory(&self) -> Arc<dyn ModuleOpaqueKeyFactory> {
        match self.strategy {
            OpaqueKeyStrategy::ByReference { shallow } => {
                let strategy = if shallow {
                    KeyGenerationStrategy::Shallow
                } else {
                    KeyGenerationStrategy::Random
                };
                Arc::new(ByReferenceModuleOpaqueKeyFactory::new(strategy))
            }
            OpaqueKeyStrategy::DeepHash => Arc::new(
                DeepHashedModuleOpaqueKeyFactory::new()
                    .warn_threshold(self.serialization_warn_threshold),
            ),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.strategy, OpaqueKeyStrategy::DeepHash);
        assert_eq!(config.serialization_warn_threshold, Duration::from_millis(10));
        assert!(config.lifecycle_hooks);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ContainerConfig = serde_json::from_str(
            r#"{"strategy": {"kind": "by_reference", "shallow": true}, "serialization_warn_threshold": 25}"#,
        )
        .unwrap();

        assert_eq!(config.strategy, OpaqueKeyStrategy::ByReference { shallow: true });
        assert_eq!(config.serialization_warn_threshold, Duration::from_millis(25));
        assert!(config.lifecycle_hooks);
    }

    #[test]
    fn test_deserialize_by_reference_defaults_to_random() {
        let config: ContainerConfig =
            serde_json::from_str(r#"{"strategy": {"kind": "by_reference"}}"#).unwrap();
        assert_eq!(config.strategy, OpaqueKeyStrategy::ByReference { shallow: false });
    }
}
