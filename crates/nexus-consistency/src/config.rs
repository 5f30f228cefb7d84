//! Checker configuration
//!
//! Loaded from TOML, with environment overrides:
//!
//! ```toml
//! mode = "multi_pass"
//! worker_threads = 8
//! batch_size = 10000
//! check_schema = true
//!
//! [ownership]
//! property_chains = true
//! dynamic_chains = ["string", "array", "node_label"]
//! ```

use crate::error::{ConsistencyError, Result};
use nexus_record::DynamicStoreKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the record passes are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    /// One thread; comparative checks are resolved right after each record
    #[default]
    Sequential,
    /// Parallel record passes followed by parallel reference passes
    MultiPass,
}

/// Which chains the ownership check tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipConfig {
    /// Detect property chains with several owners, and orphan chains
    pub property_chains: bool,
    /// Dynamic stores whose records are checked for owners
    pub dynamic_chains: Vec<DynamicStoreKind>,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            property_chains: true,
            dynamic_chains: vec![
                DynamicStoreKind::String,
                DynamicStoreKind::Array,
                DynamicStoreKind::PropertyKeyName,
                DynamicStoreKind::RelationshipTypeName,
                DynamicStoreKind::LabelName,
                DynamicStoreKind::NodeLabel,
            ],
        }
    }
}

impl OwnershipConfig {
    /// No ownership tracking at all
    pub fn disabled() -> Self {
        Self {
            property_chains: false,
            dynamic_chains: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.property_chains || !self.dynamic_chains.is_empty()
    }

    pub fn tracks(&self, kind: DynamicStoreKind) -> bool {
        self.dynamic_chains.contains(&kind)
    }
}

/// Chains whose owners are property or node records
fn claimed_by_graph(kind: DynamicStoreKind) -> bool {
    matches!(
        kind,
        DynamicStoreKind::String | DynamicStoreKind::Array | DynamicStoreKind::NodeLabel
    )
}

/// Consistency check configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub mode: CheckMode,
    /// Worker threads for multi-pass mode (0 = one per core)
    pub worker_threads: usize,
    /// Records per parallel work unit
    pub batch_size: usize,
    /// Check the graph stores (nodes, relationships, groups, properties, neo store)
    pub check_graph: bool,
    /// Run the two schema passes
    pub check_schema: bool,
    /// Check tokens and dynamic stores
    pub check_dynamic: bool,
    /// Log every checked record at trace level
    pub trace_execution: bool,
    pub ownership: OwnershipConfig,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            mode: CheckMode::Sequential,
            worker_threads: 0,
            batch_size: 10_000,
            check_graph: true,
            check_schema: true,
            check_dynamic: true,
            trace_execution: false,
            ownership: OwnershipConfig::default(),
        }
    }
}

impl CheckConfig {
    /// Sequential mode with defaults
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Multi-pass mode with defaults
    pub fn multi_pass() -> Self {
        Self {
            mode: CheckMode::MultiPass,
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CheckConfig =
            toml::from_str(content).map_err(|e| ConsistencyError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?.with_env_overrides()?;
        tracing::info!("Loaded consistency check configuration from {:?}", path);
        Ok(config)
    }

    /// Apply `NEXUS_CHECK_*` environment overrides
    ///
    /// Priority: environment variables > config file > defaults
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(mode) = var("NEXUS_CHECK_MODE") {
            self.mode = match mode.as_str() {
                "sequential" => CheckMode::Sequential,
                "multi_pass" => CheckMode::MultiPass,
                other => {
                    return Err(ConsistencyError::config(format!(
                        "unknown NEXUS_CHECK_MODE {other:?}"
                    )));
                }
            };
        }
        if let Some(threads) = var("NEXUS_CHECK_WORKER_THREADS") {
            self.worker_threads = threads
                .parse()
                .map_err(|_| ConsistencyError::config("NEXUS_CHECK_WORKER_THREADS must be a number"))?;
        }
        if let Some(batch) = var("NEXUS_CHECK_BATCH_SIZE") {
            self.batch_size = batch
                .parse()
                .map_err(|_| ConsistencyError::config("NEXUS_CHECK_BATCH_SIZE must be a number"))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConsistencyError::config("batch_size must be greater than zero"));
        }
        if self.ownership.property_chains && !self.check_graph {
            return Err(ConsistencyError::config(
                "ownership.property_chains requires check_graph",
            ));
        }
        if !self.check_graph {
            // only graph records claim these chains
            if let Some(kind) = self
                .ownership
                .dynamic_chains
                .iter()
                .find(|kind| claimed_by_graph(**kind))
            {
                return Err(ConsistencyError::config(format!(
                    "ownership of {kind} chains requires check_graph"
                )));
            }
        }
        if !self.ownership.dynamic_chains.is_empty() && !self.check_dynamic {
            return Err(ConsistencyError::config(
                "ownership.dynamic_chains requires check_dynamic",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CheckConfig::default();
        assert_eq!(config.mode, CheckMode::Sequential);
        assert_eq!(config.batch_size, 10_000);
        assert!(config.check_graph && config.check_schema && config.check_dynamic);
        assert!(config.ownership.property_chains);
        assert!(!config.ownership.tracks(DynamicStoreKind::Schema));
        assert!(config.ownership.tracks(DynamicStoreKind::NodeLabel));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = CheckConfig::from_toml_str(
            r#"
            mode = "multi_pass"
            worker_threads = 4
            batch_size = 128

            [ownership]
            property_chains = false
            dynamic_chains = ["string"]
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, CheckMode::MultiPass);
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.batch_size, 128);
        assert!(!config.ownership.property_chains);
        assert_eq!(config.ownership.dynamic_chains, vec![DynamicStoreKind::String]);
        assert!(config.check_schema);
    }

    #[test]
    fn test_rejects_zero_batch() {
        let err = CheckConfig::from_toml_str("batch_size = 0").unwrap_err();
        assert!(matches!(err, ConsistencyError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(CheckConfig::from_toml_str("mode = \"turbo\"").is_err());
    }

    #[test]
    fn test_ownership_needs_its_stores() {
        let config = CheckConfig {
            check_dynamic: false,
            ..CheckConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CheckConfig {
            check_dynamic: false,
            ownership: OwnershipConfig {
                property_chains: true,
                dynamic_chains: vec![],
            },
            ..CheckConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_graph_owned_chains_need_graph() {
        let config = CheckConfig {
            check_graph: false,
            ownership: OwnershipConfig {
                property_chains: false,
                ..OwnershipConfig::default()
            },
            ..CheckConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConsistencyError::Config(_)));

        let config = CheckConfig {
            check_graph: false,
            ownership: OwnershipConfig {
                property_chains: false,
                dynamic_chains: vec![
                    DynamicStoreKind::PropertyKeyName,
                    DynamicStoreKind::RelationshipTypeName,
                    DynamicStoreKind::LabelName,
                ],
            },
            ..CheckConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("NEXUS_CHECK_MODE", "multi_pass"),
            ("NEXUS_CHECK_WORKER_THREADS", "3"),
            ("NEXUS_CHECK_BATCH_SIZE", "17"),
        ]);
        let config = CheckConfig::default()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.mode, CheckMode::MultiPass);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.batch_size, 17);

        // unset variables keep the file values
        let config = CheckConfig::multi_pass().with_overrides(|_| None).unwrap();
        assert_eq!(config, CheckConfig::multi_pass());
    }

    #[test]
    fn test_bad_overrides() {
        for (name, value) in [
            ("NEXUS_CHECK_MODE", "turbo"),
            ("NEXUS_CHECK_WORKER_THREADS", "many"),
            ("NEXUS_CHECK_BATCH_SIZE", "0"),
        ] {
            let err = CheckConfig::default()
                .with_overrides(|var| (var == name).then(|| value.to_string()))
                .unwrap_err();
            assert!(matches!(err, ConsistencyError::Config(_)), "{name}");
        }
    }

    #[test]
    fn test_toml_round_trip_keeps_mode() {
        let text = toml::to_string(&CheckConfig::multi_pass()).unwrap();
        assert_eq!(CheckConfig::from_toml_str(&text).unwrap().mode, CheckMode::MultiPass);
    }
}
