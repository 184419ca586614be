//! Dashboard configuration management.
//!
//! - **`model`**: the six-section configuration tree and its defaults.
//! - **`validation`**: pure rule checks that report every violation at once.
//!
//! [`ConfigManager`] owns the active tree. Updates are merged onto the
//! current tree section by section, validated, and swapped in atomically;
//! a rejected update leaves the active tree untouched.
//!
//! ```rust,ignore
//! let manager = ConfigManager::new();
//! manager.update(&json!({ "monitoring": { "monitoringInterval": 30 } }))?;
//! assert_eq!(manager.current().monitoring.monitoring_interval, 30);
//! ```

pub mod model;
pub mod validation;

pub use model::{
    AlertThresholds, AnalyticsConfig, CollaborationConfig, Config, FrameworkConfig,
    MonitoringConfig, SecurityConfig, WorkflowConfig,
};
pub use validation::{validate_config, ConfigViolation, ValidationReport};

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, Result, VigilError};

/// Merge `overrides` onto the built-in defaults.
///
/// Each top-level section is merged independently and shallowly: keys
/// present in an override section replace the default keys, absent keys keep
/// their defaults, and nested objects (such as `alertThresholds`) are
/// replaced as a whole.
pub fn merge_config(overrides: Option<&Value>) -> Result<Config> {
    merge_onto(&Config::default(), overrides)
}

/// Merge `overrides` onto an arbitrary base tree with the same rules as
/// [`merge_config`].
///
/// A field whose override has the wrong type fails the merge with a
/// `ConfigValidationFailed` error naming every such field.
pub fn merge_onto(base: &Config, overrides: Option<&Value>) -> Result<Config> {
    let (merged, type_errors) = merge_reporting(base, overrides)?;
    if type_errors.is_empty() {
        Ok(merged)
    } else {
        Err(VigilError::config_validation(type_errors))
    }
}

/// Merge `overrides` onto `base`, keeping the base value of every field
/// whose override cannot be read and reporting it as a violation.
///
/// Overrides that are not objects, or sections that are not objects, are
/// rejected outright with `InvalidConfiguration`.
pub fn merge_reporting(base: &Config, overrides: Option<&Value>) -> Result<(Config, Vec<ConfigViolation>)> {
    let Some(overrides) = overrides else {
        return Ok((base.clone(), Vec::new()));
    };

    let sections = match overrides {
        Value::Object(map) => map,
        Value::Null => return Ok((base.clone(), Vec::new())),
        other => {
            return Err(VigilError::with_internal(
                ErrorCode::InvalidConfiguration,
                "Configuration overrides must be a JSON object",
                format!("got {}", json_type(other)),
            ));
        }
    };

    let base_tree = serde_json::to_value(base)?;
    let Value::Object(base_sections) = &base_tree else {
        return Err(VigilError::internal("configuration tree did not serialize to an object"));
    };

    let mut patches: Vec<(&str, &str, &Value)> = Vec::new();
    for (section, patch) in sections {
        if !base_sections.contains_key(section) {
            warn!(section = %section, "Ignoring unknown configuration section");
            continue;
        }

        match patch {
            Value::Null => {}
            Value::Object(fields) => {
                patches.extend(fields.iter().map(|(k, v)| (section.as_str(), k.as_str(), v)));
            }
            other => {
                return Err(VigilError::with_internal(
                    ErrorCode::InvalidConfiguration,
                    "Configuration section overrides must be JSON objects",
                    format!("section '{}' got {}", section, json_type(other)),
                ));
            }
        }
    }

    if let Ok(merged) = serde_json::from_value(apply_patches(&base_tree, &patches)) {
        return Ok((merged, Vec::new()));
    }

    // Retry each field alone against the base to find the unreadable ones.
    let mut type_errors = Vec::new();
    let mut readable = Vec::with_capacity(patches.len());
    for patch in patches {
        let single = apply_patches(&base_tree, std::slice::from_ref(&patch));
        match serde_json::from_value::<Config>(single) {
            Ok(_) => readable.push(patch),
            Err(e) => {
                let (section, key, _) = patch;
                debug!(section, key, error = %e, "Unreadable configuration override");
                type_errors.push(ConfigViolation::new(
                    format!("{}.{}", section, key),
                    format!("has the wrong type: {}", e),
                ));
            }
        }
    }

    let merged = serde_json::from_value(apply_patches(&base_tree, &readable)).map_err(|e| {
        VigilError::with_internal(
            ErrorCode::InvalidConfiguration,
            "Configuration overrides have the wrong shape",
            e.to_string(),
        )
        .with_source(e)
    })?;

    Ok((merged, type_errors))
}

/// Copy `base` with each `(section, key, value)` written over it.
fn apply_patches(base: &Value, patches: &[(&str, &str, &Value)]) -> Value {
    let mut tree = base.clone();
    for (section, key, value) in patches {
        if let Some(Value::Object(fields)) = tree.get_mut(*section) {
            fields.insert((*key).to_string(), (*value).clone());
        }
    }
    tree
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Owner of the active configuration tree.
pub struct ConfigManager {
    current: RwLock<Arc<Config>>,
}

impl ConfigManager {
    /// Start from the built-in defaults.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Config::default())),
        }
    }

    /// Start from defaults merged with `overrides`, rejecting invalid trees.
    pub fn with_overrides(overrides: &Value) -> Result<Self> {
        let config = merge_config(Some(overrides))?;
        Self::ensure_valid(&config)?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// The active tree. Cheap to clone and never partially updated.
    pub fn current(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    /// Merge `overrides` onto the active tree and validate the result
    /// without applying it.
    ///
    /// Fields with the wrong type are reported alongside the rule
    /// violations of the remaining tree.
    pub fn preview(&self, overrides: &Value) -> Result<(Config, ValidationReport)> {
        let (merged, mut errors) = merge_reporting(&self.current(), Some(overrides))?;
        errors.extend(validate_config(&merged).errors);
        Ok((merged, ValidationReport::from_errors(errors)))
    }

    /// Merge, validate and atomically apply `overrides`.
    ///
    /// On any violation the active tree is left unchanged and the error
    /// carries every violation found.
    pub fn update(&self, overrides: &Value) -> Result<Arc<Config>> {
        let (merged, report) = self.preview(overrides)?;
        if !report.is_valid {
            warn!(violations = report.errors.len(), "Rejected configuration update");
            return Err(VigilError::config_validation(report.errors));
        }
        Ok(self.replace_unchecked(merged))
    }

    /// Validate and apply a complete tree.
    pub fn replace(&self, config: Config) -> Result<Arc<Config>> {
        Self::ensure_valid(&config)?;
        Ok(self.replace_unchecked(config))
    }

    /// Restore the built-in defaults.
    pub fn reset(&self) -> Arc<Config> {
        debug!("Resetting configuration to defaults");
        self.replace_unchecked(Config::default())
    }

    fn replace_unchecked(&self, config: Config) -> Arc<Config> {
        let config = Arc::new(config);
        *self.current.write() = config.clone();
        info!(
            real_time_monitoring = config.monitoring.enable_real_time_monitoring,
            monitoring_interval = config.monitoring.monitoring_interval,
            "Configuration applied"
        );
        config
    }

    fn ensure_valid(config: &Config) -> Result<()> {
        let report = validate_config(config);
        if report.is_valid {
            Ok(())
        } else {
            Err(VigilError::config_validation(report.errors))
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
