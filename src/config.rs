//! Engine configuration
//!
//! Loaded from YAML; every field has a default so partial files work:
//!
//! ```yaml
//! lazy_render_threshold: 100
//! visible_field_rows: 8
//! layout:
//!   column_spacing: 320.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LineageError, Result};
use crate::graph::layout::LayoutConfig;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageConfig {
    /// Table count above which nothing renders until a selection is made
    #[serde(default = "default_lazy_render_threshold")]
    pub lazy_render_threshold: usize,

    /// Field rows shown on a standard card before "+N more"
    #[serde(default = "default_visible_field_rows")]
    pub visible_field_rows: usize,

    /// Kind label substituted when a record carries none
    #[serde(default = "default_mapping_kind")]
    pub default_mapping_kind: String,

    /// Add schema-declared tables that no mapping references
    #[serde(default)]
    pub include_unmapped_tables: bool,

    #[serde(default)]
    pub layout: LayoutConfig,
}

fn default_lazy_render_threshold() -> usize {
    100
}

fn default_visible_field_rows() -> usize {
    8
}

fn default_mapping_kind() -> String {
    "MAP".to_string()
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            lazy_render_threshold: default_lazy_render_threshold(),
            visible_field_rows: default_visible_field_rows(),
            default_mapping_kind: default_mapping_kind(),
            include_unmapped_tables: false,
            layout: LayoutConfig::default(),
        }
    }
}

impl LineageConfig {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LineageConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.visible_field_rows == 0 {
            return Err(LineageError::InvalidConfig {
                field: "visible_field_rows",
                message: "must be at least 1".to_string(),
            });
        }
        if self.layout.column_spacing <= 0.0 || self.layout.row_spacing <= 0.0 {
            return Err(LineageError::InvalidConfig {
                field: "layout",
                message: "spacing must be positive".to_string(),
            });
        }
        Ok(())
    }
}
