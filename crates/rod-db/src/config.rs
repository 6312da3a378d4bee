use std::fs;
use std::path::Path;

use rod_types::IndexKind;
use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

/// Options for opening a database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Reject stores and never write files back.
    pub readonly: bool,
    /// Backing strategy of join indexes.
    pub index_kind: IndexKind,
    /// Number of keys each index is pre-sized for.
    pub cache_size: usize,
    /// Run an arrangement pass after the compatibility check.
    pub arrange_on_open: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            readonly: false,
            index_kind: IndexKind::Hash,
            cache_size: 1024,
            arrange_on_open: false,
        }
    }
}

impl DatabaseConfig {
    pub fn readonly() -> Self {
        Self {
            readonly: true,
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> DbResult<Self> {
        toml::from_str(text).map_err(|e| DbError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> DbResult<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}
