use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
};

use crate::{
    error::ViewNavError,
    properties::{ReadMask, ReadMaskFlag},
};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_INDEX_CHANGE_RETRIES: u32 = 5;
/// Selections smaller than this are padded when the padding workaround is enabled.
pub const DEFAULT_PADDING_THRESHOLD: usize = 5000;

/// Padding of small explicit selections on hierarchical indexes. Some engines return corrupted
/// positions when a response-aware index is walked with a small selected set; padding the set with
/// IDs that cannot exist routes around that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPadding {
    pub enabled: bool,
    pub threshold: usize,
}

impl Default for SelectionPadding {
    fn default() -> Self {
        SelectionPadding {
            enabled: false,
            threshold: DEFAULT_PADDING_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Rows requested per page fetch
    pub page_size: u32,
    /// How often one page fetch may re-issue its read after an index change
    pub max_index_change_retries: u32,
    /// Bound for caches built from this config; `None` is unbounded
    pub cache_max_size: Option<usize>,
    pub default_read_mask: ReadMask,
    pub selection_padding: SelectionPadding,
}

impl Default for CursorConfig {
    fn default() -> Self {
        CursorConfig {
            page_size: DEFAULT_PAGE_SIZE,
            max_index_change_retries: DEFAULT_MAX_INDEX_CHANGE_RETRIES,
            cache_max_size: None,
            default_read_mask: ReadMaskFlag::NoteId | ReadMaskFlag::SummaryValues,
            selection_padding: SelectionPadding::default(),
        }
    }
}

impl CursorConfig {
    pub fn validate(&self) -> Result<(), ViewNavError> {
        if self.page_size == 0 {
            return Err(ViewNavError::InvalidArgument(
                "page_size must be positive".to_string(),
            ));
        }
        if self.cache_max_size == Some(0) {
            return Err(ViewNavError::InvalidArgument(
                "cache_max_size must be positive".to_string(),
            ));
        }
        if self.selection_padding.enabled && self.selection_padding.threshold == 0 {
            return Err(ViewNavError::InvalidArgument(
                "selection_padding.threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<CursorConfig, ViewNavError> {
        let config: CursorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<CursorConfig, ViewNavError>;
    fn set_config(&self, config: &CursorConfig) -> Result<(), ViewNavError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<CursorConfig, ViewNavError> {
        tracing::debug!("Attempting to read cursor config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(CursorConfig::default());
        }
        let content = read_to_string(&self.path)?;
        CursorConfig::from_toml_str(&content)
    }

    fn set_config(&self, config: &CursorConfig) -> Result<(), ViewNavError> {
        tracing::debug!("Attempting to write cursor config to: {:?}", &self.path);
        config.validate()?;
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
