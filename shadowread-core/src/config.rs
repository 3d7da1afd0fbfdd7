use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::search::{MatchMode, SearchEngine, DEFAULT_SEARCH_WINDOW};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Characters per page.
    pub page_size: usize,
    /// Seconds a page stays visible before the decoy text replaces it. 0 disables hiding.
    pub hidden_time: u64,
    pub search_window: usize,
    pub match_mode: MatchMode,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            hidden_time: 30,
            search_window: DEFAULT_SEARCH_WINDOW,
            match_mode: MatchMode::default(),
        }
    }
}

impl ReaderConfig {
    pub fn default_path(dirs: &ProjectDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("invalid config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("page_size must be positive");
        }
        if self.search_window == 0 {
            bail!("search_window must be positive");
        }
        Ok(())
    }

    pub fn hidden_after(&self) -> Option<Duration> {
        (self.hidden_time > 0).then(|| Duration::from_secs(self.hidden_time))
    }

    pub fn search_engine(&self) -> SearchEngine {
        SearchEngine::new(self.search_window, self.match_mode)
    }
}
