use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Save store settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub save_dir:         PathBuf,
    pub backup_dir:       PathBuf,
    /// Backup files are named `{prefix}_{slot}_{timestamp}{extension}`.
    pub backup_prefix:    String,
    /// Newest backups kept per slot. 0 disables backups.
    pub backup_retention: usize,
    pub extension:        String,
    /// Frame tags that refuse a save while anywhere on the stack.
    pub unsafe_states:    Vec<String>,
    pub pretty:           bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            save_dir:         PathBuf::from("saves"),
            backup_dir:       PathBuf::from("backups"),
            backup_prefix:    "backup".into(),
            backup_retention: 5,
            extension:        ".json".into(),
            unsafe_states:    vec!["combat".into(), "trade".into()],
            pretty:           true,
        }
    }
}

impl StoreConfig {
    /// Load from a JSON config file.
    /// In tests, use `StoreConfig::under(tempdir)`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid store config {}: {e}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Defaults with both directories placed under `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            save_dir:   root.join("saves"),
            backup_dir: root.join("backups"),
            ..Self::default()
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.backup_retention = retention;
        self
    }

    pub fn is_unsafe_state(&self, tag: &str) -> bool {
        self.unsafe_states.iter().any(|s| s == tag)
    }

    fn check(&self) -> anyhow::Result<()> {
        if !self.extension.starts_with('.') || self.extension.len() < 2 {
            anyhow::bail!("extension must look like \".json\", got {:?}", self.extension);
        }
        if self.backup_prefix.is_empty() || self.backup_prefix.contains(['/', '\\']) {
            anyhow::bail!("backup_prefix {:?} is not a plain file-name prefix", self.backup_prefix);
        }
        Ok(())
    }
}
