//! Where copied files land locally: `<root>/<yyyyMMdd>/<file name>`

use std::path::{Path, PathBuf};

use flashsync_core::{config::SyncConfig, domain::FileEntry};

#[derive(Debug, Clone)]
pub struct LocalLayout {
    root: PathBuf,
    lowercase_extension: bool,
}

impl LocalLayout {
    pub fn new(root: impl Into<PathBuf>, lowercase_extension: bool) -> Self {
        Self {
            root: root.into(),
            lowercase_extension,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.local_folder.clone(), config.lowercase_extension)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of `entry`, dated by the card's timestamp
    pub fn compose(&self, entry: &FileEntry) -> PathBuf {
        let day = entry.date().format("%Y%m%d").to_string();
        self.root.join(day).join(self.local_name(entry.file_name()))
    }

    fn local_name(&self, name: &str) -> String {
        if !self.lowercase_extension {
            return name.to_string();
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                format!("{stem}.{}", ext.to_lowercase())
            }
            _ => name.to_string(),
        }
    }
}
