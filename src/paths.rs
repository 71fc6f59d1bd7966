use std::path::{Path, PathBuf};

use crate::settings::APP_DIR_NAME;

/// Directories the app reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    /// Directory of the running executable.
    pub app_dir: PathBuf,
    /// Per-user data directory (settings, downloaded helper).
    pub data_dir: PathBuf,
}

impl AppDirs {
    pub fn discover() -> Self {
        let app_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs_next::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| app_dir.clone());
        Self { app_dir, data_dir }
    }

    /// Log directory candidates, most preferred first.
    pub fn log_dirs(&self) -> Vec<PathBuf> {
        vec![self.app_dir.clone(), self.data_dir.clone()]
    }
}
