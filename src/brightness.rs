//! Applies an SDR white level through the external `set_sdrwhite.exe` tool.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::dialogs;
use crate::helper_download;
use crate::paths::AppDirs;

pub const HELPER_EXE: &str = "set_sdrwhite.exe";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// 0% is 80 nits, 100% is 480 nits.
pub fn percent_to_nits(percent: u8) -> u32 {
    80 + 4 * u32::from(percent.min(100))
}

/// Where the helper may live, in lookup order.
pub fn helper_candidates(dirs: &AppDirs) -> [PathBuf; 4] {
    [
        dirs.app_dir.join(HELPER_EXE),
        dirs.app_dir.join("tools").join(HELPER_EXE),
        dirs.data_dir.join(HELPER_EXE),
        dirs.data_dir.join("tools").join(HELPER_EXE),
    ]
}

pub fn resolve_helper(dirs: &AppDirs) -> Option<PathBuf> {
    helper_candidates(dirs).into_iter().find(|p| p.is_file())
}

/// Something that can set the SDR brightness.
///
/// `interactive` applies come from a direct user action and may show
/// dialogs; the others (wheel, schedule) only log.
pub trait BrightnessSink: Send {
    fn apply(&mut self, percent: u8, interactive: bool) -> bool;
}

pub struct SdrWhiteTool {
    dirs: AppDirs,
}

impl SdrWhiteTool {
    pub fn new(dirs: AppDirs) -> Self {
        Self { dirs }
    }

    fn run(tool: &Path, nits: u32) -> Result<()> {
        let mut cmd = Command::new(tool);
        cmd.arg("0")
            .arg(nits.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        let status = cmd
            .status()
            .with_context(|| format!("launch {}", tool.display()))?;
        if !status.success() {
            bail!("{HELPER_EXE} exited with {status}");
        }
        Ok(())
    }
}

impl BrightnessSink for SdrWhiteTool {
    fn apply(&mut self, percent: u8, interactive: bool) -> bool {
        let tool = match resolve_helper(&self.dirs) {
            Some(t) => t,
            None if interactive => match helper_download::install_with_consent(&self.dirs) {
                Some(t) => t,
                None => return false,
            },
            None => {
                warn!("brightness helper-missing percent={percent}");
                return false;
            }
        };

        let nits = percent_to_nits(percent);
        match Self::run(&tool, nits) {
            Ok(()) => {
                info!("brightness applied percent={percent} nits={nits}");
                true
            }
            Err(e) => {
                warn!("brightness apply-failed percent={percent} error={e:#}");
                if interactive {
                    dialogs::error("HDR SDR Brightness", &format!("{e:#}"));
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn nits_mapping() {
        assert_eq!(percent_to_nits(0), 80);
        assert_eq!(percent_to_nits(35), 220);
        assert_eq!(percent_to_nits(100), 480);
        assert_eq!(percent_to_nits(250), 480);
    }

    #[test]
    fn helper_lookup_prefers_app_dir_then_tools_then_data() {
        let root = tempfile::tempdir().unwrap();
        let dirs = AppDirs {
            app_dir: root.path().join("app"),
            data_dir: root.path().join("data"),
        };
        assert_eq!(resolve_helper(&dirs), None);

        let data_tools = dirs.data_dir.join("tools");
        fs::create_dir_all(&data_tools).unwrap();
        fs::write(data_tools.join(HELPER_EXE), b"").unwrap();
        assert_eq!(resolve_helper(&dirs), Some(data_tools.join(HELPER_EXE)));

        let app_tools = dirs.app_dir.join("tools");
        fs::create_dir_all(&app_tools).unwrap();
        fs::write(app_tools.join(HELPER_EXE), b"").unwrap();
        assert_eq!(resolve_helper(&dirs), Some(app_tools.join(HELPER_EXE)));

        fs::write(dirs.app_dir.join(HELPER_EXE), b"").unwrap();
        assert_eq!(resolve_helper(&dirs), Some(dirs.app_dir.join(HELPER_EXE)));
    }

    #[test]
    fn silent_apply_without_helper_fails_quietly() {
        let root = tempfile::tempdir().unwrap();
        let mut tool = SdrWhiteTool::new(AppDirs {
            app_dir: root.path().to_path_buf(),
            data_dir: root.path().join("data"),
        });
        assert!(!tool.apply(50, false));
    }
}
