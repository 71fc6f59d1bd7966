//! "Start with Windows" through a shortcut in the user's Startup folder.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::info;

pub const LINK_NAME: &str = "HDR-SDR-Brightness.lnk";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Seam so the controller can toggle start-up without touching the shell.
pub trait StartupShortcut: Send {
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;
}

/// `%APPDATA%\Microsoft\Windows\Start Menu\Programs\Startup\<link>`.
pub fn default_link_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|roaming| {
        roaming
            .join("Microsoft")
            .join("Windows")
            .join("Start Menu")
            .join("Programs")
            .join("Startup")
            .join(LINK_NAME)
    })
}

/// Quotes for a PowerShell single-quoted string literal.
fn ps_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn create_link_script(link: &Path, target: &Path, workdir: &Path) -> String {
    format!(
        "$s=(New-Object -ComObject WScript.Shell).CreateShortcut({});\
         $s.TargetPath={};$s.WorkingDirectory={};$s.Save()",
        ps_quote(&link.to_string_lossy()),
        ps_quote(&target.to_string_lossy()),
        ps_quote(&workdir.to_string_lossy()),
    )
}

pub struct ShellShortcut {
    link: PathBuf,
    target: PathBuf,
}

impl ShellShortcut {
    pub fn new(link: PathBuf, target: PathBuf) -> Self {
        Self { link, target }
    }

    fn create(&self) -> Result<()> {
        if let Some(parent) = self.link.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let workdir = self.target.parent().unwrap_or(Path::new("."));
        let script = create_link_script(&self.link, &self.target, workdir);

        let mut cmd = Command::new("powershell");
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        let status = cmd.status().context("launch powershell")?;
        if !status.success() || !self.link.exists() {
            bail!("shortcut creation failed ({status})");
        }
        Ok(())
    }
}

impl StartupShortcut for ShellShortcut {
    fn is_enabled(&self) -> bool {
        self.link.exists()
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            self.create()?;
        } else if self.link.exists() {
            fs::remove_file(&self.link)
                .with_context(|| format!("remove {}", self.link.display()))?;
        }
        info!("startup shortcut enabled={enabled} path={}", self.link.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quotes_are_doubled() {
        assert_eq!(ps_quote(r"C:\Users\O'Neil\app.exe"), r"'C:\Users\O''Neil\app.exe'");
    }

    #[test]
    fn script_targets_every_path() {
        let s = create_link_script(
            Path::new(r"C:\S\x.lnk"),
            Path::new(r"C:\A\app.exe"),
            Path::new(r"C:\A"),
        );
        assert!(s.contains(r"CreateShortcut('C:\S\x.lnk')"));
        assert!(s.contains(r"$s.TargetPath='C:\A\app.exe'"));
        assert!(s.contains(r"$s.WorkingDirectory='C:\A'"));
        assert!(s.ends_with("$s.Save()"));
    }

    #[test]
    fn disabling_removes_link() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join(LINK_NAME);
        fs::write(&link, b"lnk").unwrap();
        let mut sc = ShellShortcut::new(link.clone(), dir.path().join("app.exe"));
        assert!(sc.is_enabled());
        sc.set_enabled(false).unwrap();
        assert!(!sc.is_enabled());
        // Removing twice is fine.
        sc.set_enabled(false).unwrap();
    }

    #[test]
    fn link_lives_in_startup_folder() {
        if let Some(p) = default_link_path() {
            assert!(p.ends_with(Path::new("Startup").join(LINK_NAME)));
        }
    }
}
