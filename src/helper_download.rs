//! Fetches the `set_sdrwhite.exe` helper when it is not installed.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use zip::ZipArchive;

use crate::brightness::HELPER_EXE;
use crate::dialogs;
use crate::paths::AppDirs;

const RELEASE_ZIP_URL: &str =
    "https://github.com/ledoge/set_maxtml/releases/download/v0.2/release.zip";
const UA: &str = "HDR-SDR-Brightness (+https://github.com/ledoge/set_maxtml)";
const TITLE: &str = "HDR SDR Brightness";

/// Temp file removed on drop, whatever the outcome.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_file(&self.0) {
                warn!("helper-download cleanup-failed path={} error={e}", self.0.display());
            }
        }
    }
}

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "hdr-sdr-brightness-{}-{tag}",
        chrono::Local::now().format("%Y%m%d-%H%M%S%3f")
    ))
}

fn download_to(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(UA)
        .build()?;

    let mut resp = client.get(url).send()?;
    if !resp.status().is_success() {
        bail!("Download failed: {}", resp.status());
    }

    let mut f = File::create(dest).with_context(|| format!("create {}", dest.display()))?;
    io::copy(&mut resp, &mut f)?;
    Ok(())
}

/// Copies the member whose file name is `name` (at any depth) out of the
/// archive into `dest`.
fn extract_member(zip_path: &Path, name: &str, dest: &Path) -> Result<()> {
    let file = File::open(zip_path)?;
    let mut zip = ZipArchive::new(file)?;

    let member = zip
        .file_names()
        .find(|n| {
            n.rsplit(['/', '\\'])
                .next()
                .is_some_and(|base| base.eq_ignore_ascii_case(name))
        })
        .map(str::to_string);
    let Some(member) = member else {
        bail!("{name} not found in archive");
    };

    let mut entry = zip.by_name(&member)?;
    let mut out = File::create(dest).with_context(|| format!("create {}", dest.display()))?;
    io::copy(&mut entry, &mut out)?;
    Ok(())
}

/// Copies `src` into the app dir, or into the data dir when the app dir is
/// not writable.
fn install(src: &Path, dirs: &AppDirs) -> Result<PathBuf> {
    let primary = dirs.app_dir.join(HELPER_EXE);
    match fs::copy(src, &primary) {
        Ok(_) => return Ok(primary),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!("helper-download app-dir not writable, using data dir");
        }
        Err(e) => return Err(e).with_context(|| format!("copy to {}", primary.display())),
    }

    fs::create_dir_all(&dirs.data_dir)
        .with_context(|| format!("create {}", dirs.data_dir.display()))?;
    let fallback = dirs.data_dir.join(HELPER_EXE);
    fs::copy(src, &fallback).with_context(|| format!("copy to {}", fallback.display()))?;
    Ok(fallback)
}

fn fetch_and_install(url: &str, dirs: &AppDirs) -> Result<PathBuf> {
    let archive = TempFile(temp_path("release.zip"));
    let extracted = TempFile(temp_path(HELPER_EXE));

    download_to(url, &archive.0)?;
    extract_member(&archive.0, HELPER_EXE, &extracted.0)?;
    install(&extracted.0, dirs)
}

/// Asks the user, downloads, installs. Returns the installed path.
pub fn install_with_consent(dirs: &AppDirs) -> Option<PathBuf> {
    let ask = format!(
        "{HELPER_EXE} was not found.\n\nDownload it from\n{RELEASE_ZIP_URL}\nnow?"
    );
    if !dialogs::confirm(TITLE, &ask) {
        info!("helper-download declined");
        return None;
    }

    match fetch_and_install(RELEASE_ZIP_URL, dirs) {
        Ok(path) => {
            info!("helper-download installed path={}", path.display());
            dialogs::info(TITLE, &format!("Installed {}", path.display()));
            Some(path)
        }
        Err(e) => {
            warn!("helper-download failed error={e:#}");
            dialogs::error(TITLE, &format!("Could not download {HELPER_EXE}:\n{e:#}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_nested_member_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("release.zip");
        write_zip(
            &zip_path,
            &[
                ("release/readme.txt", b"hi"),
                ("release/set_sdrwhite.exe", b"MZ-helper"),
            ],
        );
        let dest = dir.path().join("out.exe");
        extract_member(&zip_path, HELPER_EXE, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"MZ-helper");
    }

    #[test]
    fn missing_member_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("release.zip");
        write_zip(&zip_path, &[("set_maxtml.exe", b"x")]);
        let err = extract_member(&zip_path, HELPER_EXE, &dir.path().join("o")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn installs_into_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.exe");
        fs::write(&src, b"bin").unwrap();
        let dirs = AppDirs {
            app_dir: dir.path().join("app"),
            data_dir: dir.path().join("data"),
        };
        fs::create_dir_all(&dirs.app_dir).unwrap();
        let installed = install(&src, &dirs).unwrap();
        assert_eq!(installed, dirs.app_dir.join(HELPER_EXE));
        assert_eq!(fs::read(installed).unwrap(), b"bin");
    }

    #[test]
    fn temp_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("t");
        fs::write(&p, b"x").unwrap();
        drop(TempFile(p.clone()));
        assert!(!p.exists());
    }
}
