//! Archive detection and extraction through an external 7-Zip compatible tool.

use crate::error::ModError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Extensions treated as archives. Detection is by file name only.
pub const ARCHIVE_FORMATS: &[&str] = &[
    "zip", "tar", "split", "rar", "lzma", "iso", "hfs", "gzip", "gz", "cpio", "bzip2", "bz2",
    "7z", "z", "arj", "cab", "lzh", "chm", "nsis", "deb", "rpm", "udf", "wim", "xar",
];

/// Whether `path` ends in one of [`ARCHIVE_FORMATS`] (case-insensitive).
pub fn is_archive(path: &Path) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    ARCHIVE_FORMATS
        .iter()
        .any(|ext| name.ends_with(&format!(".{}", ext)))
}

/// Something able to unpack one archive in a single pass.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Unpacks `archive` into `outdir`. `files` restricts extraction to the named members.
    async fn extract(
        &self,
        archive: &Path,
        outdir: &Path,
        overwrite: bool,
        files: &[String],
    ) -> Result<(), ModError>;

    /// Pre-flight check that the extractor is usable.
    async fn is_available(&self) -> bool;
}

/// The external `7z` command line tool.
#[derive(Debug, Clone)]
pub struct SevenZip {
    program: PathBuf,
    quiet: bool,
}

impl SevenZip {
    pub fn new(program: impl Into<PathBuf>, quiet: bool) -> Self {
        Self {
            program: program.into(),
            quiet,
        }
    }

    /// Arguments for one extraction call: `x -o<outdir> [-y] <archive> [files...]`.
    pub fn extract_args(
        archive: &Path,
        outdir: &Path,
        overwrite: bool,
        files: &[String],
    ) -> Vec<String> {
        let mut args = vec!["x".to_string(), format!("-o{}", outdir.display())];
        if overwrite {
            args.push("-y".to_string());
        }
        args.push(archive.display().to_string());
        args.extend(files.iter().cloned());
        args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null());
        if self.quiet {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        cmd
    }
}

#[async_trait]
impl Extractor for SevenZip {
    async fn extract(
        &self,
        archive: &Path,
        outdir: &Path,
        overwrite: bool,
        files: &[String],
    ) -> Result<(), ModError> {
        let args = Self::extract_args(archive, outdir, overwrite, files);
        debug!("Running {} {:?}", self.program.display(), args);

        let status = self
            .command()
            .args(&args)
            .status()
            .await
            .map_err(|e| ModError::Archive(format!("failed to launch {}: {}", self.program.display(), e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(ModError::Archive(format!(
                "{} exited with {} while extracting {}",
                self.program.display(),
                status,
                archive.display()
            )))
        }
    }

    async fn is_available(&self) -> bool {
        let mut cmd = self.command();
        cmd.stdout(Stdio::null());
        match cmd.arg("-h").status().await {
            Ok(status) => status.success(),
            Err(e) => {
                error!("Call to {} failed: {}", self.program.display(), e);
                false
            }
        }
    }
}

/// Strips the last extension: `pkg.tar.gz` becomes `pkg.tar`.
fn inner_tar_path(archive: &Path) -> Option<PathBuf> {
    let stem = archive.file_stem()?;
    Some(archive.with_file_name(stem))
}

/// Extracts `archive` into `outdir`, using two passes for `name.tar.<ext>`.
///
/// The first pass unpacks the outer compression next to the archive; the
/// second unpacks the resulting tar into `outdir`. The intermediate tar is
/// removed whether or not the second pass succeeds.
pub async fn extract_archive(
    extractor: &dyn Extractor,
    archive: &Path,
    outdir: &Path,
    overwrite: bool,
    files: &[String],
) -> Result<(), ModError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.contains(".tar.") {
        let inner = inner_tar_path(archive)
            .ok_or_else(|| ModError::Archive(format!("bad archive name {}", archive.display())))?;
        let staging = archive.parent().unwrap_or(Path::new("."));

        info!("Unpacking outer layer of {}", archive.display());
        extractor.extract(archive, staging, true, &[]).await?;

        let result = extractor.extract(&inner, outdir, overwrite, files).await;
        if let Err(e) = tokio::fs::remove_file(&inner).await {
            debug!("Could not remove {}: {}", inner.display(), e);
        }
        return result;
    }

    extractor.extract(archive, outdir, overwrite, files).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingExtractor {
        calls: Mutex<Vec<(PathBuf, PathBuf, bool)>>,
    }

    #[async_trait]
    impl Extractor for RecordingExtractor {
        async fn extract(
            &self,
            archive: &Path,
            outdir: &Path,
            overwrite: bool,
            _files: &[String],
        ) -> Result<(), ModError> {
            self.calls
                .lock()
                .push((archive.to_path_buf(), outdir.to_path_buf(), overwrite));
            Ok(())
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("mod/pkg.zip")));
        assert!(is_archive(Path::new("PKG.7Z")));
        assert!(is_archive(Path::new("pkg.tar.gz")));
        assert!(!is_archive(Path::new("readme.txt")));
        assert!(!is_archive(Path::new("zip")));
        assert!(!is_archive(Path::new("data.vp")));
    }

    #[test]
    fn test_extract_args() {
        let args = SevenZip::extract_args(
            Path::new("/tmp/a.7z"),
            Path::new("/out"),
            true,
            &["x.txt".to_string()],
        );
        assert_eq!(args, vec!["x", "-o/out", "-y", "/tmp/a.7z", "x.txt"]);

        let args = SevenZip::extract_args(Path::new("a.zip"), Path::new("o"), false, &[]);
        assert_eq!(args, vec!["x", "-oo", "a.zip"]);
    }

    #[tokio::test]
    async fn test_double_pass_for_compressed_tar() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pkg.tar.gz");
        let outdir = tmp.path().join("out");
        let extractor = RecordingExtractor::default();

        extract_archive(&extractor, &archive, &outdir, false, &[])
            .await
            .unwrap();

        let calls = extractor.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                (archive.clone(), tmp.path().to_path_buf(), true),
                (tmp.path().join("pkg.tar"), outdir.clone(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_single_pass_for_plain_archive() {
        let extractor = RecordingExtractor::default();
        extract_archive(&extractor, Path::new("a/pkg.zip"), Path::new("out"), false, &[])
            .await
            .unwrap();
        assert_eq!(extractor.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let tool = SevenZip::new("/nonexistent/definitely-not-7z", true);
        assert!(!tool.is_available().await);
        let err = tool
            .extract(Path::new("a.zip"), Path::new("out"), false, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ModError::Archive(_)));
    }
}
