//! The install/update pipeline.
//!
//! Each entry is installed in six strictly ordered stages:
//!
//! 1. Delete stale paths
//! 2. Apply renames
//! 3. Download files, trying mirrors in order
//! 4. Extract archives through a temporary directory
//! 5. Verify declared hashes
//! 6. Remove the extracted archives
//!
//! Per-item failures are logged and recorded in the [`InstallReport`]; no
//! stage aborts the pipeline.

use crate::archive::{extract_archive, is_archive, Extractor, SevenZip};
use crate::error::ModError;
use crate::model::ModEntry;
use crate::paths::{move_file, move_tree, resolve_existing_case};
use crate::progress::Progress;
use crate::transfer::{DownloadTask, Fetched, Transfer};
use crate::types::{ClientConfig, InstallStage};
use crate::verify::{compute_file_hash_async, digest_matches, HashAlgorithm, HashCache};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// What happened during an install.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub deleted: Vec<String>,
    /// Deletion targets that did not exist.
    pub missing: Vec<String>,
    pub renamed: Vec<(String, String)>,
    /// Rename sources that did not exist.
    pub rename_skipped: Vec<String>,
    pub downloaded: Vec<String>,
    pub not_modified: Vec<String>,
    pub failed_downloads: Vec<String>,
    pub extracted: Vec<String>,
    pub failed_extractions: Vec<String>,
    pub hash_mismatches: Vec<String>,
    /// Hashes that could not be computed (missing file, unknown algorithm).
    /// These fail [`InstallReport::is_success`] but leave `hashes_ok` alone.
    pub hash_errors: Vec<String>,
    pub hashes_ok: bool,
    pub cleaned: Vec<String>,
    /// Filesystem operations that failed on existing paths.
    pub failed_operations: Vec<String>,
    pub stages_run: Vec<InstallStage>,
}

impl InstallReport {
    fn new() -> Self {
        Self {
            hashes_ok: true,
            ..Self::default()
        }
    }

    /// All downloads and extractions succeeded and every declared hash was
    /// computed and matched.
    pub fn is_success(&self) -> bool {
        self.failed_downloads.is_empty()
            && self.failed_extractions.is_empty()
            && self.failed_operations.is_empty()
            && self.hash_errors.is_empty()
            && self.hashes_ok
    }
}

/// Runs install pipelines against a game directory.
pub struct Installer {
    transfer: Transfer,
    extractor: Arc<dyn Extractor>,
    hash_cache: Arc<HashCache>,
    progress: Arc<dyn Progress>,
}

impl Installer {
    /// Builds an installer using the external archive tool named in `config`.
    pub fn new(config: &ClientConfig, progress: Arc<dyn Progress>) -> Result<Self, ModError> {
        let extractor = Arc::new(SevenZip::new(
            config.archive_tool.clone(),
            config.quiet_archive_tool,
        ));
        Ok(Self::with_parts(
            Transfer::new(config)?,
            extractor,
            HashCache::new(),
            progress,
        ))
    }

    pub fn with_parts(
        transfer: Transfer,
        extractor: Arc<dyn Extractor>,
        hash_cache: Arc<HashCache>,
        progress: Arc<dyn Progress>,
    ) -> Self {
        Self {
            transfer,
            extractor,
            hash_cache,
            progress,
        }
    }

    /// Whether the archive tool can be run.
    pub async fn check_tool(&self) -> bool {
        self.extractor.is_available().await
    }

    /// Starts a staged install of `entry` under `game_root`, creating its install folder.
    ///
    /// `selection` limits downloads (and thus extraction and cleanup) to the named files.
    pub fn session<'a>(
        &'a self,
        entry: &'a ModEntry,
        game_root: &Path,
        selection: Option<&'a HashSet<String>>,
    ) -> Result<InstallSession<'a>, ModError> {
        let mod_path = game_root.join(&entry.install_folder);
        if !mod_path.is_dir() {
            std::fs::create_dir_all(&mod_path)?;
        }

        Ok(InstallSession {
            installer: self,
            entry,
            mod_path,
            selection,
            next: Some(InstallStage::Delete),
            report: InstallReport::new(),
        })
    }

    /// Installs or updates `entry`, running all six stages.
    pub async fn setup(
        &self,
        entry: &ModEntry,
        game_root: &Path,
        selection: Option<&HashSet<String>>,
    ) -> Result<InstallReport, ModError> {
        info!("📦 Installing \"{}\"", entry.name);
        let report = self.session(entry, game_root, selection)?.run().await;

        if report.is_success() {
            info!("✅ Installed \"{}\"", entry.name);
        } else {
            warn!("⚠️  \"{}\" installed with problems", entry.name);
        }
        Ok(report)
    }

    /// Removes every path in `entry.deletions`. Missing paths are only warned about.
    pub fn execute_delete(&self, entry: &ModEntry, mod_path: &Path, report: &mut InstallReport) {
        let count = entry.deletions.len().max(1) as f64;

        for (i, item) in entry.deletions.iter().enumerate() {
            info!("Deleting \"{}\"...", item);
            self.progress.update(i as f64 / count, &format!("\"{}\"", item));

            let path = resolve_existing_case(&mod_path.join(item));
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else if path.exists() {
                std::fs::remove_file(&path)
            } else {
                warn!("\"{}\" not found!", path.display());
                report.missing.push(item.clone());
                continue;
            };

            match result {
                Ok(()) => report.deleted.push(item.clone()),
                Err(e) => {
                    error!("Failed to delete \"{}\": {}", path.display(), e);
                    report.failed_operations.push(item.clone());
                }
            }
        }
    }

    /// Applies `entry.renames` in order. Missing sources are skipped.
    pub fn execute_rename(&self, entry: &ModEntry, mod_path: &Path, report: &mut InstallReport) {
        let count = entry.renames.len().max(1) as f64;

        for (i, rename) in entry.renames.iter().enumerate() {
            info!("Moving \"{}\" to \"{}\"...", rename.source, rename.destination);
            self.progress.update(
                i as f64 / count,
                &format!("\"{}\" to \"{}\"", rename.source, rename.destination),
            );

            let source = resolve_existing_case(&mod_path.join(&rename.source));
            if !source.exists() {
                warn!("\"{}\" not found!", source.display());
                report.rename_skipped.push(rename.source.clone());
                continue;
            }

            let destination = resolve_existing_case(&mod_path.join(&rename.destination));
            let result = if source.is_dir() {
                move_tree(&source, &destination, false)
                    .and_then(|_| std::fs::remove_dir_all(&source))
            } else {
                move_file(&source, &destination)
            };

            match result {
                Ok(()) => report
                    .renamed
                    .push((rename.source.clone(), rename.destination.clone())),
                Err(e) => {
                    error!("Failed to move \"{}\": {}", source.display(), e);
                    report.failed_operations.push(rename.source.clone());
                }
            }
        }
    }

    /// Downloads the selected files of every file group into `mod_path`.
    ///
    /// Each file gets an equal share of the stage's progress.
    pub async fn download(
        &self,
        entry: &ModEntry,
        mod_path: &Path,
        selection: Option<&HashSet<String>>,
        report: &mut InstallReport,
    ) {
        let count = entry.files(selection).len();
        let mut num = 0usize;

        for group in &entry.file_groups {
            for filename in &group.files {
                if selection.is_some_and(|sel| !sel.contains(filename)) {
                    continue;
                }

                self.progress.start_task(
                    num as f64 / count as f64,
                    1.0 / count as f64,
                    &format!("{}/{}: {{}}", num + 1, count),
                );

                let mut task =
                    DownloadTask::new(filename.clone(), group.mirrors.clone(), mod_path.join(filename));
                match self.transfer.try_download(&mut task, self.progress.as_ref()).await {
                    Ok(Fetched::Ok(len)) => {
                        info!("✅ Downloaded \"{}\" ({} bytes)", filename, len);
                        report.downloaded.push(filename.clone());
                    }
                    Ok(Fetched::NotModified) => {
                        info!("\"{}\" not modified", filename);
                        report.not_modified.push(filename.clone());
                    }
                    Err(e) => {
                        error!("Failed to download \"{}\"! {}", filename, e);
                        report.failed_downloads.push(filename.clone());
                    }
                }

                self.progress.finish_task();
                num += 1;
            }
        }
    }

    /// Extracts the archives downloaded in this install and merges them into `mod_path`.
    ///
    /// Files that failed to download or were not modified are left alone.
    pub async fn extract(&self, entry: &ModEntry, mod_path: &Path, report: &mut InstallReport) {
        let files = report.downloaded.clone();
        let count = files.len().max(1) as f64;

        for (i, item) in files.iter().enumerate() {
            let archive = mod_path.join(item);
            if !archive.is_file() || !is_archive(&archive) {
                continue;
            }

            self.progress.update(i as f64 / count, &format!("\"{}\"", item));

            match self.extract_one(&archive, mod_path, entry.ignore_subpath).await {
                Ok(()) => report.extracted.push(item.clone()),
                Err(e) => {
                    error!("Failed to extract \"{}\": {}", item, e);
                    report.failed_extractions.push(item.clone());
                }
            }
        }
    }

    /// Extracts into a fresh temporary directory, then moves the result into place.
    async fn extract_one(
        &self,
        archive: &Path,
        mod_path: &Path,
        ignore_subpath: bool,
    ) -> Result<(), ModError> {
        let tempdir = tempfile::Builder::new()
            .prefix(".modsync-")
            .tempdir_in(mod_path)?;

        extract_archive(self.extractor.as_ref(), archive, tempdir.path(), false, &[]).await?;

        if ignore_subpath {
            let files: Vec<_> = WalkDir::new(tempdir.path())
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .collect();
            for entry in files {
                let target = resolve_existing_case(&mod_path.join(entry.file_name()));
                move_file(entry.path(), &target)?;
            }
        } else {
            move_tree(tempdir.path(), mod_path, true)?;
        }

        Ok(())
    }

    /// Checks every declared hash. Returns `true` if all computed digests matched.
    pub async fn check_hashes(
        &self,
        entry: &ModEntry,
        mod_path: &Path,
        report: &mut InstallReport,
    ) -> bool {
        let count = entry.hashes.len().max(1) as f64;
        let mut alright = true;

        for (i, hash) in entry.hashes.iter().enumerate() {
            self.progress.update(i as f64 / count, &format!("\"{}\"", hash.path));

            let algorithm = match HashAlgorithm::parse(&hash.algorithm) {
                Ok(a) => a,
                Err(e) => {
                    error!("Failed to compute checksum for \"{}\": {}", hash.path, e);
                    report.hash_errors.push(hash.path.clone());
                    continue;
                }
            };

            let path = resolve_existing_case(&mod_path.join(&hash.path));
            let computed =
                match compute_file_hash_async(path, algorithm, Arc::clone(&self.hash_cache)).await {
                    Ok(digest) => digest,
                    Err(e) => {
                        error!(
                            "Failed to compute checksum for \"{}\" with algorithm \"{}\": {}",
                            hash.path, hash.algorithm, e
                        );
                        report.hash_errors.push(hash.path.clone());
                        continue;
                    }
                };

            if !digest_matches(&computed, &hash.digest) {
                alright = false;
                warn!(
                    "File \"{}\" has checksum \"{}\" but should have \"{}\"! Used algorithm: {}",
                    hash.path, computed, hash.digest, hash.algorithm
                );
                report.hash_mismatches.push(hash.path.clone());
            }
        }

        report.hashes_ok = alright;
        alright
    }

    /// Deletes the archives extracted earlier in this install.
    pub fn cleanup(&self, mod_path: &Path, report: &mut InstallReport) {
        let extracted = report.extracted.clone();
        let count = extracted.len().max(1) as f64;

        for (i, item) in extracted.iter().enumerate() {
            let path = mod_path.join(item);
            if !path.exists() {
                continue;
            }

            self.progress.update(i as f64 / count, &format!("\"{}\"", item));
            match std::fs::remove_file(&path) {
                Ok(()) => report.cleaned.push(item.clone()),
                Err(e) => {
                    error!("Failed to remove \"{}\": {}", path.display(), e);
                    report.failed_operations.push(item.clone());
                }
            }
        }
    }
}

/// One install in progress. Stages can only run in pipeline order.
pub struct InstallSession<'a> {
    installer: &'a Installer,
    entry: &'a ModEntry,
    mod_path: PathBuf,
    selection: Option<&'a HashSet<String>>,
    next: Option<InstallStage>,
    report: InstallReport,
}

impl<'a> InstallSession<'a> {
    /// The stage [`InstallSession::advance`] will run, or `None` when finished.
    pub fn next_stage(&self) -> Option<InstallStage> {
        self.next
    }

    pub fn mod_path(&self) -> &Path {
        &self.mod_path
    }

    pub fn report(&self) -> &InstallReport {
        &self.report
    }

    /// Runs the next stage and returns it, or `None` if all stages are done.
    pub async fn advance(&mut self) -> Option<InstallStage> {
        let stage = self.next?;
        let installer = self.installer;
        let progress = installer.progress.as_ref();
        let total = InstallStage::ALL.len() as f64;

        progress.start_task(stage.index() as f64 / total, 1.0 / total, stage.label());

        match stage {
            InstallStage::Delete => {
                installer.execute_delete(self.entry, &self.mod_path, &mut self.report)
            }
            InstallStage::Rename => {
                installer.execute_rename(self.entry, &self.mod_path, &mut self.report)
            }
            InstallStage::Download => {
                installer
                    .download(self.entry, &self.mod_path, self.selection, &mut self.report)
                    .await
            }
            InstallStage::Extract => {
                installer
                    .extract(self.entry, &self.mod_path, &mut self.report)
                    .await
            }
            InstallStage::VerifyHashes => {
                installer
                    .check_hashes(self.entry, &self.mod_path, &mut self.report)
                    .await;
            }
            InstallStage::Cleanup => installer.cleanup(&self.mod_path, &mut self.report),
        }

        progress.finish_task();
        self.report.stages_run.push(stage);
        self.next = stage.next();
        Some(stage)
    }

    /// Runs all remaining stages and returns the report.
    pub async fn run(mut self) -> InstallReport {
        while self.advance().await.is_some() {}
        self.report
    }
}
