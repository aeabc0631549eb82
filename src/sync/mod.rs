//! Per-file migration pipeline.
//!
//! Files are processed one at a time in index order. Each one moves through
//! download, upload, album association and local cleanup before its id is
//! added to the success set. A stage that exhausts its retries records a
//! failure event and abandons the file for this run; the next run picks it
//! up again because it never reached the success set.

pub mod provision;

pub use provision::{AlbumIndex, AlbumProvisioner};

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::destination::types::AssetUpload;
use crate::destination::{DestinationApi, DestinationError};
use crate::ledger::{AlbumEntry, FailureEvent, FailureKind, FileRecord, Ledger, LedgerError};
use crate::retry::{Retrier, RetryAction};
use crate::source::SourceApi;

pub const DEFAULT_DEVICE_ID: &str = "youai-immich";

/// Stop retrying destination calls the server will keep refusing.
pub(crate) fn classify_destination(e: &DestinationError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Lowercase extensions, without the dot, the destination cannot ingest.
    pub skip_extensions: Vec<String>,
    /// Sent as `deviceId`; together with `deviceAssetId` it identifies an
    /// upload so a repeated one is answered as a duplicate.
    pub device_id: String,
    pub no_progress_bar: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            skip_extensions: vec!["livp".to_string()],
            device_id: DEFAULT_DEVICE_ID.to_string(),
            no_progress_bar: false,
        }
    }
}

/// The stage a file was abandoned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Download,
    Upload,
    Associate,
    Cleanup,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Upload => "upload",
            Stage::Associate => "associate",
            Stage::Cleanup => "cleanup",
        }
    }
}

/// Terminal state of one file in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Succeeded,
    SkippedAlready,
    SkippedUnsupported,
    /// The file's album could not be created at the destination.
    SkippedUnprovisioned,
    Failed(Stage),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub succeeded: usize,
    pub skipped_already: usize,
    pub skipped_unsupported: usize,
    pub skipped_unprovisioned: usize,
    pub failed: BTreeMap<Stage, usize>,
    /// A shutdown signal stopped the run before the last file.
    pub interrupted: bool,
}

impl SyncSummary {
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Succeeded => self.succeeded += 1,
            FileOutcome::SkippedAlready => self.skipped_already += 1,
            FileOutcome::SkippedUnsupported => self.skipped_unsupported += 1,
            FileOutcome::SkippedUnprovisioned => self.skipped_unprovisioned += 1,
            FileOutcome::Failed(stage) => *self.failed.entry(stage).or_default() += 1,
        }
    }

    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }

    pub fn processed(&self) -> usize {
        self.succeeded
            + self.skipped_already
            + self.skipped_unsupported
            + self.skipped_unprovisioned
            + self.failed_total()
    }

    fn log(&self) {
        tracing::info!("── Sync Summary ({} files) ──", self.processed());
        tracing::info!("  {} migrated", self.succeeded);
        tracing::info!("  {} already migrated", self.skipped_already);
        tracing::info!("  {} unsupported", self.skipped_unsupported);
        if self.skipped_unprovisioned > 0 {
            tracing::warn!("  {} skipped, album missing at destination", self.skipped_unprovisioned);
        }
        for (stage, count) in &self.failed {
            tracing::warn!("  {} failed at {}", count, stage.as_str());
        }
        if self.interrupted {
            tracing::warn!("  Interrupted before the end of the file index");
        }
    }
}

/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a terminal.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// `true` if the file should never be attempted: no filename left after
/// stripping the service prefix, a name that is not a single plain path
/// component, or a deny-listed extension.
pub fn is_unsupported(file: &FileRecord, skip_extensions: &[String]) -> bool {
    if !is_plain_filename(&file.filename) {
        return true;
    }
    match file.extension() {
        Some(ext) => skip_extensions.iter().any(|skip| skip.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// The local copy lives at `<download dir>/<filename>`, so the name must not
/// reach into subdirectories or out of the download directory.
fn is_plain_filename(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Synthetic per-device id: the filename plus the local copy's mtime.
pub fn device_asset_id(filename: &str, modified: SystemTime) -> String {
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    format!("{}-{}", filename, secs)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Delete a local copy. Absence is not an error.
async fn remove_local(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

pub struct SyncPipeline<'a> {
    source: &'a dyn SourceApi,
    destination: &'a dyn DestinationApi,
    ledger: &'a mut Ledger,
    retrier: &'a Retrier,
    config: SyncConfig,
    albums: AlbumIndex,
    progress: ProgressBar,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(
        source: &'a dyn SourceApi,
        destination: &'a dyn DestinationApi,
        ledger: &'a mut Ledger,
        retrier: &'a Retrier,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            destination,
            ledger,
            retrier,
            config,
            albums: AlbumIndex::new(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Provision destination albums for every source album title.
    pub async fn setup(&mut self, albums: &[AlbumEntry]) -> anyhow::Result<()> {
        self.albums = AlbumProvisioner::new(self.destination, self.ledger, self.retrier)
            .provision(albums)
            .await?;
        Ok(())
    }

    /// Migrate `files` in order. Stops early, between files, once `shutdown`
    /// is cancelled. Only ledger I/O errors abort the run.
    pub async fn run(
        &mut self,
        files: &[FileRecord],
        shutdown: &CancellationToken,
    ) -> Result<SyncSummary, LedgerError> {
        self.progress = create_progress_bar(self.config.no_progress_bar, files.len() as u64);
        let mut summary = SyncSummary::default();

        for (i, file) in files.iter().enumerate() {
            if shutdown.is_cancelled() {
                self.progress
                    .suspend(|| tracing::info!("Shutdown requested, stopping before {}", file.id));
                summary.interrupted = true;
                break;
            }
            self.progress.set_message(file.filename.clone());
            let walked_i = i as u64 + 1;
            let outcome = self.sync_file(walked_i, files.len(), file).await?;
            summary.record(outcome);
            self.progress.inc(1);
        }

        self.progress.finish_and_clear();
        summary.log();
        Ok(summary)
    }

    async fn sync_file(
        &mut self,
        walked_i: u64,
        total: usize,
        file: &FileRecord,
    ) -> Result<FileOutcome, LedgerError> {
        if self.ledger.is_migrated(&file.id).await? {
            tracing::debug!("{} already migrated", file.id);
            return Ok(FileOutcome::SkippedAlready);
        }
        if is_unsupported(file, &self.config.skip_extensions) {
            tracing::debug!("Skipping unsupported file {:?} ({})", file.filename, file.id);
            return Ok(FileOutcome::SkippedUnsupported);
        }
        let Some(album_id) = self.albums.get(&file.album_title).cloned() else {
            self.progress.suspend(|| {
                tracing::warn!(
                    "Skipping {}: album {} does not exist at the destination",
                    file.id,
                    file.album_title
                )
            });
            return Ok(FileOutcome::SkippedUnprovisioned);
        };

        self.progress.suspend(|| {
            tracing::info!("[{}/{}] Migrating {} ({})", walked_i, total, file.filename, file.id)
        });
        let local = self.ledger.download_path(&file.filename);

        if !self.download(walked_i, file, &local).await? {
            return Ok(FileOutcome::Failed(Stage::Download));
        }

        // The local copy stays when the upload fails, so a later run with
        // downloads kept can retry without fetching it again.
        let Some(asset_id) = self.upload(walked_i, file, &local).await? else {
            return Ok(FileOutcome::Failed(Stage::Upload));
        };

        if !self.associate(walked_i, file, &album_id, &asset_id).await? {
            // The asset is already at the destination; a re-upload next run
            // is answered as a duplicate and only the association is retried.
            if let Err(e) = remove_local(&local).await {
                tracing::warn!("Could not remove {}: {}", local.display(), e);
            }
            return Ok(FileOutcome::Failed(Stage::Associate));
        }

        if let Err(e) = remove_local(&local).await {
            self.progress.suspend(|| {
                tracing::error!("Could not remove local copy {}: {}", local.display(), e)
            });
            return Ok(FileOutcome::Failed(Stage::Cleanup));
        }

        self.ledger.record_success(&file.id).await?;
        Ok(FileOutcome::Succeeded)
    }

    /// Fetch the file into `local`, through a `.part` sibling so a failed
    /// download never leaves anything at `local`. Returns `false` after
    /// recording a failure.
    async fn download(
        &self,
        walked_i: u64,
        file: &FileRecord,
        local: &Path,
    ) -> Result<bool, LedgerError> {
        if fs::try_exists(local).await.unwrap_or(false) {
            tracing::debug!("Reusing local copy {}", local.display());
            return Ok(true);
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::io(parent, e))?;
        }

        let part = part_path(local);
        let result = self
            .retrier
            .attempt(|| {
                let part = &part;
                async move {
                    let _ = fs::remove_file(part).await;
                    self.source.download(&file.download_link, part).await
                }
            })
            .await;

        match result {
            Ok(bytes) => {
                fs::rename(&part, local)
                    .await
                    .map_err(|e| LedgerError::io(local, e))?;
                tracing::debug!(bytes, "Downloaded {}", local.display());
                Ok(true)
            }
            Err(exhausted) => {
                let _ = fs::remove_file(&part).await;
                self.progress.suspend(|| {
                    tracing::error!("Download of {} failed: {}", file.id, exhausted)
                });
                self.ledger
                    .record_failure(
                        FailureEvent::new(FailureKind::DownloadFile, walked_i)
                            .with_url(&file.download_link)
                            .with_id(&file.id)
                            .with_error(&exhausted.last_error),
                    )
                    .await?;
                Ok(false)
            }
        }
    }

    /// Upload the local copy. Returns the destination asset id, which is the
    /// existing asset's id when the server reports a duplicate.
    async fn upload(
        &self,
        walked_i: u64,
        file: &FileRecord,
        local: &Path,
    ) -> Result<Option<String>, LedgerError> {
        let modified = match fs::metadata(local).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                self.progress
                    .suspend(|| tracing::error!("Cannot stat {}: {}", local.display(), e));
                self.record_upload_failure(walked_i, file, &e).await?;
                return Ok(None);
            }
        };

        let upload = AssetUpload {
            device_asset_id: device_asset_id(&file.filename, modified),
            device_id: self.config.device_id.clone(),
            file_created_at: file.created_at_utc(),
            file_modified_at: file.modified_at_utc(),
            is_favorite: false,
            filename: file.filename.clone(),
        };

        match self
            .retrier
            .attempt_with(classify_destination, || {
                self.destination.upload_asset(&upload, local)
            })
            .await
        {
            Ok(response) => {
                if response.is_duplicate() {
                    tracing::debug!("{} is already asset {}", file.id, response.id);
                }
                Ok(Some(response.id))
            }
            Err(exhausted) => {
                self.progress
                    .suspend(|| tracing::error!("Upload of {} failed: {}", file.id, exhausted));
                self.record_upload_failure(walked_i, file, &exhausted.last_error)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn record_upload_failure(
        &self,
        walked_i: u64,
        file: &FileRecord,
        error: &dyn std::fmt::Display,
    ) -> Result<(), LedgerError> {
        self.ledger
            .record_failure(
                FailureEvent::new(FailureKind::UploadAsset, walked_i)
                    .with_id(&file.id)
                    .with_error(error),
            )
            .await
    }

    async fn associate(
        &self,
        walked_i: u64,
        file: &FileRecord,
        album_id: &str,
        asset_id: &str,
    ) -> Result<bool, LedgerError> {
        let ids = [asset_id.to_string()];
        match self
            .retrier
            .attempt_with(classify_destination, || {
                self.destination.add_assets_to_album(album_id, &ids)
            })
            .await
        {
            Ok(()) => Ok(true),
            Err(exhausted) => {
                self.progress.suspend(|| {
                    tracing::error!(
                        "Adding {} to album {} failed: {}",
                        file.id,
                        file.album_title,
                        exhausted
                    )
                });
                self.ledger
                    .record_failure(
                        FailureEvent::new(FailureKind::AddAssetToAlbum, walked_i)
                            .with_id(&file.id)
                            .with_error(&exhausted.last_error),
                    )
                    .await?;
                Ok(false)
            }
        }
    }
}
