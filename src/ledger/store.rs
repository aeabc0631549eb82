//! File-backed ledger implementation.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use super::error::LedgerError;
use super::types::{AlbumEntry, Detail, FailureEvent, FailureKind, FileRecord};
use crate::source::types::{RawAlbum, RawFile};

const ALBUM_DIR: &str = "album";
const FILE_DIR: &str = "file";
const DOWNLOAD_DIR: &str = "download";
const ALBUMS_FILE: &str = "albums.json";
const FILES_FILE: &str = "files.json";
const SUCCESS_FILE: &str = "success.json";
const FAILURE_FILE: &str = "failure.json";
const LOCK_FILE: &str = ".lock";

/// Durable store for enumeration results and migration progress.
///
/// Every write is a whole-file rewrite through a temp file and rename, so
/// a process killed at any point leaves each file either old or new, never
/// torn.
pub struct Ledger {
    root: PathBuf,
    /// Loaded on first use, then authoritative for the rest of the run.
    successes: Option<HashSet<String>>,
    /// Exclusive advisory lock held for the lifetime of the ledger; released
    /// when the file descriptor is dropped.
    _lock_file: std::fs::File,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Counts reported by the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub albums: usize,
    pub files: usize,
    pub migrated: usize,
    pub pending: usize,
    pub failures: BTreeMap<FailureKind, usize>,
}

impl Ledger {
    /// Open (creating if needed) the ledger rooted at `root`.
    ///
    /// Fails with [`LedgerError::Locked`] if another process already has it open.
    pub async fn open(root: &Path) -> Result<Self, LedgerError> {
        let root = root.to_path_buf();
        for dir in [
            root.clone(),
            root.join(ALBUM_DIR),
            root.join(FILE_DIR),
            root.join(DOWNLOAD_DIR),
        ] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| LedgerError::io(&dir, e))?;
        }

        let lock_path = root.join(LOCK_FILE);
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| LedgerError::io(&lock_path, e))?;
        FileExt::try_lock_exclusive(&lock_file).map_err(|_| LedgerError::Locked(root.clone()))?;

        tracing::debug!("Opened ledger at {}", root.display());
        Ok(Self {
            root,
            successes: None,
            _lock_file: lock_file,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn album_dir(&self) -> PathBuf {
        self.root.join(ALBUM_DIR)
    }

    pub fn file_dir(&self) -> PathBuf {
        self.root.join(FILE_DIR)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.root.join(DOWNLOAD_DIR)
    }

    /// Where a file's transient local copy lives while it is migrated.
    pub fn download_path(&self, filename: &str) -> PathBuf {
        self.download_dir().join(filename)
    }

    fn albums_path(&self) -> PathBuf {
        self.root.join(ALBUMS_FILE)
    }

    fn files_path(&self) -> PathBuf {
        self.root.join(FILES_FILE)
    }

    fn success_path(&self) -> PathBuf {
        self.root.join(SUCCESS_FILE)
    }

    fn failure_path(&self) -> PathBuf {
        self.root.join(FAILURE_FILE)
    }

    // ── Enumeration ──

    /// Pre-run housekeeping: enumeration is always a full re-walk, so the
    /// detail directories start empty. Indexes, successes and failures are
    /// kept; they are what makes the run resumable.
    pub async fn clear_enumeration(&self, clear_downloads: bool) -> Result<(), LedgerError> {
        clear_dir(&self.album_dir()).await?;
        clear_dir(&self.file_dir()).await?;
        if clear_downloads {
            clear_dir(&self.download_dir()).await?;
        }
        Ok(())
    }

    pub async fn save_album_detail(&self, walk_seq: u64, album: &RawAlbum) -> Result<(), LedgerError> {
        let path = self
            .album_dir()
            .join(format!("{}.json", sanitize_key(&album.album_id)));
        write_json_atomic(&path, &Detail { walk_seq, item: album }).await
    }

    pub async fn save_file_detail(&self, walk_seq: u64, file: &RawFile) -> Result<(), LedgerError> {
        let key = super::types::file_key(&file.album_id, file.fsid);
        let path = self.file_dir().join(format!("{}.json", sanitize_key(&key)));
        write_json_atomic(&path, &Detail { walk_seq, item: file }).await
    }

    /// Rebuild the album index from the detail files on disk.
    pub async fn project_album_index(&self) -> Result<Vec<AlbumEntry>, LedgerError> {
        let details: Vec<(PathBuf, Detail<RawAlbum>)> = read_details(&self.album_dir()).await?;
        let albums: Vec<AlbumEntry> = details
            .into_iter()
            .map(|(_, d)| AlbumEntry {
                id: d.item.album_id,
                title: d.item.title,
            })
            .collect();
        write_json_atomic(&self.albums_path(), &albums).await?;
        tracing::debug!("Projected {} albums into {}", albums.len(), ALBUMS_FILE);
        Ok(albums)
    }

    /// Rebuild the file index from the detail files on disk, joining each
    /// file with its album's title from the album index.
    pub async fn project_file_index(&self) -> Result<Vec<FileRecord>, LedgerError> {
        let titles: std::collections::HashMap<String, String> = self
            .albums()
            .await?
            .into_iter()
            .map(|a| (a.id, a.title))
            .collect();

        let details: Vec<(PathBuf, Detail<RawFile>)> = read_details(&self.file_dir()).await?;
        let mut files = Vec::with_capacity(details.len());
        for (path, detail) in details {
            let title = titles
                .get(&detail.item.album_id)
                .ok_or_else(|| LedgerError::UnknownAlbum {
                    album_id: detail.item.album_id.clone(),
                    file: path.clone(),
                })?;
            files.push(FileRecord::from_raw(&detail.item, title));
        }
        write_json_atomic(&self.files_path(), &files).await?;
        tracing::debug!("Projected {} files into {}", files.len(), FILES_FILE);
        Ok(files)
    }

    /// The last projected album index, or empty if none was written yet.
    pub async fn albums(&self) -> Result<Vec<AlbumEntry>, LedgerError> {
        read_json_or_default(&self.albums_path()).await
    }

    /// The last projected file index, or empty if none was written yet.
    pub async fn files(&self) -> Result<Vec<FileRecord>, LedgerError> {
        read_json_or_default(&self.files_path()).await
    }

    // ── Progress ──

    pub async fn successes(&mut self) -> Result<&HashSet<String>, LedgerError> {
        if self.successes.is_none() {
            let ids: Vec<String> = read_json_or_default(&self.success_path()).await?;
            self.successes = Some(ids.into_iter().collect());
        }
        Ok(self.successes.get_or_insert_with(HashSet::new))
    }

    pub async fn is_migrated(&mut self, id: &str) -> Result<bool, LedgerError> {
        Ok(self.successes().await?.contains(id))
    }

    /// Add `id` to the success set and persist the whole set immediately.
    pub async fn record_success(&mut self, id: &str) -> Result<(), LedgerError> {
        self.successes().await?;
        let path = self.success_path();
        let set = self.successes.get_or_insert_with(HashSet::new);
        set.insert(id.to_string());
        let mut ids: Vec<&String> = set.iter().collect();
        ids.sort();
        write_json_atomic(&path, &ids).await
    }

    pub async fn failures(&self) -> Result<Vec<FailureEvent>, LedgerError> {
        read_json_or_default(&self.failure_path()).await
    }

    /// Append one event to the failure log.
    pub async fn record_failure(&self, event: FailureEvent) -> Result<(), LedgerError> {
        let path = self.failure_path();
        let mut failures: Vec<FailureEvent> = read_json_or_default(&path).await?;
        failures.push(event);
        write_json_atomic(&path, &failures).await
    }

    pub async fn summary(&mut self) -> Result<LedgerSummary, LedgerError> {
        let albums = self.albums().await?.len();
        let files = self.files().await?;
        let failures = self.failures().await?;
        let successes = self.successes().await?;

        let pending = files.iter().filter(|f| !successes.contains(&f.id)).count();
        let mut by_kind = BTreeMap::new();
        for event in &failures {
            *by_kind.entry(event.kind).or_insert(0) += 1;
        }

        Ok(LedgerSummary {
            albums,
            files: files.len(),
            migrated: successes.len(),
            pending,
            failures: by_kind,
        })
    }
}

/// Keep composite keys usable as single path components.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Remove every regular file directly inside `dir`.
async fn clear_dir(dir: &Path) -> Result<(), LedgerError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(LedgerError::io(dir, e)),
    };
    let mut removed = 0usize;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LedgerError::io(dir, e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| LedgerError::io(&path, e))?
            .is_file();
        if is_file {
            fs::remove_file(&path)
                .await
                .map_err(|e| LedgerError::io(&path, e))?;
            removed += 1;
        }
    }
    tracing::debug!("Cleared {} files from {}", removed, dir.display());
    Ok(())
}

/// Read every `*.json` detail file in `dir`, ordered by walk position.
///
/// Ties (a file rewritten by a later page) fall back to the path so the
/// result is deterministic.
async fn read_details<T: DeserializeOwned>(
    dir: &Path,
) -> Result<Vec<(PathBuf, Detail<T>)>, LedgerError> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| LedgerError::io(dir, e))?;
    let mut details = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LedgerError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = fs::read(&path)
            .await
            .map_err(|e| LedgerError::io(&path, e))?;
        let detail: Detail<T> =
            serde_json::from_slice(&bytes).map_err(|e| LedgerError::json(&path, e))?;
        details.push((path, detail));
    }
    details.sort_by(|(pa, a), (pb, b)| a.walk_seq.cmp(&b.walk_seq).then_with(|| pa.cmp(pb)));
    Ok(details)
}

async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, LedgerError> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| LedgerError::json(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(LedgerError::io(path, e)),
    }
}

/// Pretty-print `value` with four-space indentation and swap it into place.
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), LedgerError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| LedgerError::json(path, e))?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .await
        .map_err(|e| LedgerError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| LedgerError::io(path, e))?;
    Ok(())
}
