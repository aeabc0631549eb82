//! Records persisted by the ledger.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::types::RawFile;

/// Number of leading characters of a source path that belong to the
/// service's own storage prefix rather than the user's filename.
pub const SERVICE_PREFIX_LEN: usize = 12;

/// Compact album index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumEntry {
    pub id: String,
    pub title: String,
}

/// Flattened file index entry, joined with its album's title.
///
/// Serialised field names match the on-disk index format, so an index
/// written by an earlier run is read back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// `<album_id>_<fsid>`; unique across the whole library.
    pub id: String,
    pub fsid: u64,
    pub album_id: String,
    pub album_title: String,
    /// Destination-relative filename, with the service prefix stripped.
    pub filename: String,
    #[serde(rename = "dlink")]
    pub download_link: String,
    /// Unix seconds.
    #[serde(rename = "ctime")]
    pub created_at: i64,
    /// Unix seconds.
    #[serde(rename = "mtime")]
    pub modified_at: i64,
}

impl FileRecord {
    pub fn from_raw(raw: &RawFile, album_title: &str) -> Self {
        Self {
            id: file_key(&raw.album_id, raw.fsid),
            fsid: raw.fsid,
            album_id: raw.album_id.clone(),
            album_title: album_title.to_string(),
            filename: strip_service_prefix(&raw.path),
            download_link: raw.dlink.clone(),
            created_at: raw.ctime,
            modified_at: raw.mtime,
        }
    }

    pub fn created_at_utc(&self) -> DateTime<Utc> {
        unix_to_utc(self.created_at)
    }

    pub fn modified_at_utc(&self) -> DateTime<Utc> {
        unix_to_utc(self.modified_at)
    }

    /// Lowercased extension of `filename`, if it has one.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Composite identity of a file within an album.
pub fn file_key(album_id: &str, fsid: u64) -> String {
    format!("{}_{}", album_id, fsid)
}

/// Drop the fixed-length service prefix from a source path.
///
/// Counts characters rather than bytes so non-ASCII filenames are never
/// split mid-codepoint. Paths no longer than the prefix yield "".
pub fn strip_service_prefix(path: &str) -> String {
    path.chars().skip(SERVICE_PREFIX_LEN).collect()
}

fn unix_to_utc(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}

/// Which remote operation a failure event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AlbumList,
    FileList,
    DownloadFile,
    UploadAsset,
    AddAssetToAlbum,
    CreateAlbum,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlbumList => "album_list",
            Self::FileList => "file_list",
            Self::DownloadFile => "download_file",
            Self::UploadAsset => "upload_asset",
            Self::AddAssetToAlbum => "add_asset_to_album",
            Self::CreateAlbum => "create_album",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the failure log. Diagnostic only: nothing reads the log
/// back to make control-flow decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    #[serde(rename = "type")]
    pub kind: FailureKind,
    /// 1-based position of the request within its stage.
    pub walked_i: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formdata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub time: String,
}

impl FailureEvent {
    pub fn new(kind: FailureKind, walked_i: u64) -> Self {
        Self {
            kind,
            walked_i,
            url: None,
            id: None,
            formdata: None,
            error: None,
            time: Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_formdata(mut self, formdata: Value) -> Self {
        self.formdata = Some(formdata);
        self
    }

    pub fn with_error(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// A per-item detail file: the raw upstream record plus its position in
/// the walk that produced it, so projections can restore source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Detail<T> {
    pub walk_seq: u64,
    #[serde(flatten)]
    pub item: T,
}
