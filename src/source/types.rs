use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One page of a cursor-paginated listing.
///
/// The service reports application-level failures through `errno` while
/// still answering HTTP 200, so callers must check it before trusting `list`.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub errno: i64,
}

impl<T> Page<T> {
    /// The cursor for the next page, treating an empty string as absent.
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// An album as returned by the album listing endpoint.
///
/// Only the fields the migration depends on are typed; the rest are kept
/// verbatim so detail files preserve the full upstream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAlbum {
    pub album_id: String,
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A file entry as returned by the per-album file listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFile {
    pub album_id: String,
    pub fsid: u64,
    pub path: String,
    pub dlink: String,
    pub ctime: i64,
    pub mtime: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Query for one page of the album listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumListQuery {
    pub cursor: Option<String>,
}

/// Form body for one page of an album's file listing.
///
/// Serialised as-is into the failure log when the page cannot be fetched,
/// so the request can be replayed by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileListForm {
    pub cursor: String,
    pub album_id: String,
    pub need_amount: String,
    pub limit: String,
    pub passwd: String,
}

impl FileListForm {
    pub fn new(album_id: &str, cursor: Option<&str>, need_amount: &str) -> Self {
        Self {
            cursor: cursor.unwrap_or_default().to_string(),
            album_id: album_id.to_string(),
            need_amount: need_amount.to_string(),
            limit: FILE_PAGE_SIZE.to_string(),
            passwd: String::new(),
        }
    }
}

pub(crate) const ALBUM_PAGE_SIZE: u32 = 30;
pub(crate) const FILE_PAGE_SIZE: u32 = 100;
