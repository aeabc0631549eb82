//! Source photo service: paginated album and file listings plus direct
//! file downloads.

pub mod client;
pub mod error;
pub mod types;

pub use client::{SourceClient, SourceClientConfig};
pub use error::SourceError;

use std::path::Path;

use types::{AlbumListQuery, FileListForm, Page, RawAlbum, RawFile};

/// The subset of the source API the migration depends on.
///
/// Implemented over HTTP by [`SourceClient`]; tests substitute a scripted fake.
#[async_trait::async_trait]
pub trait SourceApi: Send + Sync {
    /// Full request URL for an album listing page, recorded in failure events.
    fn album_list_url(&self, query: &AlbumListQuery) -> String;

    /// Request URL for file listing pages (the album and cursor travel in the form body).
    fn file_list_url(&self) -> String;

    async fn list_albums(&self, query: &AlbumListQuery) -> Result<Page<RawAlbum>, SourceError>;

    async fn list_files(&self, form: &FileListForm) -> Result<Page<RawFile>, SourceError>;

    /// Stream the body at `link` into `dest`, truncating it first.
    /// Returns the number of bytes written.
    async fn download(&self, link: &str, dest: &Path) -> Result<u64, SourceError>;
}
