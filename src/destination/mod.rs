//! Destination photo server: album listing and creation, asset upload, and
//! album association.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DestinationClient, DestinationClientConfig};
pub use error::DestinationError;

use std::path::Path;

use types::{AssetUpload, AssetUploadResponse, DestinationAlbum};

/// The subset of the destination API the migration depends on.
#[async_trait::async_trait]
pub trait DestinationApi: Send + Sync {
    async fn list_albums(&self) -> Result<Vec<DestinationAlbum>, DestinationError>;

    async fn create_album(&self, name: &str) -> Result<DestinationAlbum, DestinationError>;

    /// Upload the file at `path` with the given metadata.
    async fn upload_asset(
        &self,
        upload: &AssetUpload,
        path: &Path,
    ) -> Result<AssetUploadResponse, DestinationError>;

    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<(), DestinationError>;
}
