use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// An album as listed or created by the destination server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DestinationAlbum {
    pub id: String,
    #[serde(rename = "albumName")]
    pub album_name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateAlbumRequest<'a> {
    #[serde(rename = "albumName")]
    pub album_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct BulkIdsRequest<'a> {
    pub ids: &'a [String],
}

/// Per-id outcome of a bulk album association.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkIdResponse {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl BulkIdResponse {
    /// Success, or the asset was already in the album.
    pub fn is_associated(&self) -> bool {
        self.success || self.error.as_deref() == Some("duplicate")
    }
}

/// Metadata sent alongside the binary payload of an asset upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpload {
    /// Unique per device; re-uploading the same id is answered as a duplicate.
    pub device_asset_id: String,
    pub device_id: String,
    pub file_created_at: DateTime<Utc>,
    pub file_modified_at: DateTime<Utc>,
    pub is_favorite: bool,
    pub filename: String,
}

impl AssetUpload {
    /// Multipart text fields, in the order the server documents them.
    pub fn form_fields(&self) -> [(&'static str, String); 5] {
        [
            ("deviceAssetId", self.device_asset_id.clone()),
            ("deviceId", self.device_id.clone()),
            (
                "fileCreatedAt",
                self.file_created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "fileModifiedAt",
                self.file_modified_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("isFavorite", self.is_favorite.to_string()),
        ]
    }
}

/// Server reply to an upload: the new asset's id, or the id of the asset it duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetUploadResponse {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl AssetUploadResponse {
    pub fn is_duplicate(&self) -> bool {
        self.status.as_deref() == Some("duplicate")
    }
}
