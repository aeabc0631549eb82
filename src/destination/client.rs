use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use super::error::DestinationError;
use super::types::{
    AssetUpload, AssetUploadResponse, BulkIdResponse, BulkIdsRequest, CreateAlbumRequest,
    DestinationAlbum,
};
use super::DestinationApi;

pub const DEFAULT_DESTINATION_URL: &str = "http://127.0.0.1:2283";

/// Longest response body excerpt kept in a status error.
const ERROR_BODY_LIMIT: usize = 200;

/// Connection settings for [`DestinationClient`].
#[derive(Clone)]
pub struct DestinationClientConfig {
    pub base_url: String,
    pub api_key: String,
    /// Applies to connecting and to each read, not to the whole transfer.
    pub timeout: Duration,
}

impl std::fmt::Debug for DestinationClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP client for the destination server, authenticated by API key.
pub struct DestinationClient {
    client: Client,
    base_url: String,
}

impl DestinationClient {
    pub fn new(config: DestinationClientConfig) -> anyhow::Result<Self> {
        let mut api_key =
            HeaderValue::from_str(&config.api_key).context("API key is not a valid header value")?;
        api_key.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert("x-api-key", api_key);

        let client = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }
}

fn http_error(url: &str) -> impl FnOnce(reqwest::Error) -> DestinationError + '_ {
    move |e| DestinationError::Http {
        url: url.to_string(),
        source: e,
    }
}

/// Turn a non-2xx response into a status error carrying a body excerpt.
async fn check_status(response: Response, url: &str) -> Result<Response, DestinationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(ERROR_BODY_LIMIT)
        .collect();
    Err(DestinationError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, DestinationError> {
    let response = check_status(response, url).await?;
    response.json().await.map_err(http_error(url))
}

#[async_trait::async_trait]
impl DestinationApi for DestinationClient {
    async fn list_albums(&self) -> Result<Vec<DestinationAlbum>, DestinationError> {
        let url = self.url("albums");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(http_error(&url))?;
        parse_json(response, &url).await
    }

    async fn create_album(&self, name: &str) -> Result<DestinationAlbum, DestinationError> {
        let url = self.url("albums");
        let response = self
            .client
            .post(&url)
            .json(&CreateAlbumRequest { album_name: name })
            .send()
            .await
            .map_err(http_error(&url))?;
        parse_json(response, &url).await
    }

    async fn upload_asset(
        &self,
        upload: &AssetUpload,
        path: &Path,
    ) -> Result<AssetUploadResponse, DestinationError> {
        let url = self.url("assets");
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DestinationError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut form = Form::new();
        for (name, value) in upload.form_fields() {
            form = form.text(name, value);
        }
        form = form.part(
            "assetData",
            Part::bytes(bytes).file_name(upload.filename.clone()),
        );

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(http_error(&url))?;
        parse_json(response, &url).await
    }

    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<(), DestinationError> {
        let url = self.url(&format!("albums/{}/assets", album_id));
        let response = self
            .client
            .put(&url)
            .json(&BulkIdsRequest { ids: asset_ids })
            .send()
            .await
            .map_err(http_error(&url))?;
        let results: Vec<BulkIdResponse> = parse_json(response, &url).await?;

        match results.into_iter().find(|r| !r.is_associated()) {
            Some(rejected) => Err(DestinationError::Rejected {
                album_id: album_id.to_string(),
                asset_id: rejected.id,
                reason: rejected.error.unwrap_or_else(|| "unknown".to_string()),
            }),
            None => Ok(()),
        }
    }
}
