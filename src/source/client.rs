use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::error::SourceError;
use super::types::{AlbumListQuery, FileListForm, Page, RawAlbum, RawFile, ALBUM_PAGE_SIZE};
use super::SourceApi;

/// The listing endpoints reject requests that don't look like a browser.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36";

pub const DEFAULT_SOURCE_URL: &str = "https://photo.baidu.com/youai/album/v1";

/// Connection settings for [`SourceClient`].
#[derive(Clone)]
pub struct SourceClientConfig {
    pub base_url: String,
    pub cookie: String,
    pub clienttype: String,
    pub bdstoken: String,
    pub need_amount: String,
    pub need_member: String,
    /// Applies to connecting and to each read, not to the whole transfer.
    pub timeout: Duration,
}

impl std::fmt::Debug for SourceClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceClientConfig")
            .field("base_url", &self.base_url)
            .field("cookie", &"<redacted>")
            .field("clienttype", &self.clienttype)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// HTTP client for the source photo service, authenticated by cookie.
pub struct SourceClient {
    client: Client,
    config: SourceClientConfig,
}

impl SourceClient {
    pub fn new(config: SourceClientConfig) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        default_headers.insert(
            COOKIE,
            HeaderValue::from_str(&config.cookie).context("Cookie is not a valid header value")?,
        );

        let client = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Build `<base_url>/<path>?clienttype=..&bdstoken=..` plus `extra` pairs,
    /// percent-encoding every value.
    fn endpoint(&self, path: &str, extra: &[(&str, &str)]) -> String {
        let raw = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        match Url::parse(&raw) {
            Ok(mut url) => {
                {
                    let mut pairs = url.query_pairs_mut();
                    pairs.append_pair("clienttype", &self.config.clienttype);
                    pairs.append_pair("bdstoken", &self.config.bdstoken);
                    for (k, v) in extra {
                        pairs.append_pair(k, v);
                    }
                }
                url.into()
            }
            // Left unparsed so the request itself reports the bad URL.
            Err(_) => raw,
        }
    }
}

/// Reject non-2xx responses and application-level `errno` failures.
async fn parse_page<T: DeserializeOwned>(
    response: Response,
    url: &str,
) -> Result<Page<T>, SourceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let page: Page<T> = response.json().await.map_err(|e| SourceError::Http {
        url: url.to_string(),
        source: e,
    })?;
    if page.errno != 0 {
        return Err(SourceError::Api {
            errno: page.errno,
            url: url.to_string(),
        });
    }
    Ok(page)
}

#[async_trait::async_trait]
impl SourceApi for SourceClient {
    fn album_list_url(&self, query: &AlbumListQuery) -> String {
        let limit = ALBUM_PAGE_SIZE.to_string();
        let mut extra = vec![
            ("limit", limit.as_str()),
            ("need_amount", self.config.need_amount.as_str()),
            ("need_member", self.config.need_member.as_str()),
            ("field", "mtime"),
        ];
        if let Some(cursor) = query.cursor.as_deref() {
            extra.push(("cursor", cursor));
        }
        self.endpoint("list", &extra)
    }

    fn file_list_url(&self) -> String {
        self.endpoint("listfile", &[])
    }

    async fn list_albums(&self, query: &AlbumListQuery) -> Result<Page<RawAlbum>, SourceError> {
        let url = self.album_list_url(query);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Http {
                url: url.clone(),
                source: e,
            })?;
        parse_page(response, &url).await
    }

    async fn list_files(&self, form: &FileListForm) -> Result<Page<RawFile>, SourceError> {
        let url = self.file_list_url();
        let response = self
            .client
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| SourceError::Http {
                url: url.clone(),
                source: e,
            })?;
        parse_page(response, &url).await
    }

    async fn download(&self, link: &str, dest: &Path) -> Result<u64, SourceError> {
        let http_err = |e: reqwest::Error| SourceError::Http {
            url: link.to_string(),
            source: e,
        };
        let disk_err = |e: std::io::Error| SourceError::Disk {
            path: dest.to_path_buf(),
            source: e,
        };

        let response = self.client.get(link).send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                url: link.to_string(),
            });
        }

        let mut file = File::create(dest).await.map_err(disk_err)?;
        let mut bytes_written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_err)?;
            file.write_all(&chunk).await.map_err(disk_err)?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await.map_err(disk_err)?;
        Ok(bytes_written)
    }
}
