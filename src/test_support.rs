//! Scripted in-memory stand-ins for the source and destination APIs.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::destination::types::{AssetUpload, AssetUploadResponse, DestinationAlbum};
use crate::destination::{DestinationApi, DestinationError};
use crate::source::types::{AlbumListQuery, FileListForm, Page, RawAlbum, RawFile};
use crate::source::{SourceApi, SourceError};

pub fn album_page(albums: &[(&str, &str)], cursor: Option<&str>) -> Page<RawAlbum> {
    Page {
        list: albums
            .iter()
            .map(|(id, title)| RawAlbum {
                album_id: id.to_string(),
                title: title.to_string(),
                extra: Default::default(),
            })
            .collect(),
        cursor: cursor.map(str::to_string),
        errno: 0,
    }
}

/// A page of files in `album_id`; each name becomes `/youai/file/<name>`,
/// whose 12-character service prefix strips back to `<name>`.
pub fn file_page(album_id: &str, files: &[(u64, &str)], cursor: Option<&str>) -> Page<RawFile> {
    Page {
        list: files
            .iter()
            .map(|(fsid, name)| RawFile {
                album_id: album_id.to_string(),
                fsid: *fsid,
                path: format!("/youai/file/{}", name),
                dlink: download_link(album_id, *fsid),
                ctime: 1_600_000_000 + *fsid as i64,
                mtime: 1_600_000_100 + *fsid as i64,
                extra: Default::default(),
            })
            .collect(),
        cursor: cursor.map(str::to_string),
        errno: 0,
    }
}

/// Serve one HTTP response on a local port, sending `body` one byte per
/// `gap`. Returns the server's base URL.
pub async fn trickle_server(content_type: &str, body: &[u8], gap: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content_type,
        body.len()
    );
    let body = body.to_vec();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = stream.read(&mut request).await;
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        for byte in body {
            tokio::time::sleep(gap).await;
            if stream.write_all(&[byte]).await.is_err() {
                return;
            }
            let _ = stream.flush().await;
        }
    });
    format!("http://{}", addr)
}

pub fn download_link(album_id: &str, fsid: u64) -> String {
    format!("https://dl.example/{}/{}", album_id, fsid)
}

#[derive(Default)]
pub struct FakeSource {
    album_pages: Mutex<VecDeque<Result<Page<RawAlbum>, SourceError>>>,
    album_cursors: Mutex<Vec<Option<String>>>,
    file_pages: Mutex<HashMap<String, VecDeque<Result<Page<RawFile>, SourceError>>>>,
    file_forms: Mutex<Vec<FileListForm>>,
    download_failures: Mutex<HashMap<String, u32>>,
    downloads: Mutex<Vec<String>>,
    cancel_on_download: Mutex<Option<CancellationToken>>,
}

impl FakeSource {
    pub fn transient(message: &str) -> SourceError {
        SourceError::Status {
            status: 503,
            url: message.to_string(),
        }
    }

    pub fn push_album_page(&self, page: Result<Page<RawAlbum>, SourceError>) {
        self.album_pages.lock().unwrap().push_back(page);
    }

    pub fn push_file_page(&self, album_id: &str, page: Result<Page<RawFile>, SourceError>) {
        self.file_pages
            .lock()
            .unwrap()
            .entry(album_id.to_string())
            .or_default()
            .push_back(page);
    }

    /// Make the next `times` downloads of `link` fail.
    pub fn fail_downloads(&self, link: &str, times: u32) {
        self.download_failures
            .lock()
            .unwrap()
            .insert(link.to_string(), times);
    }

    /// Cancel `token` as soon as a download starts, as a signal arriving
    /// mid-file would.
    pub fn cancel_on_download(&self, token: CancellationToken) {
        *self.cancel_on_download.lock().unwrap() = Some(token);
    }

    pub fn album_cursors(&self) -> Vec<Option<String>> {
        self.album_cursors.lock().unwrap().clone()
    }

    pub fn file_forms(&self) -> Vec<FileListForm> {
        self.file_forms.lock().unwrap().clone()
    }

    /// Links passed to `download`, one entry per attempt.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn body_of(link: &str) -> Vec<u8> {
        format!("bytes of {}", link).into_bytes()
    }
}

#[async_trait::async_trait]
impl SourceApi for FakeSource {
    fn album_list_url(&self, query: &AlbumListQuery) -> String {
        match &query.cursor {
            Some(cursor) => format!("fake://albums?cursor={}", cursor),
            None => "fake://albums".to_string(),
        }
    }

    fn file_list_url(&self) -> String {
        "fake://files".to_string()
    }

    async fn list_albums(&self, query: &AlbumListQuery) -> Result<Page<RawAlbum>, SourceError> {
        self.album_cursors.lock().unwrap().push(query.cursor.clone());
        self.album_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(album_page(&[], None)))
    }

    async fn list_files(&self, form: &FileListForm) -> Result<Page<RawFile>, SourceError> {
        self.file_forms.lock().unwrap().push(form.clone());
        self.file_pages
            .lock()
            .unwrap()
            .get_mut(&form.album_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(file_page(&form.album_id, &[], None)))
    }

    async fn download(&self, link: &str, dest: &Path) -> Result<u64, SourceError> {
        self.downloads.lock().unwrap().push(link.to_string());
        let cancel = self.cancel_on_download.lock().unwrap().clone();
        if let Some(token) = cancel {
            token.cancel();
        }
        let fail = {
            let mut failures = self.download_failures.lock().unwrap();
            match failures.get_mut(link) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            return Err(Self::transient(link));
        }
        let body = Self::body_of(link);
        tokio::fs::write(dest, &body)
            .await
            .map_err(|e| SourceError::Disk {
                path: dest.to_path_buf(),
                source: e,
            })?;
        Ok(body.len() as u64)
    }
}

/// One recorded upload: metadata plus the bytes read from disk.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub upload: AssetUpload,
    pub bytes: Vec<u8>,
}

/// In-memory destination. Uploading bytes it already holds answers
/// `duplicate` with the original asset id, as the real server's checksum
/// dedup does.
#[derive(Default)]
pub struct FakeDestination {
    albums: Mutex<Vec<DestinationAlbum>>,
    created: Mutex<Vec<String>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    assets_by_content: Mutex<HashMap<Vec<u8>, String>>,
    upload_attempts: Mutex<u32>,
    associations: Mutex<Vec<(String, Vec<String>)>>,
    upload_failures: Mutex<u32>,
    associate_failures: Mutex<u32>,
    create_failures: Mutex<u32>,
    reject_uploads: Mutex<bool>,
    block_cleanup: Mutex<Option<PathBuf>>,
}

impl FakeDestination {
    pub fn with_albums(albums: &[(&str, &str)]) -> Self {
        let fake = Self::default();
        *fake.albums.lock().unwrap() = albums
            .iter()
            .map(|(id, name)| DestinationAlbum {
                id: id.to_string(),
                album_name: name.to_string(),
            })
            .collect();
        fake
    }

    pub fn transient() -> DestinationError {
        DestinationError::Status {
            status: 503,
            url: "fake://destination".to_string(),
            body: "unavailable".to_string(),
        }
    }

    pub fn fail_uploads(&self, times: u32) {
        *self.upload_failures.lock().unwrap() = times;
    }

    /// Every upload answers 400 until cleared.
    pub fn reject_uploads(&self, reject: bool) {
        *self.reject_uploads.lock().unwrap() = reject;
    }

    pub fn fail_associations(&self, times: u32) {
        *self.associate_failures.lock().unwrap() = times;
    }

    pub fn fail_creates(&self, times: u32) {
        *self.create_failures.lock().unwrap() = times;
    }

    /// On the next successful association, replace the file at `local` with
    /// a directory so that deleting the local copy fails.
    pub fn block_cleanup_of(&self, local: PathBuf) {
        *self.block_cleanup.lock().unwrap() = Some(local);
    }

    pub fn albums(&self) -> Vec<DestinationAlbum> {
        self.albums.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    /// Every `upload_asset` call, including failed ones.
    pub fn upload_attempts(&self) -> u32 {
        *self.upload_attempts.lock().unwrap()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    /// `(album_id, asset_ids)` per successful association call.
    pub fn associations(&self) -> Vec<(String, Vec<String>)> {
        self.associations.lock().unwrap().clone()
    }

    fn take_failure(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait::async_trait]
impl DestinationApi for FakeDestination {
    async fn list_albums(&self) -> Result<Vec<DestinationAlbum>, DestinationError> {
        Ok(self.albums())
    }

    async fn create_album(&self, name: &str) -> Result<DestinationAlbum, DestinationError> {
        if Self::take_failure(&self.create_failures) {
            return Err(Self::transient());
        }
        let mut albums = self.albums.lock().unwrap();
        let album = DestinationAlbum {
            id: format!("dest-album-{}", albums.len() + 1),
            album_name: name.to_string(),
        };
        albums.push(album.clone());
        self.created.lock().unwrap().push(name.to_string());
        Ok(album)
    }

    async fn upload_asset(
        &self,
        upload: &AssetUpload,
        path: &Path,
    ) -> Result<AssetUploadResponse, DestinationError> {
        *self.upload_attempts.lock().unwrap() += 1;
        if *self.reject_uploads.lock().unwrap() {
            return Err(DestinationError::Status {
                status: 400,
                url: "fake://destination/assets".to_string(),
                body: "bad request".to_string(),
            });
        }
        if Self::take_failure(&self.upload_failures) {
            return Err(Self::transient());
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DestinationError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut assets = self.assets_by_content.lock().unwrap();
        if let Some(existing) = assets.get(&bytes) {
            return Ok(AssetUploadResponse {
                id: existing.clone(),
                status: Some("duplicate".to_string()),
            });
        }
        let id = format!("asset-{}", assets.len() + 1);
        assets.insert(bytes.clone(), id.clone());
        self.uploads.lock().unwrap().push(RecordedUpload {
            upload: upload.clone(),
            bytes,
        });
        Ok(AssetUploadResponse {
            id,
            status: Some("created".to_string()),
        })
    }

    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<(), DestinationError> {
        if Self::take_failure(&self.associate_failures) {
            return Err(Self::transient());
        }
        if let Some(local) = self.block_cleanup.lock().unwrap().take() {
            std::fs::remove_file(&local).unwrap();
            std::fs::create_dir(&local).unwrap();
        }
        self.associations
            .lock()
            .unwrap()
            .push((album_id.to_string(), asset_ids.to_vec()));
        Ok(())
    }
}
