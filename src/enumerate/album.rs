use crate::ledger::{AlbumEntry, FailureEvent, FailureKind, Ledger, LedgerError};
use crate::retry::Retrier;
use crate::source::types::AlbumListQuery;
use crate::source::SourceApi;

use super::{next_cursor, WalkStats};

/// Walks the source album listing into per-album detail files, then
/// projects them into the album index.
pub struct AlbumEnumerator<'a> {
    source: &'a dyn SourceApi,
    ledger: &'a Ledger,
    retrier: &'a Retrier,
}

impl<'a> AlbumEnumerator<'a> {
    pub fn new(source: &'a dyn SourceApi, ledger: &'a Ledger, retrier: &'a Retrier) -> Self {
        Self {
            source,
            ledger,
            retrier,
        }
    }

    /// Walk every page, then rebuild the album index from disk.
    pub async fn run(&self) -> Result<Vec<AlbumEntry>, LedgerError> {
        let stats = self.walk().await?;
        let albums = self.ledger.project_album_index().await?;
        tracing::info!(
            pages = stats.pages,
            complete = stats.completed,
            "Enumerated {} albums",
            albums.len()
        );
        Ok(albums)
    }

    pub async fn walk(&self) -> Result<WalkStats, LedgerError> {
        let mut stats = WalkStats::default();
        let mut cursor: Option<String> = None;
        let mut walked_i: u64 = 0;

        loop {
            walked_i += 1;
            let query = AlbumListQuery {
                cursor: cursor.clone(),
            };
            tracing::info!("Walking album list page {}", walked_i);

            let page = match self
                .retrier
                .attempt(|| self.source.list_albums(&query))
                .await
            {
                Ok(page) => page,
                Err(exhausted) => {
                    // Album pages can't be skipped: the next cursor is only
                    // known from the page that failed.
                    tracing::error!(
                        "Album list page {} failed, stopping album walk: {}",
                        walked_i,
                        exhausted
                    );
                    self.ledger
                        .record_failure(
                            FailureEvent::new(FailureKind::AlbumList, walked_i)
                                .with_url(self.source.album_list_url(&query))
                                .with_error(&exhausted.last_error),
                        )
                        .await?;
                    return Ok(stats);
                }
            };

            stats.pages += 1;
            for album in &page.list {
                stats.items += 1;
                self.ledger.save_album_detail(stats.items, album).await?;
            }

            match next_cursor(&page) {
                Some(next) => cursor = Some(next),
                None => {
                    stats.completed = true;
                    return Ok(stats);
                }
            }
        }
    }
}
