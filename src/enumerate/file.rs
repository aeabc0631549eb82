use crate::ledger::{AlbumEntry, FailureEvent, FailureKind, FileRecord, Ledger, LedgerError};
use crate::retry::Retrier;
use crate::source::types::FileListForm;
use crate::source::SourceApi;

use super::{next_cursor, WalkStats};

/// Walks every indexed album's file listing into per-file detail files,
/// then projects them into the flattened file index.
pub struct FileEnumerator<'a> {
    source: &'a dyn SourceApi,
    ledger: &'a Ledger,
    retrier: &'a Retrier,
    need_amount: String,
}

/// Counters shared by all album walks of one run, so failure events and
/// detail ordering are numbered across the whole enumeration.
#[derive(Debug, Default)]
struct WalkCounters {
    walked_i: u64,
    walk_seq: u64,
}

impl<'a> FileEnumerator<'a> {
    pub fn new(
        source: &'a dyn SourceApi,
        ledger: &'a Ledger,
        retrier: &'a Retrier,
        need_amount: impl Into<String>,
    ) -> Self {
        Self {
            source,
            ledger,
            retrier,
            need_amount: need_amount.into(),
        }
    }

    /// Walk the files of every album in the persisted album index, then
    /// rebuild the file index from disk.
    pub async fn run(&self) -> Result<Vec<FileRecord>, LedgerError> {
        let albums = self.ledger.albums().await?;
        let mut counters = WalkCounters::default();
        let mut incomplete = 0usize;

        for (i, album) in albums.iter().enumerate() {
            tracing::info!(
                "Walking files of album {}/{}: {}",
                i + 1,
                albums.len(),
                album.title
            );
            let stats = self.walk_album(album, &mut counters).await?;
            if !stats.completed {
                incomplete += 1;
            }
        }

        let files = self.ledger.project_file_index().await?;
        tracing::info!(
            albums = albums.len(),
            incomplete_albums = incomplete,
            "Enumerated {} files",
            files.len()
        );
        Ok(files)
    }

    /// One album's walk. Its cursor starts fresh and a failure here leaves
    /// other albums untouched.
    async fn walk_album(
        &self,
        album: &AlbumEntry,
        counters: &mut WalkCounters,
    ) -> Result<WalkStats, LedgerError> {
        let mut stats = WalkStats::default();
        let mut cursor: Option<String> = None;

        loop {
            counters.walked_i += 1;
            let form = FileListForm::new(&album.id, cursor.as_deref(), &self.need_amount);
            tracing::debug!("Walking file list page {}", counters.walked_i);

            let page = match self.retrier.attempt(|| self.source.list_files(&form)).await {
                Ok(page) => page,
                Err(exhausted) => {
                    tracing::error!(
                        "File list page {} of album {} failed, skipping rest of album: {}",
                        counters.walked_i,
                        album.id,
                        exhausted
                    );
                    let formdata = serde_json::to_value(&form).unwrap_or_default();
                    self.ledger
                        .record_failure(
                            FailureEvent::new(FailureKind::FileList, counters.walked_i)
                                .with_url(self.source.file_list_url())
                                .with_formdata(formdata)
                                .with_error(&exhausted.last_error),
                        )
                        .await?;
                    return Ok(stats);
                }
            };

            stats.pages += 1;
            for file in &page.list {
                counters.walk_seq += 1;
                stats.items += 1;
                self.ledger.save_file_detail(counters.walk_seq, file).await?;
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
