use std::collections::HashMap;

use crate::destination::DestinationApi;
use crate::ledger::{AlbumEntry, FailureEvent, FailureKind, Ledger};
use crate::retry::Retrier;

use super::classify_destination;

/// Album title to destination album id.
pub type AlbumIndex = HashMap<String, String>;

/// Makes sure every source album title has a destination album.
///
/// Matching is by exact title only, so two source albums sharing a title
/// share one destination album.
pub struct AlbumProvisioner<'a> {
    destination: &'a dyn DestinationApi,
    ledger: &'a Ledger,
    retrier: &'a Retrier,
}

impl<'a> AlbumProvisioner<'a> {
    pub fn new(destination: &'a dyn DestinationApi, ledger: &'a Ledger, retrier: &'a Retrier) -> Self {
        Self {
            destination,
            ledger,
            retrier,
        }
    }

    /// Index existing destination albums, then create the missing ones.
    ///
    /// Failing to list destination albums is fatal: without the listing,
    /// every album would be created again. A failed creation is recorded
    /// and leaves that title out of the returned index.
    pub async fn provision(&self, albums: &[AlbumEntry]) -> anyhow::Result<AlbumIndex> {
        let existing = self
            .retrier
            .attempt_with(classify_destination, || self.destination.list_albums())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list destination albums: {}", e))?;

        let mut index = AlbumIndex::new();
        for album in existing {
            // First one wins when the destination already has duplicate titles.
            index.entry(album.album_name).or_insert(album.id);
        }
        tracing::info!("Destination has {} albums", index.len());

        let mut created = 0usize;
        for (i, album) in albums.iter().enumerate() {
            if index.contains_key(&album.title) {
                continue;
            }
            tracing::info!("Creating destination album {}", album.title);
            match self
                .retrier
                .attempt_with(classify_destination, || {
                    self.destination.create_album(&album.title)
                })
                .await
            {
                Ok(remote) => {
                    index.insert(album.title.clone(), remote.id);
                    created += 1;
                }
                Err(exhausted) => {
                    tracing::error!("Could not create album {}: {}", album.title, exhausted);
                    self.ledger
                        .record_failure(
                            FailureEvent::new(FailureKind::CreateAlbum, i as u64 + 1)
                                .with_id(&album.id)
                                .with_error(&exhausted.last_error),
                        )
                        .await?;
                }
            }
        }

        tracing::info!(created, "Provisioned {} destination albums", index.len());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::test_support::FakeDestination;

    fn retrier() -> Retrier {
        Retrier::new(RetryConfig {
            max_attempts: 2,
            delay_secs: 0,
        })
    }

    fn entries(albums: &[(&str, &str)]) -> Vec<AlbumEntry> {
        albums
            .iter()
            .map(|(id, title)| AlbumEntry {
                id: id.to_string(),
                title: title.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_creates_only_missing_titles() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).await.unwrap();
        let destination = FakeDestination::with_albums(&[("d1", "Alpha")]);
        let retrier = retrier();

        let index = AlbumProvisioner::new(&destination, &ledger, &retrier)
            .provision(&entries(&[("A", "Alpha"), ("B", "Beta"), ("C", "Beta")]))
            .await
            .unwrap();

        assert_eq!(destination.created(), vec!["Beta".to_string()]);
        assert_eq!(index["Alpha"], "d1");
        assert_eq!(index["Beta"], "dest-album-2");
        assert!(ledger.failures().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_matching_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).await.unwrap();
        let destination = FakeDestination::with_albums(&[("d1", "alpha ")]);
        let retrier = retrier();

        let index = AlbumProvisioner::new(&destination, &ledger, &retrier)
            .provision(&entries(&[("A", "Alpha")]))
            .await
            .unwrap();

        assert_eq!(destination.created(), vec!["Alpha".to_string()]);
        assert_ne!(index["Alpha"], "d1");
    }

    #[tokio::test]
    async fn test_failed_create_is_recorded_and_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).await.unwrap();
        let destination = FakeDestination::default();
        destination.fail_creates(2);
        let retrier = retrier();

        let index = AlbumProvisioner::new(&destination, &ledger, &retrier)
            .provision(&entries(&[("A", "Alpha"), ("B", "Beta")]))
            .await
            .unwrap();

        assert!(!index.contains_key("Alpha"));
        assert!(index.contains_key("Beta"));
        let failures = ledger.failures().await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::CreateAlbum);
        assert_eq!(failures[0].walked_i, 1);
        assert_eq!(failures[0].id.as_deref(), Some("A"));
    }
}
