mod coordinator;
#[cfg(test)]
mod mock;

pub use coordinator::{Coordinator, CoordinatorConfig, RoundOutcome};

use crate::error::{Result, SwarmError};
use crate::peer::SessionConfig;
use crate::piece::PieceStore;
use crate::storage::StorageManager;
use crate::torrent::Metainfo;
use crate::tracker::{generate_peer_id, TrackerClient, TrackerRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for the download client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub output_dir: PathBuf,
    /// Port announced to the tracker; nothing listens on it
    pub port: u16,
    /// Share of pieces to download, 1..=100
    pub percent: u8,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Session runs per peer in one round
    pub max_attempts: usize,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
    pub stall_timeout: Duration,
    /// Tracker announces before giving up
    pub max_rounds: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./downloads"),
            port: 6881,
            percent: 100,
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            stall_timeout: Duration::from_secs(30),
            max_rounds: 10,
        }
    }
}

impl ClientConfig {
    /// Pieces needed to cover `percent` of `total`, rounded up and never zero for a non-empty file
    pub fn target_pieces(&self, total: usize) -> usize {
        let percent = self.percent.clamp(1, 100) as usize;
        (total * percent).div_ceil(100).min(total)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            session: self.session_config(),
            max_attempts: self.max_attempts.max(1),
            retry_delay: self.retry_delay,
            poll_interval: self.poll_interval,
            stall_timeout: self.stall_timeout,
        }
    }
}

/// Summary of a finished download
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub saved_pieces: usize,
    pub target_pieces: usize,
    pub total_pieces: usize,
    pub rounds: usize,
}

/// Main client: announces, runs download rounds, and re-validates the result
pub struct TorrentClient {
    config: ClientConfig,
    peer_id: [u8; 20],
}

impl TorrentClient {
    pub fn new(config: ClientConfig) -> Self {
        let peer_id = generate_peer_id();
        info!(
            "Client initialized with peer_id: {}",
            String::from_utf8_lossy(&peer_id)
        );

        Self { config, peer_id }
    }

    /// Download the torrent at `torrent_path` into the configured output directory
    pub async fn download(&self, torrent_path: &Path) -> Result<DownloadReport> {
        info!("Starting download for: {}", torrent_path.display());
        let metainfo = crate::torrent::load_torrent_file(torrent_path).await?;
        self.download_metainfo(&metainfo).await
    }

    pub async fn download_metainfo(&self, metainfo: &Metainfo) -> Result<DownloadReport> {
        let info = &metainfo.info;
        info!("Torrent: {}", info.name);
        info!("Total size: {} bytes", info.length);
        info!("Pieces: {} of {} bytes", info.piece_count(), info.piece_length);
        info!("Info hash: {}", metainfo.info_hash_hex());

        let storage = StorageManager::create(
            &self.config.output_dir,
            &info.name,
            info.length,
            info.piece_length,
        )
        .await?;
        let path = storage.path().to_path_buf();
        let store = Arc::new(PieceStore::new(info, storage));

        let total = store.total_pieces();
        let target = self.config.target_pieces(total);
        info!("Target: {} of {} pieces ({}%)", target, total, self.config.percent);

        let tracker = TrackerClient::new()?;
        let coordinator = Coordinator::new(
            metainfo.info_hash,
            self.peer_id,
            store.clone(),
            self.config.coordinator_config(),
        );

        let mut rounds = 0;
        while store.saved_count().await < target && rounds < self.config.max_rounds {
            rounds += 1;

            let request = TrackerRequest::new(
                metainfo.info_hash,
                self.peer_id,
                self.config.port,
                store.remaining_bytes().await,
            );
            let peers = match tracker.announce(&metainfo.announce, &request).await {
                Ok(response) => {
                    debug!(
                        "Tracker interval {}s, {:?} seeders, {:?} leechers",
                        response.interval, response.complete, response.incomplete
                    );
                    response.peers
                }
                Err(e) => {
                    warn!("Round {}: announce failed: {}", rounds, e);
                    sleep(self.config.retry_delay).await;
                    continue;
                }
            };
            if peers.is_empty() {
                warn!("Round {}: tracker returned no peers", rounds);
                sleep(self.config.retry_delay).await;
                continue;
            }

            info!("Round {}: {} peers from tracker", rounds, peers.len());
            if coordinator.run_round(&peers, target).await == RoundOutcome::Stalled {
                warn!("Round {} stalled, asking the tracker for fresh peers", rounds);
            }
        }

        store.close().await?;

        let saved = store.saved_count().await;
        if saved < target {
            return Err(SwarmError::NoProgress(format!(
                "{} of {} target pieces after {} rounds",
                saved, target, rounds
            )));
        }

        let failed = store.verify_saved().await?;
        if !failed.is_empty() {
            error!("{} saved pieces failed re-validation", failed.len());
            return Err(SwarmError::VerificationFailure(failed));
        }

        info!(
            "Download finished: {} of {} pieces saved to {}",
            saved,
            total,
            path.display()
        );

        Ok(DownloadReport {
            path,
            saved_pieces: saved,
            target_pieces: target,
            total_pieces: total,
            rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{content_of, info_for};
    use tempfile::TempDir;

    #[test]
    fn test_target_pieces() {
        let mut config = ClientConfig::default();
        assert_eq!(config.target_pieces(7), 7);

        config.percent = 50;
        assert_eq!(config.target_pieces(7), 4);
        assert_eq!(config.target_pieces(0), 0);

        config.percent = 1;
        assert_eq!(config.target_pieces(3), 1);

        // out-of-range percentages are clamped
        config.percent = 0;
        assert_eq!(config.target_pieces(10), 1);
        config.percent = 250;
        assert_eq!(config.target_pieces(10), 10);
    }

    #[tokio::test]
    async fn test_unreachable_tracker_is_no_progress() {
        let temp = TempDir::new().unwrap();
        let content = content_of(40);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let metainfo = Metainfo {
            announce: format!("http://{}/announce", addr),
            comment: None,
            info: info_for(&content, 16),
            info_hash: [7u8; 20],
        };
        let client = TorrentClient::new(ClientConfig {
            output_dir: temp.path().to_path_buf(),
            retry_delay: Duration::from_millis(10),
            max_rounds: 2,
            ..ClientConfig::default()
        });

        assert!(matches!(
            client.download_metainfo(&metainfo).await,
            Err(SwarmError::NoProgress(_))
        ));
        // the output file exists at full size even though nothing was saved
        let metadata = tokio::fs::metadata(temp.path().join("mock.bin")).await.unwrap();
        assert_eq!(metadata.len(), 40);
    }
}
