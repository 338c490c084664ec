use crate::peer::{PeerSession, SessionConfig, SessionExit};
use crate::piece::PieceStore;
use crate::tracker::Peer;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// How a download round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    TargetReached,
    /// Every worker gave up, or nothing moved for the stall window; a fresh peer list is needed
    Stalled,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub session: SessionConfig,
    /// Session runs per peer before it is abandoned for the round
    pub max_attempts: usize,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
    pub stall_timeout: Duration,
}

/// Runs one session per peer against a shared store and watches aggregate progress
pub struct Coordinator {
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    store: Arc<PieceStore>,
    config: CoordinatorConfig,
    active: Arc<AtomicUsize>,
}

impl Coordinator {
    pub fn new(
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        store: Arc<PieceStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            info_hash,
            peer_id,
            store,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Workers still running in the current round
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Download from `peers` until `target` pieces are saved or progress stops.
    ///
    /// Every worker has been cancelled and joined by the time this returns.
    pub async fn run_round(&self, peers: &[Peer], target: usize) -> RoundOutcome {
        let cancel = Arc::new(AtomicBool::new(false));
        info!("Starting round with {} peers, target {} pieces", peers.len(), target);

        let handles: Vec<JoinHandle<()>> = peers
            .iter()
            .map(|&peer| {
                let session = PeerSession::new(
                    peer,
                    self.info_hash,
                    self.peer_id,
                    self.config.session,
                    self.store.clone(),
                    cancel.clone(),
                );
                // counted before the task starts so the poll loop never sees a false zero
                let slot = ActiveSlot::claim(&self.active);
                tokio::spawn(run_worker(
                    session,
                    self.config.max_attempts,
                    self.config.retry_delay,
                    slot,
                    cancel.clone(),
                ))
            })
            .collect();

        let outcome = self.watch(target).await;

        cancel.store(true, Ordering::Release);
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Peer worker panicked: {}", e);
            }
        }

        info!(
            "Round finished: {:?} ({}/{} pieces saved)",
            outcome,
            self.store.saved_count().await,
            self.store.total_pieces()
        );
        outcome
    }

    async fn watch(&self, target: usize) -> RoundOutcome {
        let mut last_saved = self.store.saved_count().await;
        let mut last_progress = Instant::now();

        loop {
            let saved = self.store.saved_count().await;
            if saved >= target {
                return RoundOutcome::TargetReached;
            }
            if self.active_sessions() == 0 {
                warn!("All peer sessions ended with {}/{} pieces", saved, target);
                return RoundOutcome::Stalled;
            }

            // a piece held by a session counts as progress until it is handed back
            let in_flight = self.store.in_progress_count().await;
            if saved > last_saved || in_flight > 0 {
                last_saved = saved;
                last_progress = Instant::now();
            } else if last_progress.elapsed() >= self.config.stall_timeout {
                warn!(
                    "No piece in flight and none saved for {:?}",
                    self.config.stall_timeout
                );
                return RoundOutcome::Stalled;
            }

            debug!(
                "Progress: {}/{} saved, {} queued, {} sessions",
                saved,
                target,
                self.store.queue_depth().await,
                self.active_sessions()
            );
            sleep(self.config.poll_interval).await;
        }
    }
}

/// One unit of the active-session count, released when dropped so a panicking worker still frees it
struct ActiveSlot(Arc<AtomicUsize>);

impl ActiveSlot {
    fn claim(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self(active.clone())
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Drive one peer's session, restarting it after peer failures until the attempt budget runs out
async fn run_worker(
    mut session: PeerSession,
    max_attempts: usize,
    retry_delay: Duration,
    _slot: ActiveSlot,
    cancel: Arc<AtomicBool>,
) {
    let peer = session.peer();

    for attempt in 1..=max_attempts {
        match session.run().await {
            Ok(SessionExit::Cancelled) => break,
            Ok(SessionExit::StoreComplete) => {
                debug!("Store complete, worker for {} done", peer);
                break;
            }
            Err(e) if !e.is_peer_failure() => {
                error!("Abandoning {}: {}", peer, e);
                break;
            }
            Err(e) if attempt < max_attempts && !cancel.load(Ordering::Acquire) => {
                warn!(
                    "Session with {} failed (attempt {}/{}), retrying in {:?}: {}",
                    peer, attempt, max_attempts, retry_delay, e
                );
                sleep(retry_delay).await;
            }
            Err(e) => {
                warn!("Giving up on {} after {} attempts: {}", peer, attempt, e);
                break;
            }
        }
    }
}
