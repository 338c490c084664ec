use super::{BlockInfo, Bitfield, Handshake, PeerMessage, Transport, HANDSHAKE_LEN};
use crate::error::{Result, SwarmError};
use crate::piece::{BlockStatus, Completion, Piece, PieceStore};
use crate::tracker::Peer;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Handshaking,
    AwaitingBitfield,
    Choked,
    Unchoked,
    Terminated,
}

/// Why a session stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Cancelled,
    /// Every piece of the file is saved
    StoreComplete,
}

/// Download state machine for one remote peer.
///
/// At most one block request is outstanding at a time. Availability, the
/// assigned piece and the outstanding request are owned by the session alone;
/// the only shared state it touches is the [`PieceStore`].
pub struct PeerSession {
    peer: Peer,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    config: SessionConfig,
    store: Arc<PieceStore>,
    cancel: Arc<AtomicBool>,
    state: SessionState,
    availability: Bitfield,
    current: Option<Piece>,
    pending: Option<BlockInfo>,
    /// Pieces this peer delivered with a bad digest; never taken from it again
    rejected: HashSet<usize>,
}

impl PeerSession {
    pub fn new(
        peer: Peer,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        config: SessionConfig,
        store: Arc<PieceStore>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let num_pieces = store.total_pieces();
        Self {
            peer,
            info_hash,
            peer_id,
            config,
            store,
            cancel,
            state: SessionState::Connecting,
            availability: Bitfield::new(num_pieces),
            current: None,
            pending: None,
            rejected: HashSet::new(),
        }
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Connect and download until cancelled, the store is complete, or the peer fails.
    ///
    /// Always ends in `Terminated`, with any piece still held handed back to the store.
    pub async fn run(&mut self) -> Result<SessionExit> {
        self.state = SessionState::Connecting;
        self.availability = Bitfield::new(self.availability.len());

        let result = self.drive().await;

        self.state = SessionState::Terminated;
        self.pending = None;
        self.give_back_piece().await;

        match &result {
            Ok(exit) => debug!("Session with {} ended: {:?}", self.peer, exit),
            Err(e) => debug!("Session with {} aborted: {}", self.peer, e),
        }
        result
    }

    async fn drive(&mut self) -> Result<SessionExit> {
        if self.cancelled() {
            return Ok(SessionExit::Cancelled);
        }

        let mut transport = Transport::connect(
            self.peer.addr,
            self.config.connect_timeout,
            self.config.read_timeout,
        )
        .await?;

        self.handshake(&mut transport).await?;
        if let Some(exit) = self.await_bitfield(&mut transport).await? {
            return Ok(exit);
        }
        transport.send(&PeerMessage::Interested.to_bytes()).await?;
        info!(
            "Connected to {} ({} of {} pieces available)",
            self.peer,
            self.availability.count(),
            self.availability.len()
        );

        self.steady_state(&mut transport).await
    }

    async fn handshake<S>(&mut self, transport: &mut Transport<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.state = SessionState::Handshaking;
        transport
            .send(&Handshake::new(self.info_hash, self.peer_id).to_bytes())
            .await?;

        let reply = Handshake::from_bytes(&transport.receive_exact(HANDSHAKE_LEN).await?)?;
        if reply.info_hash != self.info_hash {
            return Err(SwarmError::HandshakeFailed(format!(
                "{} answered for info hash {}",
                self.peer,
                hex::encode(reply.info_hash)
            )));
        }

        debug!("Handshake with {} ok, peer id {}", self.peer, hex::encode(reply.peer_id));
        Ok(())
    }

    /// The first real message must be a bitfield or an unchoke
    async fn await_bitfield<S>(&mut self, transport: &mut Transport<S>) -> Result<Option<SessionExit>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.state = SessionState::AwaitingBitfield;
        loop {
            if self.cancelled() {
                return Ok(Some(SessionExit::Cancelled));
            }

            match PeerMessage::from_frame(&transport.receive_framed().await?)? {
                PeerMessage::KeepAlive => continue,
                PeerMessage::Bitfield { bitfield } => {
                    self.availability = Bitfield::from_bytes(&bitfield, self.availability.len());
                    self.state = SessionState::Choked;
                    return Ok(None);
                }
                PeerMessage::Unchoke => {
                    self.state = SessionState::Unchoked;
                    return Ok(None);
                }
                other => {
                    return Err(SwarmError::ProtocolError(format!(
                        "expected bitfield or unchoke, got {}",
                        message_name(&other)
                    )))
                }
            }
        }
    }

    async fn steady_state<S>(&mut self, transport: &mut Transport<S>) -> Result<SessionExit>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            if self.cancelled() {
                return Ok(SessionExit::Cancelled);
            }
            if self.store.is_complete().await {
                return Ok(SessionExit::StoreComplete);
            }

            if self.state == SessionState::Unchoked && self.pending.is_none() {
                self.request_next(transport).await?;
            }

            let frame = match transport.receive_framed().await {
                Ok(frame) => frame,
                // nothing assigned and nothing asked for: a quiet peer is fine
                Err(SwarmError::Timeout(_)) if self.is_idle() => continue,
                Err(e) => return Err(e),
            };
            self.dispatch(PeerMessage::from_frame(&frame)?).await?;
        }
    }

    fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_none()
    }

    async fn dispatch(&mut self, message: PeerMessage) -> Result<()> {
        match message {
            PeerMessage::KeepAlive => {}
            PeerMessage::Have { piece_index } => {
                if !self.availability.set(piece_index as usize) {
                    return Err(SwarmError::ProtocolError(format!(
                        "have for piece {} out of range",
                        piece_index
                    )));
                }
            }
            PeerMessage::Bitfield { bitfield } => {
                self.availability = Bitfield::from_bytes(&bitfield, self.availability.len());
            }
            PeerMessage::Choke => {
                debug!("Choked by {}", self.peer);
                self.state = SessionState::Choked;
                // a choking peer discards outstanding requests, and the piece
                // may be fetched elsewhere while this one waits for an unchoke
                self.pending = None;
                self.give_back_piece().await;
            }
            PeerMessage::Unchoke => {
                debug!("Unchoked by {}", self.peer);
                self.state = SessionState::Unchoked;
            }
            PeerMessage::Piece {
                piece_index,
                offset,
                data,
            } => self.receive_block(piece_index, offset, data).await?,
            PeerMessage::Interested
            | PeerMessage::NotInterested
            | PeerMessage::Request { .. }
            | PeerMessage::Cancel { .. } => {
                debug!("Ignoring {} from {}", message_name(&message), self.peer);
            }
        }
        Ok(())
    }

    /// Reset the assigned piece, if any, and put it back on the queue
    async fn give_back_piece(&mut self) {
        if let Some(mut piece) = self.current.take() {
            piece.reset();
            self.store.return_piece(piece).await;
        }
    }

    fn release_pending(&mut self) {
        if let (Some(block), Some(piece)) = (self.pending.take(), self.current.as_mut()) {
            piece.release_block(block.offset as usize);
        }
    }

    async fn receive_block(&mut self, piece_index: u32, offset: u32, data: Vec<u8>) -> Result<()> {
        if piece_index as usize >= self.availability.len() {
            return Err(SwarmError::ProtocolError(format!(
                "block for piece {} out of range",
                piece_index
            )));
        }

        let matches = self
            .pending
            .map_or(false, |b| b.piece_index == piece_index && b.offset == offset);
        if !matches {
            debug!(
                "Unsolicited block {}:{} from {}",
                piece_index, offset, self.peer
            );
            // the outstanding flag is cleared either way so the session keeps moving
            self.release_pending();
            return Ok(());
        }
        self.pending = None;

        let piece = self.current.as_mut().ok_or_else(|| {
            SwarmError::ProtocolError("block arrived with no piece assigned".to_string())
        })?;
        piece.save_block(offset as usize, data)?;
        if !piece.all_blocks_retrieved() {
            return Ok(());
        }

        if let Some(piece) = self.current.take() {
            let index = piece.index();
            match self.store.complete(piece).await? {
                Completion::Saved => debug!("Piece {} from {} saved", index, self.peer),
                Completion::Rejected => {
                    warn!("Piece {} from {} failed verification", index, self.peer);
                    self.rejected.insert(index);
                }
            }
        }
        Ok(())
    }

    /// Ask for the next missing block, taking a new piece this peer holds if needed
    async fn request_next<S>(&mut self, transport: &mut Transport<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.current.is_none() {
            let availability = &self.availability;
            let rejected = &self.rejected;
            let next = self
                .store
                .take_next_where(|index| availability.has(index) && !rejected.contains(&index))
                .await;
            if let Some(piece) = &next {
                debug!("Assigned piece {} to {}", piece.index(), self.peer);
            }
            self.current = next;
        }

        let Some(piece) = self.current.as_mut() else {
            return Ok(());
        };
        let Some(block) = piece.first_missing_block() else {
            return Ok(());
        };

        block.status = BlockStatus::Pending;
        let request = BlockInfo::new(
            block.piece_index as u32,
            block.offset as u32,
            block.length as u32,
        );
        self.pending = Some(request);

        transport
            .send(&PeerMessage::Request { block: request }.to_bytes())
            .await
    }
}

fn message_name(message: &PeerMessage) -> &'static str {
    match message {
        PeerMessage::KeepAlive => "keep-alive",
        PeerMessage::Choke => "choke",
        PeerMessage::Unchoke => "unchoke",
        PeerMessage::Interested => "interested",
        PeerMessage::NotInterested => "not-interested",
        PeerMessage::Have { .. } => "have",
        PeerMessage::Bitfield { .. } => "bitfield",
        PeerMessage::Request { .. } => "request",
        PeerMessage::Piece { .. } => "piece",
        PeerMessage::Cancel { .. } => "cancel",
    }
}
