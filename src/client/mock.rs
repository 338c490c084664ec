//! Loopback seeders that speak just enough of the wire protocol to serve a file.

use crate::peer::{Bitfield, Handshake, PeerMessage, HANDSHAKE_LEN};
use crate::piece::PieceStore;
use crate::storage::StorageManager;
use crate::torrent::{PieceHash, Pieces, TorrentInfo};
use crate::tracker::Peer;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::sleep;

pub fn content_of(length: usize) -> Vec<u8> {
    (0..length).map(|i| (i * 31 % 253) as u8).collect()
}

pub fn info_for(content: &[u8], piece_length: usize) -> TorrentInfo {
    let hashes: Vec<u8> = content
        .chunks(piece_length)
        .flat_map(|chunk| *PieceHash::of(chunk).as_bytes())
        .collect();
    TorrentInfo {
        name: "mock.bin".to_string(),
        piece_length: piece_length as u64,
        length: content.len() as u64,
        pieces: Pieces::from_bytes(&hashes).unwrap(),
    }
}

/// An info hash for `content` and an empty store writing into `temp`
pub async fn store_for(
    temp: &TempDir,
    content: &[u8],
    piece_length: usize,
) -> ([u8; 20], Arc<PieceStore>) {
    let info = info_for(content, piece_length);
    let storage = StorageManager::create(temp.path(), &info.name, info.length, info.piece_length)
        .await
        .unwrap();
    let info_hash = *PieceHash::of(content).as_bytes();
    (info_hash, Arc::new(PieceStore::new(&info, storage)))
}

struct Shared {
    content: Vec<u8>,
    piece_length: usize,
    info_hash: [u8; 20],
    corrupt: Option<(u32, watch::Sender<bool>)>,
    gate: Option<watch::Receiver<bool>>,
    silent_first: Option<Duration>,
    served: Mutex<Vec<(u32, u32)>>,
    connections: AtomicUsize,
}

/// Seeder that holds every piece and answers every request
pub struct MockSeeder {
    shared: Shared,
}

impl MockSeeder {
    pub fn new(content: &[u8], piece_length: usize, info_hash: [u8; 20]) -> Self {
        Self {
            shared: Shared {
                content: content.to_vec(),
                piece_length,
                info_hash,
                corrupt: None,
                gate: None,
                silent_first: None,
                served: Mutex::new(Vec::new()),
                connections: AtomicUsize::new(0),
            },
        }
    }

    /// Flip the first byte of `piece`, then signal `served` once it is on the wire
    pub fn corrupting(mut self, piece: u32, served: watch::Sender<bool>) -> Self {
        self.shared.corrupt = Some((piece, served));
        self
    }

    /// Stay choked until `gate` turns true
    pub fn gated(mut self, gate: watch::Receiver<bool>) -> Self {
        self.shared.gate = Some(gate);
        self
    }

    /// On the first connection, sit on the first request for `delay` and then hang up
    pub fn silent_first(mut self, delay: Duration) -> Self {
        self.shared.silent_first = Some(delay);
        self
    }

    pub async fn spawn(self) -> RunningSeeder {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(self.shared);

        let accepting = shared.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let connection = accepting.connections.fetch_add(1, Ordering::SeqCst);
                let shared = accepting.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, shared, connection).await;
                });
            }
        });

        RunningSeeder { addr, shared }
    }
}

pub struct RunningSeeder {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl RunningSeeder {
    pub fn peer(&self) -> Peer {
        Peer::from(self.addr)
    }

    /// `(piece, offset)` of every block sent, in order
    pub fn served(&self) -> Vec<(u32, u32)> {
        self.shared.served.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }
}

async fn serve(mut stream: TcpStream, shared: Arc<Shared>, connection: usize) -> io::Result<()> {
    let mut theirs = [0u8; HANDSHAKE_LEN];
    stream.read_exact(&mut theirs).await?;
    stream
        .write_all(&Handshake::new(shared.info_hash, [b'M'; 20]).to_bytes())
        .await?;

    let num_pieces = shared.content.len().div_ceil(shared.piece_length);
    let mut have = Bitfield::new(num_pieces);
    for index in 0..num_pieces {
        have.set(index);
    }
    stream
        .write_all(
            &PeerMessage::Bitfield {
                bitfield: have.as_bytes().to_vec(),
            }
            .to_bytes(),
        )
        .await?;

    if let Some(gate) = &shared.gate {
        let mut gate = gate.clone();
        if gate.wait_for(|open| *open).await.is_err() {
            return Ok(());
        }
    }
    stream.write_all(&PeerMessage::Unchoke.to_bytes()).await?;

    loop {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await?;
        let mut frame = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut frame).await?;

        let Ok(PeerMessage::Request { block }) = PeerMessage::from_frame(&frame) else {
            continue;
        };

        if let (0, Some(delay)) = (connection, shared.silent_first) {
            sleep(delay).await;
            return Ok(());
        }

        let start = block.piece_index as usize * shared.piece_length + block.offset as usize;
        let mut data = shared.content[start..start + block.length as usize].to_vec();
        let corrupted = match &shared.corrupt {
            Some((piece, _)) if *piece == block.piece_index && block.offset == 0 => {
                data[0] ^= 0xFF;
                true
            }
            _ => false,
        };

        shared
            .served
            .lock()
            .unwrap()
            .push((block.piece_index, block.offset));
        stream
            .write_all(
                &PeerMessage::Piece {
                    piece_index: block.piece_index,
                    offset: block.offset,
                    data,
                }
                .to_bytes(),
            )
            .await?;

        if corrupted {
            if let Some((_, served)) = &shared.corrupt {
                served.send_replace(true);
            }
        }
    }
}
