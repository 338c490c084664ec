use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Size of one peer entry in the compact tracker format
pub const COMPACT_PEER_LEN: usize = 6;

/// A remote endpoint handed out by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub addr: SocketAddr,
}

impl Peer {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::new(ip, port),
        }
    }

    /// 4 bytes IPv4 address followed by 2 bytes port, both big-endian
    pub fn from_compact(data: &[u8]) -> Option<Self> {
        if data.len() != COMPACT_PEER_LEN {
            return None;
        }

        let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
        let port = u16::from_be_bytes([data[4], data[5]]);

        Some(Self::new(IpAddr::V4(ip), port))
    }

    /// Decode a run of compact entries; a trailing partial entry is ignored
    pub fn from_compact_list(data: &[u8]) -> Vec<Self> {
        data.chunks_exact(COMPACT_PEER_LEN)
            .filter_map(Self::from_compact)
            .collect()
    }
}

impl From<SocketAddr> for Peer {
    fn from(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}
