/// Parameters of a single announce request
#[derive(Debug, Clone)]
pub struct TrackerRequest {
    /// SHA1 hash of the info dictionary
    pub info_hash: [u8; 20],
    /// Our peer ID
    pub peer_id: [u8; 20],
    /// Port reported to the tracker
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    /// Number of bytes left to download
    pub left: u64,
}

impl TrackerRequest {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
        }
    }

    /// Query string with the binary fields percent-encoded byte for byte
    pub fn to_query(&self) -> String {
        [
            ("info_hash", percent_encode(&self.info_hash)),
            ("peer_id", percent_encode(&self.peer_id)),
            ("port", self.port.to_string()),
            ("uploaded", self.uploaded.to_string()),
            ("downloaded", self.downloaded.to_string()),
            ("left", self.left.to_string()),
            ("compact", "1".to_string()),
        ]
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
    }
}

fn percent_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
