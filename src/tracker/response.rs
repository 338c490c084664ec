use super::Peer;
use crate::bencode::Bencode;
use crate::error::{Result, SwarmError};
use std::net::IpAddr;

fn tracker_error(msg: impl Into<String>) -> SwarmError {
    SwarmError::TrackerError(msg.into())
}

/// Decoded announce response
#[derive(Debug, Clone)]
pub struct TrackerResponse {
    /// Seconds the tracker asks us to wait between announces
    pub interval: u64,
    /// Number of seeders, when reported
    pub complete: Option<u64>,
    /// Number of leechers, when reported
    pub incomplete: Option<u64>,
    pub peers: Vec<Peer>,
}

impl TrackerResponse {
    pub fn from_bencode(value: &Bencode) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(tracker_error("response must be a dictionary"));
        }

        if let Some(failure) = value.get(b"failure reason") {
            let reason = failure.as_str().unwrap_or("unknown failure");
            return Err(tracker_error(reason));
        }

        let interval = value
            .get_int(b"interval")
            .ok_or_else(|| tracker_error("missing 'interval' field"))?
            .max(0) as u64;

        let complete = value.get_int(b"complete").map(|i| i.max(0) as u64);
        let incomplete = value.get_int(b"incomplete").map(|i| i.max(0) as u64);

        let peers = match value.get(b"peers") {
            Some(Bencode::Bytes(compact)) => Peer::from_compact_list(compact),
            Some(Bencode::List(list)) => parse_peer_list(list)?,
            Some(_) => return Err(tracker_error("invalid 'peers' format")),
            None => return Err(tracker_error("missing 'peers' field")),
        };

        Ok(TrackerResponse {
            interval,
            complete,
            incomplete,
            peers,
        })
    }
}

/// Non-compact form: a list of {ip, port} dictionaries
fn parse_peer_list(list: &[Bencode]) -> Result<Vec<Peer>> {
    list.iter()
        .map(|entry| {
            let ip: IpAddr = entry
                .get_str(b"ip")
                .ok_or_else(|| tracker_error("missing peer 'ip'"))?
                .parse()
                .map_err(|_| tracker_error("invalid peer IP address"))?;

            let port = entry
                .get_int(b"port")
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| tracker_error("missing or invalid peer 'port'"))?;

            Ok(Peer::new(ip, port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    #[test]
    fn test_compact_response() {
        let mut body = b"d8:intervali900e5:peers12:".to_vec();
        body.extend_from_slice(&[192, 168, 1, 2, 0x1A, 0xE1, 10, 0, 0, 1, 0x1A, 0xE2]);
        body.push(b'e');

        let response = TrackerResponse::from_bencode(&decode(&body).unwrap()).unwrap();
        assert_eq!(response.interval, 900);
        assert_eq!(response.peers.len(), 2);
        assert_eq!(response.peers[0].addr, "192.168.1.2:6881".parse().unwrap());
        assert_eq!(response.peers[1].addr, "10.0.0.1:6882".parse().unwrap());
    }

    #[test]
    fn test_dictionary_peer_list() {
        let body = b"d8:intervali60e5:peersld2:ip9:127.0.0.14:porti6881eeee";
        let response = TrackerResponse::from_bencode(&decode(body).unwrap()).unwrap();
        let expected: std::net::SocketAddr = "127.0.0.1:6881".parse().unwrap();
        assert_eq!(response.peers, vec![Peer::from(expected)]);
    }

    #[test]
    fn test_failure_reason() {
        let body = b"d14:failure reason12:unregisterede";
        match TrackerResponse::from_bencode(&decode(body).unwrap()) {
            Err(SwarmError::TrackerError(reason)) => assert_eq!(reason, "unregistered"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
