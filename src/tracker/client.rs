use super::{TrackerRequest, TrackerResponse};
use crate::bencode::decode;
use crate::error::{Result, SwarmError};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for HTTP trackers
pub struct TrackerClient {
    client: Client,
}

impl TrackerClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(TRACKER_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Announce once and return the decoded peer list
    pub async fn announce(
        &self,
        tracker_url: &str,
        request: &TrackerRequest,
    ) -> Result<TrackerResponse> {
        info!("Announcing to tracker: {}", tracker_url);

        let url = announce_url(tracker_url, request)?;
        debug!("Tracker request URL: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!(
            "Tracker response status: {}, body length: {}",
            status,
            body.len()
        );

        if !status.is_success() {
            return Err(SwarmError::TrackerError(format!("HTTP error: {}", status)));
        }

        let tracker_response = TrackerResponse::from_bencode(&decode(&body)?)?;

        info!(
            "Received {} peers from tracker (interval: {}s)",
            tracker_response.peers.len(),
            tracker_response.interval
        );

        Ok(tracker_response)
    }
}

/// Appends the announce query, keeping any query the tracker URL already has
fn announce_url(tracker_url: &str, request: &TrackerRequest) -> Result<Url> {
    let mut url = Url::parse(tracker_url)?;
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, request.to_query()),
        _ => request.to_query(),
    };
    url.set_query(Some(&query));
    Ok(url)
}
