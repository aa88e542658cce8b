//! HTTP client side of the member RPC protocol.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;

use super::peer::RemoteMember;
use super::protocol::*;
use super::types::{LinkSide, PeerRef, RingView};
use crate::config::RingConfig;
use crate::error::{ErrorResponse, Result, RingError};
use crate::identity::space::Identifier;

/// Calls that fan out across the ring (lookups, rebuilds, probes) get this many
/// single-call deadlines.
const WALK_TIMEOUT_FACTOR: u32 = 10;

/// Builds `http://{addr}{prefix}/{name}{endpoint}/{tail...}`.
///
/// `prefix` and `endpoint` are route constants. `name` and every `tail`
/// segment are caller data and go in percent-encoded, byte for byte.
pub fn endpoint_url(
    addr: SocketAddr,
    prefix: &str,
    name: &str,
    endpoint: &str,
    tail: &[&str],
) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(&format!("http://{}/", addr))
        .map_err(|e| RingError::InvalidArgument(format!("bad address {}: {}", addr, e)))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| RingError::InvalidArgument(format!("bad address {}", addr)))?;
        path.pop_if_empty();
        path.push(prefix.trim_start_matches('/'));
        path.push(name);
        path.push(endpoint.trim_start_matches('/'));
        path.extend(tail);
    }
    Ok(url)
}

/// Sends the request built by `build`, retrying transport failures with
/// exponential backoff. HTTP error statuses are returned, not retried.
pub async fn send_with_retry<F>(peer: &str, build: F, attempts: usize) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let attempts = attempts.max(1);
    let mut delay_ms = 150u64;

    for attempt in 0..attempts {
        match build().send().await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt + 1 == attempts {
                    return Err(RingError::unreachable(peer, e));
                }
                tracing::warn!(
                    "Call to {} failed (attempt {}/{}): {}",
                    peer,
                    attempt + 1,
                    attempts,
                    e
                );
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1200);
            }
        }
    }

    Err(RingError::unreachable(peer, "retry attempts exhausted"))
}

/// Turns a non-2xx response into the `RingError` the server reported.
pub async fn error_from_response(resp: reqwest::Response) -> RingError {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) => RingError::from_response(body),
        Err(_) => RingError::Transport(format!("unexpected status {}", status)),
    }
}

pub async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }
    resp.json::<T>()
        .await
        .map_err(|e| RingError::Transport(format!("malformed response body: {}", e)))
}

pub async fn expect_success(resp: reqwest::Response) -> Result<()> {
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(error_from_response(resp).await)
    }
}

/// Handle to a member served by another process.
pub struct HttpPeer {
    peer: PeerRef,
    label: String,
    client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl HttpPeer {
    pub fn new(peer: PeerRef, client: reqwest::Client, config: &RingConfig) -> Self {
        Self {
            label: peer.to_string(),
            peer,
            client,
            timeout: config.rpc_timeout,
            attempts: config.rpc_attempts,
        }
    }

    /// Reads the view of member `name` at `addr` without knowing its descriptor.
    pub async fn fetch_view(
        client: &reqwest::Client,
        addr: SocketAddr,
        name: &str,
        config: &RingConfig,
    ) -> Result<RingView> {
        let url = endpoint_url(addr, RING_PREFIX, name, ENDPOINT_VIEW, &[])?;
        let label = format!("{}@{}", name, addr);
        let resp = send_with_retry(
            &label,
            || client.get(url.clone()).timeout(config.rpc_timeout),
            config.rpc_attempts,
        )
        .await?;
        decode(resp).await
    }

    fn url(&self, endpoint: &str) -> Result<reqwest::Url> {
        endpoint_url(self.peer.addr, RING_PREFIX, &self.peer.name, endpoint, &[])
    }

    async fn get<T: DeserializeOwned>(&self, url: reqwest::Url, timeout: Duration) -> Result<T> {
        let resp = send_with_retry(
            &self.label,
            || self.client.get(url.clone()).timeout(timeout),
            self.attempts,
        )
        .await?;
        decode(resp).await
    }

    async fn post<B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
        timeout: Duration,
        attempts: usize,
    ) -> Result<reqwest::Response> {
        let url = self.url(endpoint)?;
        send_with_retry(
            &self.label,
            || self.client.post(url.clone()).json(body).timeout(timeout),
            attempts,
        )
        .await
    }

    fn walk_timeout(&self) -> Duration {
        self.timeout * WALK_TIMEOUT_FACTOR
    }
}

#[async_trait]
impl RemoteMember for HttpPeer {
    fn peer(&self) -> &PeerRef {
        &self.peer
    }

    async fn view(&self) -> Result<RingView> {
        let view: RingView = self.get(self.url(ENDPOINT_VIEW)?, self.timeout).await?;
        if view.member.id != self.peer.id {
            return Err(RingError::unreachable(
                self.label.clone(),
                format!("name now bound to {}", view.member),
            ));
        }
        Ok(view)
    }

    async fn replace_link(
        &self,
        side: LinkSide,
        expected: Identifier,
        new: PeerRef,
    ) -> Result<()> {
        let endpoint = match side {
            LinkSide::Successor => ENDPOINT_SUCCESSOR,
            LinkSide::Predecessor => ENDPOINT_PREDECESSOR,
        };
        let req = ReplaceLinkRequest {
            side,
            expected,
            new,
        };
        let resp = self.post(endpoint, &req, self.timeout, self.attempts).await?;
        expect_success(resp).await
    }

    async fn lookup_owner(&self, key: Identifier, hops: usize) -> Result<PeerRef> {
        let req = LookupRequest { key, hops };
        let resp = self
            .post(ENDPOINT_LOOKUP, &req, self.walk_timeout(), self.attempts)
            .await?;
        let body: LookupResponse = decode(resp).await?;
        Ok(body.owner)
    }

    async fn compute_fingers(&self, members: Vec<PeerRef>, epoch: u64) -> Result<()> {
        let req = FingersRequest { members, epoch };
        let resp = self
            .post(ENDPOINT_FINGERS, &req, self.timeout, self.attempts)
            .await?;
        expect_success(resp).await
    }

    async fn refresh_routing(&self) -> Result<()> {
        let resp = self
            .post(ENDPOINT_REFRESH, &(), self.walk_timeout(), 1)
            .await?;
        expect_success(resp).await
    }

    async fn handover(&self, from: Identifier, to: Identifier) -> Result<Vec<(Identifier, String)>> {
        // Not retried: a lost response would drop the extracted entries.
        let req = HandoverRequest { from, to };
        let resp = self.post(ENDPOINT_HANDOVER, &req, self.timeout, 1).await?;
        let body: EntriesPayload = decode(resp).await?;
        Ok(body.into_pairs())
    }

    async fn absorb(&self, entries: Vec<(Identifier, String)>, mode: MergeMode) -> Result<()> {
        let req = AbsorbRequest {
            mode,
            entries: EntriesPayload::from_pairs(entries).entries,
        };
        let resp = self
            .post(ENDPOINT_ABSORB, &req, self.timeout, self.attempts)
            .await?;
        expect_success(resp).await
    }

    async fn retract(&self, entries: Vec<(Identifier, String)>) -> Result<()> {
        let req = EntriesPayload::from_pairs(entries);
        let resp = self
            .post(ENDPOINT_RETRACT, &req, self.timeout, self.attempts)
            .await?;
        expect_success(resp).await
    }

    async fn fetch(&self, key: Identifier) -> Result<Option<String>> {
        let key = key.to_string();
        let url = endpoint_url(
            self.peer.addr,
            RING_PREFIX,
            &self.peer.name,
            ENDPOINT_FETCH,
            &[&key],
        )?;
        let body: FetchResponse = self.get(url, self.timeout).await?;
        Ok(body.value)
    }

    async fn store(&self, key: Identifier, value: String) -> Result<()> {
        let req = StoreRequest { key, value };
        let resp = self
            .post(ENDPOINT_STORE, &req, self.timeout, self.attempts)
            .await?;
        expect_success(resp).await
    }

    async fn remove(&self, key: Identifier) -> Result<()> {
        let req = RemoveRequest { key };
        let resp = self
            .post(ENDPOINT_REMOVE, &req, self.timeout, self.attempts)
            .await?;
        expect_success(resp).await
    }

    async fn values(&self) -> Result<Vec<String>> {
        let body: ValuesResponse = self.get(self.url(ENDPOINT_VALUES)?, self.timeout).await?;
        Ok(body.values)
    }

    async fn probe(&self, origin: Identifier, hops: usize) -> Result<usize> {
        let req = ProbeRequest { origin, hops };
        let resp = self
            .post(ENDPOINT_PROBE, &req, self.walk_timeout(), 1)
            .await?;
        let body: ProbeResponse = decode(resp).await?;
        Ok(body.hops)
    }

    async fn enumerate(&self) -> Result<Vec<PeerRef>> {
        let body: MembersResponse = self
            .get(self.url(ENDPOINT_MEMBERS)?, self.walk_timeout())
            .await?;
        Ok(body.members)
    }
}
