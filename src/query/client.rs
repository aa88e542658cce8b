//! HTTP implementation of [`RingQuery`] for clients outside the ring.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;

use super::contract::RingQuery;
use super::protocol::*;
use crate::config::RingConfig;
use crate::error::Result;
use crate::ring::http_peer::{decode, endpoint_url, expect_success, send_with_retry};
use crate::ring::types::PeerRef;

/// Talks to the member registered as `name` on the server at `addr`.
///
/// Any member answers for the whole ring, so one client is enough to reach
/// every key.
#[derive(Clone)]
pub struct QueryClient {
    addr: SocketAddr,
    name: String,
    label: String,
    client: reqwest::Client,
    config: RingConfig,
}

impl QueryClient {
    pub fn new(addr: SocketAddr, name: &str, config: RingConfig) -> Self {
        Self {
            addr,
            name: name.to_string(),
            label: format!("{}@{}", name, addr),
            client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    fn url(&self, endpoint: &str) -> Result<reqwest::Url> {
        endpoint_url(self.addr, KV_PREFIX, &self.name, endpoint, &[])
    }

    /// Ring-wide operations may visit every member before answering.
    fn ring_timeout(&self) -> std::time::Duration {
        self.config.rpc_timeout * 10
    }

    async fn get_json<T: DeserializeOwned>(&self, url: reqwest::Url) -> Result<T> {
        let timeout = self.ring_timeout();
        let resp = send_with_retry(
            &self.label,
            || self.client.get(url.clone()).timeout(timeout),
            self.config.rpc_attempts,
        )
        .await?;
        decode(resp).await
    }

    async fn post_json<B: serde::Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
        attempts: usize,
    ) -> Result<reqwest::Response> {
        let url = self.url(endpoint)?;
        let timeout = self.ring_timeout();
        send_with_retry(
            &self.label,
            || self.client.post(url.clone()).json(body).timeout(timeout),
            attempts,
        )
        .await
    }
}

#[async_trait]
impl RingQuery for QueryClient {
    async fn put(&self, key: &str, value: String) -> Result<()> {
        let req = PutRequest {
            key: key.to_string(),
            value,
        };
        let resp = self
            .post_json(ENDPOINT_PUT, &req, self.config.rpc_attempts)
            .await?;
        expect_success(resp).await
    }

    async fn get(&self, key: &str) -> Result<String> {
        let mut url = self.url(ENDPOINT_GET)?;
        url.query_pairs_mut().append_pair("key", key);
        let body: GetResponse = self.get_json(url).await?;
        Ok(body.value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let req = DeleteRequest {
            key: key.to_string(),
        };
        let resp = self
            .post_json(ENDPOINT_DELETE, &req, self.config.rpc_attempts)
            .await?;
        expect_success(resp).await
    }

    async fn list_values(&self) -> Result<Vec<String>> {
        let body: ValuesResponse = self.get_json(self.url(ENDPOINT_VALUES)?).await?;
        Ok(body.values)
    }

    async fn force_routing_refresh(&self) -> Result<()> {
        let resp = self.post_json(ENDPOINT_REFRESH, &(), 1).await?;
        expect_success(resp).await
    }

    async fn enumerate_members(&self) -> Result<Vec<PeerRef>> {
        let body: MembersResponse = self.get_json(self.url(ENDPOINT_MEMBERS)?).await?;
        Ok(body.members)
    }

    async fn leave(&self) -> Result<()> {
        // A replayed leave would find the member already alone, but the first
        // attempt may have failed half way. Let the caller decide.
        let resp = self.post_json(ENDPOINT_LEAVE, &(), 1).await?;
        expect_success(resp).await
    }

    async fn probe_ring(&self) -> Result<usize> {
        let resp = self.post_json(ENDPOINT_PROBE, &(), 1).await?;
        let body: ProbeResponse = decode(resp).await?;
        Ok(body.hops)
    }
}
