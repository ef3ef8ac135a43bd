// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Status query over the presale backend's REST API

use super::query::{ContributionList, HashLookup, StatusQuery};
use crate::contribution::ContributionFields;
use crate::error::{ChannelError, ChannelResult};
use crate::failover::{FailoverConfig, FailoverEndpoints};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Backend client with endpoint failover
#[derive(Debug)]
pub struct HttpStatusQuery {
    client: Client,
    endpoints: FailoverEndpoints,
}

impl HttpStatusQuery {
    pub fn new(
        base_urls: Vec<String>,
        request_timeout: Duration,
        failover: FailoverConfig,
    ) -> ChannelResult<Self> {
        let endpoints = FailoverEndpoints::with_config(base_urls, failover)?;
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChannelError::Request(e.to_string()))?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &[String] {
        self.endpoints.all_endpoints()
    }

    /// GET `{base}/{segments..}` and decode JSON. A 404 yields `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> ChannelResult<Option<T>> {
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let query = &query;
        let client = &self.client;

        self.endpoints
            .with_failover(|base| {
                let url = endpoint_url(base, segments);
                async move {
                    let url = url?;
                    let request = client.get(url.clone()).query(query);
                    let response = request
                        .send()
                        .await
                        .map_err(|e| ChannelError::Request(format!("{}: {}", url, e)))?;
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        debug!("[HttpStatusQuery] 404 from {}", url);
                        return Ok(None);
                    }
                    if !status.is_success() {
                        return Err(ChannelError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| ChannelError::Request(format!("{}: {}", url, e)))?;
                    Ok(Some(serde_json::from_slice(&body)?))
                }
            })
            .await
    }
}

/// Append path segments to a base URL, percent-encoding each one
fn endpoint_url(base: &str, segments: &[&str]) -> ChannelResult<Url> {
    let invalid = |reason: String| ChannelError::InvalidEndpoint {
        url: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl StatusQuery for HttpStatusQuery {
    async fn status_by_hash(&self, tx_hash: &str) -> ChannelResult<HashLookup> {
        Ok(self
            .get_json::<HashLookup>(&["contribution", "status-by-hash", tx_hash.trim()], &[])
            .await?
            .unwrap_or_else(HashLookup::not_found))
    }

    async fn contributions_by_wallet(
        &self,
        address: &str,
    ) -> ChannelResult<Vec<ContributionFields>> {
        let list = self
            .get_json::<ContributionList>(&["contributions"], &[("walletAddress", address.trim())])
            .await?;
        Ok(list.map(|l| l.contributions).unwrap_or_default())
    }
}
