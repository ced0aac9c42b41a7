pub mod client;
pub mod http;
pub mod metadata;

use crate::filter::FilterManager;
use crate::ortb::{BidRequest, BidResponse, Version};
use client::DspClient;
use metadata::{DspMetaData, NO_STATUS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct FanOutResult {
    pub responses: Vec<BidResponse>,
    pub metadata: Vec<DspMetaData>,
}

struct CalloutOutput {
    metadata: Option<DspMetaData>,
    response: Option<BidResponse>,
}

pub struct Router {
    filters: Arc<FilterManager>,
    client: DspClient,
    endpoints_v24: Arc<Vec<String>>,
    endpoints_v25: Arc<Vec<String>>,
    semaphore: Arc<Semaphore>,
    dsp_timeout: Duration,
}

impl Router {
    pub fn new(
        filters: Arc<FilterManager>,
        client: DspClient,
        endpoints_v24: Vec<String>,
        endpoints_v25: Vec<String>,
        max_parallel: usize,
        dsp_timeout: Duration,
    ) -> Self {
        Router {
            filters,
            client,
            endpoints_v24: Arc::new(endpoints_v24),
            endpoints_v25: Arc::new(endpoints_v25),
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
            dsp_timeout,
        }
    }

    /// Calls every endpoint configured for the request's dialect and
    /// collects the surviving responses plus call metadata.
    ///
    /// Partial DSP failure is never an error: slow or broken endpoints are
    /// cut by the deadline and recorded in metadata. A filtered-out
    /// endpoint is not contacted and leaves no metadata.
    pub async fn fan_out(
        &self,
        version: Version,
        req: Arc<BidRequest>,
        spp_endpoint: &str,
        budget: Duration,
    ) -> Result<FanOutResult, anyhow::Error> {
        let endpoints = match version {
            Version::V24 => Arc::clone(&self.endpoints_v24),
            Version::V25 => Arc::clone(&self.endpoints_v25),
        };

        // One serialization shared by every callout.
        let body = bytes::Bytes::from(serde_json::to_vec(req.as_ref())?);
        let call_timeout = self.dsp_timeout.min(budget);

        let mut handles: Vec<(String, JoinHandle<CalloutOutput>)> =
            Vec::with_capacity(endpoints.len());

        for endpoint in endpoints.iter() {
            handles.push((
                endpoint.clone(),
                tokio::spawn(callout(
                    Arc::clone(&self.filters),
                    self.client.clone(),
                    Arc::clone(&self.semaphore),
                    version,
                    Arc::clone(&req),
                    body.clone(),
                    endpoint.clone(),
                    spp_endpoint.to_string(),
                    call_timeout,
                )),
            ));
        }

        let deadline = tokio::time::Instant::now() + budget;
        let mut metadata = Vec::with_capacity(handles.len());
        let mut responses = Vec::new();

        for (endpoint, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(output)) => {
                    // Metadata lands before the response is surfaced.
                    if let Some(meta) = output.metadata {
                        metadata.push(meta);
                    }
                    if let Some(response) = output.response {
                        responses.push(response);
                    }
                }
                Ok(Err(join_err)) => {
                    metadata.push(DspMetaData::new(
                        &endpoint,
                        NO_STATUS,
                        &format!("callout task failed: {join_err}"),
                    ));
                }
                Err(_elapsed) => {
                    handle.abort();
                    metadata.push(DspMetaData::new(
                        &endpoint,
                        NO_STATUS,
                        "deadline exceeded waiting for dsp",
                    ));
                }
            }
        }

        debug!(
            total = metadata.len(),
            survivors = responses.len(),
            "fan-out complete"
        );

        Ok(FanOutResult {
            responses,
            metadata,
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn callout(
    filters: Arc<FilterManager>,
    client: DspClient,
    semaphore: Arc<Semaphore>,
    version: Version,
    req: Arc<BidRequest>,
    body: bytes::Bytes,
    endpoint: String,
    spp_endpoint: String,
    deadline: Duration,
) -> CalloutOutput {
    let _permit = semaphore
        .acquire_owned()
        .await
        .expect("router semaphore is never closed");

    if !filters.allow_request(version, &endpoint, Some(req.as_ref())) {
        debug!(endpoint, "dsp filtered out, skipping callout");
        return CalloutOutput {
            metadata: None,
            response: None,
        };
    }

    match client.send_request(&endpoint, body, deadline).await {
        Err(e) => CalloutOutput {
            metadata: Some(DspMetaData::new(&endpoint, NO_STATUS, &e.to_string())),
            response: None,
        },
        Ok(outcome) => {
            let metadata = Some(DspMetaData::new(
                &endpoint,
                outcome.status_code,
                &outcome.status_message,
            ));

            let response = outcome
                .response
                .filter(|r| filters.allow_response(&spp_endpoint, Some(r)));

            CalloutOutput { metadata, response }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{RuleFile, Side};
    use crate::ortb::{Bid, Device, Geo, Imp, SeatBid};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn sample_request(country: &str) -> Arc<BidRequest> {
        Arc::new(BidRequest {
            id: "r1".into(),
            imp: vec![Imp {
                id: "1".into(),
                bidfloor: 0.5,
                ..Default::default()
            }],
            device: Some(Device {
                ip: Some("1.2.3.4".into()),
                geo: Some(Geo {
                    country: Some(country.into()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn bid_response_json(price: f64) -> String {
        let response = BidResponse {
            id: "r1".into(),
            seatbid: vec![SeatBid {
                seat: None,
                bid: vec![Bid {
                    id: "b1".into(),
                    impid: "1".into(),
                    price,
                    nurl: Some("http://dsp/win".into()),
                    burl: Some("http://dsp/bill".into()),
                    ..Default::default()
                }],
            }],
        };
        serde_json::to_string(&response).unwrap()
    }

    /// Minimal one-shot HTTP server answering every request with the given
    /// status and body.
    async fn spawn_dsp(status: &'static str, body: String) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 16 * 1024];
                    let _ = socket.read(&mut buf).await;
                    let reply = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                });
            }
        });

        addr
    }

    /// Accepts connections and never answers.
    async fn spawn_hung_dsp() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut sockets = Vec::new();
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                sockets.push(socket);
            }
        });

        addr
    }

    fn router(filters: Arc<FilterManager>, endpoints: Vec<String>) -> Router {
        Router::new(
            filters,
            DspClient::new().unwrap(),
            endpoints,
            Vec::new(),
            64,
            Duration::from_millis(400),
        )
    }

    #[tokio::test]
    async fn collects_bids_and_metadata_from_responders() {
        let bidder = spawn_dsp("200 OK", bid_response_json(0.9)).await;
        let no_bidder = spawn_dsp("204 No Content", String::new()).await;
        let broken = spawn_dsp("500 Internal Server Error", String::new()).await;

        let endpoints = vec![
            format!("http://{bidder}/bid"),
            format!("http://{no_bidder}/bid"),
            format!("http://{broken}/bid"),
        ];
        let router = router(Arc::new(FilterManager::new()), endpoints);

        let result = router
            .fan_out(
                Version::V24,
                sample_request("US"),
                "spp1",
                Duration::from_millis(400),
            )
            .await
            .unwrap();

        assert_eq!(result.responses.len(), 1);
        assert_eq!(result.responses[0].bids().next().unwrap().price, 0.9);

        assert_eq!(result.metadata.len(), 3);
        let mut codes: Vec<u16> = result.metadata.iter().map(|m| m.status_code).collect();
        codes.sort_unstable();
        assert_eq!(codes, vec![200, 204, 500]);
    }

    #[tokio::test]
    async fn hung_endpoints_are_cut_by_the_deadline() {
        let bidder = spawn_dsp("200 OK", bid_response_json(1.2)).await;
        let hung = spawn_hung_dsp().await;

        let endpoints = vec![format!("http://{bidder}/bid"), format!("http://{hung}/bid")];
        let router = router(Arc::new(FilterManager::new()), endpoints);

        let started = std::time::Instant::now();
        let result = router
            .fan_out(
                Version::V24,
                sample_request("US"),
                "spp1",
                Duration::from_millis(250),
            )
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(1500));
        assert_eq!(result.responses.len(), 1);
        assert_eq!(result.metadata.len(), 2);

        let hung_meta = result
            .metadata
            .iter()
            .find(|m| m.endpoint.contains(&hung.to_string()))
            .unwrap();
        assert_eq!(hung_meta.status_code, NO_STATUS);
        assert!(!hung_meta.err_msg.is_empty());
    }

    #[tokio::test]
    async fn filtered_endpoints_are_not_contacted() {
        let bidder = spawn_dsp("200 OK", bid_response_json(0.9)).await;
        let endpoint = format!("http://{bidder}/bid");

        let filters = Arc::new(FilterManager::new());
        let file: RuleFile = serde_json::from_value(serde_json::json!({
            "version": "1",
            "dsps": {
                (endpoint.clone()): {
                    "rules": [{
                        "field": "device.geo.country",
                        "condition": "eq",
                        "value_type": "string",
                        "value": "US"
                    }]
                }
            }
        }))
        .unwrap();
        filters.install(Side::Dsp, &file).unwrap();

        let router = router(Arc::clone(&filters), vec![endpoint]);

        let result = router
            .fan_out(
                Version::V24,
                sample_request("CA"),
                "spp1",
                Duration::from_millis(300),
            )
            .await
            .unwrap();

        assert!(result.responses.is_empty());
        assert!(result.metadata.is_empty());
    }

    #[tokio::test]
    async fn response_side_filter_drops_decoded_bids() {
        // Bid comes back without notice URLs: the auto rules must drop it,
        // while its metadata survives.
        let bare = serde_json::json!({
            "id": "r1",
            "seatbid": [{"bid": [{"id": "b1", "impid": "1", "price": 2.0}]}]
        });
        let bidder = spawn_dsp("200 OK", bare.to_string()).await;

        let router = router(
            Arc::new(FilterManager::new()),
            vec![format!("http://{bidder}/bid")],
        );

        let result = router
            .fan_out(
                Version::V24,
                sample_request("US"),
                "spp1",
                Duration::from_millis(300),
            )
            .await
            .unwrap();

        assert!(result.responses.is_empty());
        assert_eq!(result.metadata.len(), 1);
        assert_eq!(result.metadata[0].status_code, 200);
    }
}
