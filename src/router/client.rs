use crate::ortb::BidResponse;
use anyhow::anyhow;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Outcome of one completed DSP call. Transport failures surface as
/// errors from [`DspClient::send_request`] instead.
pub struct DspOutcome {
    pub status_code: u16,
    pub status_message: String,
    pub response: Option<BidResponse>,
}

#[derive(Clone)]
pub struct DspClient {
    http: reqwest::Client,
}

impl DspClient {
    /// Builds the shared client eagerly so a bad configuration fails at
    /// startup rather than on the first auction.
    pub fn new() -> Result<Self, anyhow::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent("midway-exchange")
            .default_headers(headers)
            .http1_only()
            .connect_timeout(Duration::from_millis(300))
            .pool_max_idle_per_host(256)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .tcp_keepalive(Some(Duration::from_secs(20)))
            .tcp_nodelay(true)
            .referer(false)
            .redirect(reqwest::redirect::Policy::none())
            .no_gzip()
            .build()?;

        Ok(DspClient { http })
    }

    /// POSTs the pre-serialized request body to one DSP endpoint.
    ///
    /// Completed HTTP exchanges always return `Ok` whatever the status:
    /// only transport failures (connect, timeout, broken stream) are
    /// errors. A 200 body that does not decode is a completed call with no
    /// usable bid.
    pub async fn send_request(
        &self,
        endpoint: &str,
        body: Bytes,
        deadline: Duration,
    ) -> Result<DspOutcome, anyhow::Error> {
        let response = self
            .http
            .post(endpoint)
            .timeout(deadline)
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow!("cannot post bid request to {endpoint}: {e}"))?;

        let status = response.status();
        let status_code = status.as_u16();
        let status_message = status.canonical_reason().unwrap_or("no status message");

        if status == StatusCode::NO_CONTENT {
            return Ok(DspOutcome {
                status_code,
                status_message: String::new(),
                response: None,
            });
        }

        if status != StatusCode::OK {
            debug!(endpoint, %status, "dsp answered non-bid status");
            return Ok(DspOutcome {
                status_code,
                status_message: status_message.to_string(),
                response: None,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow!("cannot read bid response from {endpoint}: {e}"))?;

        match serde_json::from_slice::<BidResponse>(&bytes) {
            Ok(decoded) => Ok(DspOutcome {
                status_code,
                status_message: String::new(),
                response: Some(decoded),
            }),
            Err(e) => Ok(DspOutcome {
                status_code,
                status_message: format!("cannot decode bid response: {e}"),
                response: None,
            }),
        }
    }
}
