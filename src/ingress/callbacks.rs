use super::IngressState;
use crate::stats::kv::StatsStore;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    /// Original DSP URL; query extraction already unescaped it.
    pub url: String,
}

pub async fn get_nurl(
    state: web::Data<IngressState>,
    query: web::Query<CallbackQuery>,
) -> HttpResponse {
    proxy_notice(&state, "win notice", state.nurl_timeout, &query).await;
    HttpResponse::Ok().finish()
}

pub async fn get_burl(
    state: web::Data<IngressState>,
    query: web::Query<CallbackQuery>,
) -> HttpResponse {
    let completed = proxy_notice(&state, "billing notice", state.burl_timeout, &query).await;

    if completed {
        mark_billable(state.stats.clone(), state.burl_timeout, &query.id).await;
    }

    HttpResponse::Ok().finish()
}

/// Relays the notice to the DSP. Returns whether the upstream exchange
/// completed, whatever its status; errors are logged, never surfaced.
async fn proxy_notice(
    state: &web::Data<IngressState>,
    kind: &str,
    timeout: Duration,
    query: &CallbackQuery,
) -> bool {
    match state
        .notice_client
        .get(&query.url)
        .timeout(timeout)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            debug!(global_id = %query.id, kind, "notice relayed");
            true
        }
        Ok(response) => {
            warn!(
                global_id = %query.id,
                kind,
                url = %query.url,
                status = response.status().as_u16(),
                "dsp answered notice with an error status"
            );
            true
        }
        Err(e) => {
            warn!(global_id = %query.id, kind, url = %query.url, "cannot relay notice: {e}");
            false
        }
    }
}

async fn mark_billable(stats: StatsStore, budget: Duration, global_id: &str) {
    match tokio::time::timeout(budget, stats.mark_success(global_id)).await {
        Ok(Ok(())) => debug!(global_id, "auction marked billable"),
        Ok(Err(e)) => warn!(global_id, "cannot mark auction billable: {e}"),
        Err(_) => warn!(global_id, "billable mark timed out"),
    }
}
