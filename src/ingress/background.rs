use crate::stats::kv::StatsStore;
use crate::stats::{columns, UNSUCCESS};
use std::time::Duration;
use tracing::{debug, warn};

/// Records the raw opportunity, its geo and the UNSUCCESS placeholder the
/// billing notice later flips.
pub fn spawn_auction_stats(
    stats: StatsStore,
    budget: Duration,
    global_id: String,
    raw_request: Vec<u8>,
    country: String,
) {
    tokio::spawn(async move {
        let writes = async {
            if !raw_request.is_empty() {
                stats
                    .write_column(&global_id, columns::BID_REQUEST, raw_request.as_slice())
                    .await?;
            }
            stats
                .write_column(&global_id, columns::GEO, country.as_str())
                .await?;
            stats
                .write_column(&global_id, columns::RESULT, UNSUCCESS)
                .await
        };

        match tokio::time::timeout(budget, writes).await {
            Ok(Ok(())) => debug!(global_id, "auction stats recorded"),
            Ok(Err(e)) => warn!(global_id, "auction stats write failed: {e}"),
            Err(_) => warn!(global_id, "auction stats write timed out"),
        }
    });
}
