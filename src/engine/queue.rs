use crate::api::client::TransferApi;
use crate::core::error::PassError;
use crate::models::transfer::Transfer;
use crate::policy::scorer::rank;
use crate::utils::format::truncate_name;
use tracing::{info, warn};

const NAME_WIDTH: usize = 45;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueSummary {
    pub ranked: usize,
    pub moved: usize,
    pub failed: usize,
}

/// Reorder the download queue so the healthiest transfers come first.
///
/// Transfers are moved to the top one at a time from lowest score to highest,
/// so the last one moved (the best) ends up first. With `apply` false the
/// ranking is only logged.
pub async fn run_queue_pass<A: TransferApi>(api: &A, apply: bool) -> Result<QueueSummary, PassError> {
    info!("=== Queue reorder pass starting ===");

    let transfers: Vec<Transfer> = api.fetch_transfers().await.map_err(PassError::Snapshot)?;
    let ranked = rank(&transfers);

    if ranked.is_empty() {
        info!("No downloading transfers");
        return Ok(QueueSummary::default());
    }

    for entry in &ranked {
        let t = entry.transfer;
        info!(
            score = entry.score,
            progress_pct = %format!("{:.1}", t.completion * 100.0),
            peers = t.peer_count,
            availability = %format!("{:.2}", t.availability.display_value()),
            kib_per_sec = %format!("{:.0}", t.download_rate_kib()),
            state = t.state.as_str(),
            name = %truncate_name(&t.name, NAME_WIDTH),
            "Queue rank"
        );
    }

    let mut summary = QueueSummary {
        ranked: ranked.len(),
        ..QueueSummary::default()
    };

    if !apply {
        info!(ranked = summary.ranked, "Queue reordering disabled, ranking logged only");
        return Ok(summary);
    }

    for entry in ranked.iter().rev() {
        match api.move_to_top(std::slice::from_ref(&entry.transfer.id)).await {
            Ok(()) => summary.moved += 1,
            Err(e) => {
                warn!(
                    error = %e,
                    name = %truncate_name(&entry.transfer.name, NAME_WIDTH),
                    "Failed to move transfer in queue"
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        ranked = summary.ranked,
        moved = summary.moved,
        failed = summary.failed,
        "Queue reorder pass complete, healthy transfers prioritized"
    );

    Ok(summary)
}
