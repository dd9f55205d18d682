use crate::models::transfer::{LifecycleState, Transfer};

const PEER_POINTS: i64 = 3;
const PEER_CAP: i64 = 50;

/// Priority score for the download queue. Higher is healthier.
pub fn score(transfer: &Transfer) -> i64 {
    let mut score = 0i64;

    score += match transfer.availability.known() {
        Some(avail) if avail >= 1.0 => 100,
        Some(avail) if avail > 0.0 => (avail * 80.0).floor() as i64,
        _ => -50,
    };

    score += (i64::from(transfer.peer_count) * PEER_POINTS).min(PEER_CAP);

    let rate_kib = transfer.download_rate_kib();
    score += if rate_kib > 500.0 {
        40
    } else if rate_kib > 100.0 {
        25
    } else if rate_kib > 10.0 {
        10
    } else {
        0
    };

    score += match transfer.state {
        LifecycleState::StalledDownloading => -30,
        LifecycleState::FetchingMetadata => -40,
        LifecycleState::PausedDownloading | LifecycleState::StoppedDownloading => -100,
        _ => 0,
    };

    if transfer.completion > 0.9 {
        score += 30;
    } else if transfer.completion > 0.5 {
        score += 15;
    }

    score
}

#[derive(Debug, Clone)]
pub struct ScoredTransfer<'a> {
    pub transfer: &'a Transfer,
    pub score: i64,
}

/// Score every download-related transfer, sorted by descending score.
/// Ties keep snapshot order.
pub fn rank(transfers: &[Transfer]) -> Vec<ScoredTransfer<'_>> {
    let mut scored: Vec<ScoredTransfer<'_>> = transfers
        .iter()
        .filter(|t| t.state.is_download_related())
        .map(|transfer| ScoredTransfer {
            transfer,
            score: score(transfer),
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}
