use crate::api::client::TransferApi;
use crate::core::error::PassError;
use crate::engine::research::{trigger_research, Researcher};
use crate::models::transfer::{ShareLimit, Transfer};
use crate::policy::classifier::{classify, Policy, Verdict};
use crate::utils::format::{format_ratio, format_size, truncate_name};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const NAME_WIDTH: usize = 60;

#[derive(Debug, Clone)]
pub struct GuardOptions {
    /// Also drop completed over-limit transfers from the client (files kept)
    pub remove_completed: bool,
    pub max_warning_lines: usize,
    /// Upper bound on classification workers
    pub concurrency: usize,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            remove_completed: true,
            max_warning_lines: 10,
            concurrency: 8,
        }
    }
}

/// A transfer placed in an action bucket, with the ratio it was judged on
#[derive(Debug, Clone, Copy)]
pub struct Flagged<'a> {
    pub transfer: &'a Transfer,
    pub ratio: f64,
}

/// Verdicts aggregated into the batches issued against the remote API
#[derive(Debug, Default)]
pub struct Buckets<'a> {
    /// OverLimit and DeadSwarm: share limit forced to 0
    pub stop_seeding: Vec<Flagged<'a>>,
    /// DeadSwarm only: removed together with downloaded data
    pub delete: Vec<Flagged<'a>>,
    /// OverLimit and complete: removed, files kept
    pub remove_keeping_files: Vec<Flagged<'a>>,
    pub warnings: Vec<Flagged<'a>>,
    pub skipped: usize,
    pub compliant: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub monitored: usize,
    pub skipped: usize,
    pub compliant: usize,
    pub stopped: usize,
    pub dead_swarms: usize,
    pub removed_completed: usize,
    pub warnings: usize,
    pub research_triggered: usize,
    pub research_failed: usize,
    /// Removed dead swarms whose category no job-queue service handles
    pub research_unrouted: usize,
    /// Action buckets whose remote call failed
    pub failed_actions: Vec<&'static str>,
}

/// Classify every transfer on a bounded pool of tasks. The result is indexed
/// like `transfers` regardless of which worker finishes first.
pub async fn classify_all(transfers: Arc<[Transfer]>, policy: Policy, concurrency: usize) -> Vec<Verdict> {
    if transfers.is_empty() {
        return Vec::new();
    }

    let workers = concurrency.clamp(1, transfers.len());
    let chunk_size = transfers.len().div_ceil(workers);
    let mut results: Vec<Option<Verdict>> = vec![None; transfers.len()];
    let mut set = JoinSet::new();

    for start in (0..transfers.len()).step_by(chunk_size) {
        let transfers = Arc::clone(&transfers);
        set.spawn(async move {
            let end = (start + chunk_size).min(transfers.len());
            let verdicts: Vec<Verdict> = transfers[start..end]
                .iter()
                .map(|transfer| classify(transfer, &policy))
                .collect();
            (start, verdicts)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((start, verdicts)) => {
                for (offset, verdict) in verdicts.into_iter().enumerate() {
                    results[start + offset] = Some(verdict);
                }
            }
            Err(e) => {
                warn!(error = %e, "Classification worker failed, classifying its share inline");
            }
        }
    }

    results
        .into_iter()
        .zip(transfers.iter())
        .map(|(verdict, transfer)| verdict.unwrap_or_else(|| classify(transfer, &policy)))
        .collect()
}

/// Sort verdicts into action buckets. DeadSwarm transfers land in both
/// `stop_seeding` and `delete`.
pub fn partition<'a>(transfers: &'a [Transfer], verdicts: &[Verdict], remove_completed: bool) -> Buckets<'a> {
    let mut buckets = Buckets::default();

    for (transfer, verdict) in transfers.iter().zip(verdicts) {
        match *verdict {
            Verdict::Skip(_) => buckets.skipped += 1,
            Verdict::Compliant => buckets.compliant += 1,
            Verdict::Warn { ratio } => buckets.warnings.push(Flagged { transfer, ratio }),
            Verdict::OverLimit { ratio } => {
                let flagged = Flagged { transfer, ratio };
                buckets.stop_seeding.push(flagged);
                if remove_completed && transfer.is_complete() {
                    buckets.remove_keeping_files.push(flagged);
                }
            }
            Verdict::DeadSwarm { ratio } => {
                let flagged = Flagged { transfer, ratio };
                buckets.stop_seeding.push(flagged);
                buckets.delete.push(flagged);
            }
        }
    }

    buckets
}

fn ids(flagged: &[Flagged<'_>]) -> Vec<String> {
    flagged.iter().map(|f| f.transfer.id.clone()).collect()
}

/// One fetch-classify-act pass of the ratio guard.
///
/// A failed snapshot aborts before anything is changed. After that, each
/// action bucket is attempted independently and failures are only logged.
pub async fn run_guard_pass<A, R>(
    api: &A,
    researcher: &R,
    policy: &Policy,
    options: &GuardOptions,
) -> Result<PassSummary, PassError>
where
    A: TransferApi,
    R: Researcher,
{
    info!("=== Ratio guard pass starting ===");

    let transfers: Arc<[Transfer]> = api
        .fetch_transfers()
        .await
        .map_err(PassError::Snapshot)?
        .into();

    info!(transfers = transfers.len(), "Monitoring transfers");

    let verdicts = classify_all(Arc::clone(&transfers), *policy, options.concurrency).await;
    let buckets = partition(&transfers, &verdicts, options.remove_completed);

    let mut summary = PassSummary {
        monitored: transfers.len(),
        skipped: buckets.skipped,
        compliant: buckets.compliant,
        warnings: buckets.warnings.len(),
        ..PassSummary::default()
    };

    if !buckets.stop_seeding.is_empty() {
        match api
            .set_share_limits(&ids(&buckets.stop_seeding), ShareLimit::Ratio(0.0))
            .await
        {
            Ok(()) => {
                summary.stopped = buckets.stop_seeding.len();
                warn!(count = summary.stopped, "Stopped seeding on over-limit transfers");
                for f in &buckets.stop_seeding {
                    warn!(
                        ratio = %format_ratio(f.ratio),
                        uploaded = %format_size(f.transfer.bytes_uploaded),
                        progress_pct = (f.transfer.completion * 100.0).round(),
                        availability = %format!("{:.2}", f.transfer.availability.display_value()),
                        name = %truncate_name(&f.transfer.name, NAME_WIDTH),
                        "  stop seeding"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, count = buckets.stop_seeding.len(), "Failed to stop seeding");
                summary.failed_actions.push("stop_seeding");
            }
        }
    }

    if !buckets.delete.is_empty() {
        warn!(count = buckets.delete.len(), "Removing dead swarms and their data");
        for f in &buckets.delete {
            warn!(
                ratio = %format_ratio(f.ratio),
                availability = %format!("{:.2}", f.transfer.availability.display_value()),
                name = %truncate_name(&f.transfer.name, NAME_WIDTH),
                "  dead swarm"
            );
        }

        match api.delete_transfers(&ids(&buckets.delete), true).await {
            Ok(()) => {
                summary.dead_swarms = buckets.delete.len();
                let removed: Vec<&Transfer> = buckets.delete.iter().map(|f| f.transfer).collect();
                let research = trigger_research(researcher, &removed).await;
                summary.research_triggered = research.triggered;
                summary.research_failed = research.failed;
                summary.research_unrouted = research.unrouted;
            }
            Err(e) => {
                // Not removed, so no replacement is requested either
                error!(error = %e, count = buckets.delete.len(), "Failed to remove dead swarms");
                summary.failed_actions.push("delete_dead_swarms");
            }
        }
    }

    if !buckets.remove_keeping_files.is_empty() {
        info!(
            count = buckets.remove_keeping_files.len(),
            "Removing completed transfers that hit the ratio limit (keeping files)"
        );
        for f in &buckets.remove_keeping_files {
            info!(
                ratio = %format_ratio(f.ratio),
                name = %truncate_name(&f.transfer.name, NAME_WIDTH),
                "  remove completed"
            );
        }

        match api
            .delete_transfers(&ids(&buckets.remove_keeping_files), false)
            .await
        {
            Ok(()) => summary.removed_completed = buckets.remove_keeping_files.len(),
            Err(e) => {
                error!(error = %e, "Failed to remove completed transfers");
                summary.failed_actions.push("remove_completed");
            }
        }
    }

    if !buckets.warnings.is_empty() {
        info!(count = buckets.warnings.len(), "High ratio warnings");
        for f in buckets.warnings.iter().take(options.max_warning_lines) {
            info!(
                ratio = %format_ratio(f.ratio),
                uploaded = %format_size(f.transfer.bytes_uploaded),
                name = %truncate_name(&f.transfer.name, NAME_WIDTH),
                "  high ratio"
            );
        }
    }

    info!(
        monitored = summary.monitored,
        stopped = summary.stopped,
        dead_swarms = summary.dead_swarms,
        removed_completed = summary.removed_completed,
        warnings = summary.warnings,
        skipped = summary.skipped,
        research_triggered = summary.research_triggered,
        research_failed = summary.research_failed,
        research_unrouted = summary.research_unrouted,
        failed_actions = ?summary.failed_actions,
        "Ratio guard pass complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ResearchError;
    use crate::engine::fake::{Call, FakeTransferManager};
    use crate::models::transfer::{Availability, LifecycleState};
    use std::sync::Mutex;

    const GB: u64 = 1024 * 1024 * 1024;

    #[derive(Default)]
    struct RecordingResearcher {
        researched: Mutex<Vec<String>>,
    }

    impl Researcher for RecordingResearcher {
        fn handles(&self, category: &str) -> bool {
            category == "radarr"
        }

        async fn research(&self, transfer: &Transfer) -> Result<u64, ResearchError> {
            self.researched.lock().unwrap().push(transfer.id.clone());
            Ok(7)
        }
    }

    fn transfer(
        id: char,
        downloaded: u64,
        uploaded: u64,
        completion: f64,
        availability: f64,
    ) -> Transfer {
        let mut t = Transfer::new(id.to_string().repeat(40), format!("Transfer.{}", id));
        t.bytes_downloaded = downloaded;
        t.bytes_uploaded = uploaded;
        t.completion = completion;
        t.availability = Availability::from_api(availability);
        t.category = "radarr".to_string();
        t
    }

    fn id(c: char) -> String {
        c.to_string().repeat(40)
    }

    /// A: over limit only, B: dead swarm, C: empty, D: paused, E: complete over limit, F: warn
    fn scenario() -> Vec<Transfer> {
        let a = transfer('a', 10 * GB, 60 * GB, 0.4, 0.1);
        let b = transfer('b', GB, 15 * GB, 0.2, 0.05);
        let c = transfer('c', 0, 0, 0.0, -1.0);
        let mut d = transfer('d', GB, 100 * GB, 0.3, 0.0);
        d.state = LifecycleState::PausedDownloading;
        let mut e = transfer('e', GB, 9 * GB, 1.0, 2.0);
        e.state = LifecycleState::Seeding;
        let f = transfer('f', GB, 4 * GB, 0.7, 1.0);
        vec![a, b, c, d, e, f]
    }

    #[tokio::test]
    async fn test_classify_all_preserves_order() {
        let transfers: Arc<[Transfer]> = scenario().into();
        let policy = Policy::default();

        for concurrency in [1, 2, 3, 10, 64] {
            let verdicts = classify_all(Arc::clone(&transfers), policy, concurrency).await;
            let expected: Vec<Verdict> = transfers.iter().map(|t| classify(t, &policy)).collect();
            assert_eq!(verdicts, expected);
        }
    }

    #[tokio::test]
    async fn test_classify_all_empty() {
        let transfers: Arc<[Transfer]> = Vec::<Transfer>::new().into();
        assert!(classify_all(transfers, Policy::default(), 4).await.is_empty());
    }

    #[test]
    fn test_partition_buckets() {
        let transfers = scenario();
        let policy = Policy::default();
        let verdicts: Vec<Verdict> = transfers.iter().map(|t| classify(t, &policy)).collect();
        let buckets = partition(&transfers, &verdicts, true);

        assert_eq!(ids(&buckets.stop_seeding), vec![id('a'), id('b'), id('e')]);
        assert_eq!(ids(&buckets.delete), vec![id('b')]);
        assert_eq!(ids(&buckets.remove_keeping_files), vec![id('e')]);
        assert_eq!(ids(&buckets.warnings), vec![id('f')]);
        assert_eq!(buckets.skipped, 1);
        assert_eq!(buckets.compliant, 1);
    }

    #[test]
    fn test_partition_without_housekeeping() {
        let transfers = scenario();
        let policy = Policy::default();
        let verdicts: Vec<Verdict> = transfers.iter().map(|t| classify(t, &policy)).collect();
        let buckets = partition(&transfers, &verdicts, false);

        assert!(buckets.remove_keeping_files.is_empty());
        assert_eq!(buckets.stop_seeding.len(), 3);
    }

    #[tokio::test]
    async fn test_guard_pass_issues_batched_commands() {
        let api = FakeTransferManager::with(scenario());
        let researcher = RecordingResearcher::default();

        let summary = run_guard_pass(&api, &researcher, &Policy::default(), &GuardOptions::default())
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::SetShareLimits(vec![id('a'), id('b'), id('e')], ShareLimit::Ratio(0.0)),
                Call::Delete(vec![id('b')], true),
                Call::Delete(vec![id('e')], false),
            ]
        );
        assert_eq!(*researcher.researched.lock().unwrap(), vec![id('b')]);
        assert_eq!(
            summary,
            PassSummary {
                monitored: 6,
                skipped: 1,
                compliant: 1,
                stopped: 3,
                dead_swarms: 1,
                removed_completed: 1,
                warnings: 1,
                research_triggered: 1,
                research_failed: 0,
                research_unrouted: 0,
                failed_actions: vec![],
            }
        );
        assert_eq!(api.remaining_ids(), vec![id('a'), id('c'), id('d'), id('f')]);
    }

    #[tokio::test]
    async fn test_unrouted_dead_swarm_is_counted() {
        let mut transfers = scenario();
        for t in transfers.iter_mut().filter(|t| t.id == id('b')) {
            t.category = "music".to_string();
        }
        let api = FakeTransferManager::with(transfers);
        let researcher = RecordingResearcher::default();

        let summary = run_guard_pass(&api, &researcher, &Policy::default(), &GuardOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.dead_swarms, 1);
        assert_eq!(summary.research_triggered, 0);
        assert_eq!(summary.research_unrouted, 1);
        assert!(researcher.researched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guard_pass_is_idempotent() {
        let api = FakeTransferManager::with(scenario());
        let researcher = RecordingResearcher::default();
        let policy = Policy::default();
        let options = GuardOptions {
            remove_completed: false,
            ..GuardOptions::default()
        };

        let first = run_guard_pass(&api, &researcher, &policy, &options).await.unwrap();
        assert_eq!(first.stopped, 3);

        let calls_after_first = api.calls().len();
        let second = run_guard_pass(&api, &researcher, &policy, &options).await.unwrap();

        assert_eq!(second.stopped, 0);
        assert_eq!(second.dead_swarms, 0);
        assert_eq!(api.calls().len(), calls_after_first);
        assert_eq!(researcher.researched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_failure_takes_no_action() {
        let api = FakeTransferManager {
            fail_fetch: true,
            ..FakeTransferManager::with(scenario())
        };
        let researcher = RecordingResearcher::default();

        let result =
            run_guard_pass(&api, &researcher, &Policy::default(), &GuardOptions::default()).await;

        assert!(matches!(result, Err(PassError::Snapshot(_))));
        assert!(api.calls().is_empty());
        assert!(researcher.researched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_bucket_does_not_block_others() {
        let api = FakeTransferManager {
            fail_share_limits: true,
            ..FakeTransferManager::with(scenario())
        };
        let researcher = RecordingResearcher::default();

        let summary = run_guard_pass(&api, &researcher, &Policy::default(), &GuardOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.failed_actions, vec!["stop_seeding"]);
        assert_eq!(summary.stopped, 0);
        assert_eq!(summary.dead_swarms, 1);
        assert_eq!(summary.removed_completed, 1);
        assert_eq!(summary.research_triggered, 1);
    }

    #[tokio::test]
    async fn test_quiet_snapshot_issues_nothing() {
        let api = FakeTransferManager::with(vec![transfer('c', 0, 0, 0.0, -1.0)]);
        let researcher = RecordingResearcher::default();

        let summary = run_guard_pass(&api, &researcher, &Policy::default(), &GuardOptions::default())
            .await
            .unwrap();

        assert!(api.calls().is_empty());
        assert_eq!(summary.compliant, 1);
    }
}
