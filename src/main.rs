use anyhow::{bail, Context, Result};
use std::env;
use std::future::Future;
use swarm_guard::api::client::Session;
use swarm_guard::core::config::Config;
use swarm_guard::core::tracing_init::init_tracing;
use swarm_guard::engine::queue::run_queue_pass;
use swarm_guard::engine::remediation::{run_guard_pass, GuardOptions};
use swarm_guard::engine::research::ArrResearcher;
use tracing::{error, info};

/// Which pass(es) this invocation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Guard,
    Queue,
    All,
}

impl Mode {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            None | Some("guard") => Ok(Mode::Guard),
            Some("queue") => Ok(Mode::Queue),
            Some("all") => Ok(Mode::All),
            Some(other) => bail!("Unknown mode '{}'. Expected one of: guard, queue, all", other),
        }
    }

    fn runs_guard(self) -> bool {
        matches!(self, Mode::Guard | Mode::All)
    }

    fn runs_queue(self) -> bool {
        matches!(self, Mode::Queue | Mode::All)
    }
}

fn main() -> Result<()> {
    let mode = Mode::parse(env::args().nth(1).as_deref())?;

    // Load and validate configuration
    let config = Config::load().context(
        "Failed to load configuration. Check the QB_* / SWARM_GUARD_* environment variables \
        or the file named by SWARM_GUARD_CONFIG.",
    )?;

    // Initialize tracing/logging
    init_tracing(&config.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.worker_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, mode))
}

async fn async_main(config: Config, mode: Mode) -> Result<()> {
    info!(
        mode = ?mode,
        url = %config.transfer_manager.url,
        max_ratio_complete = config.policy.max_ratio_complete,
        max_ratio_incomplete = config.policy.max_ratio_incomplete,
        dead_swarm_ratio = config.policy.dead_swarm_ratio,
        dead_swarm_min_availability = config.policy.dead_swarm_min_availability,
        notify_ratio = config.policy.notify_ratio,
        ratio_source = ?config.policy.ratio_source,
        "swarm-guard starting"
    );

    let config = &config;
    run_passes(mode, || guard(config), || queue(config)).await
}

/// Run the selected passes in order. Each pass runs even if an earlier one
/// failed; the first error is returned once all have finished.
async fn run_passes<G, GF, Q, QF>(mode: Mode, guard: G, queue: Q) -> Result<()>
where
    G: FnOnce() -> GF,
    GF: Future<Output = Result<()>>,
    Q: FnOnce() -> QF,
    QF: Future<Output = Result<()>>,
{
    let mut first_error = None;

    if mode.runs_guard() {
        if let Err(e) = guard().await {
            first_error.get_or_insert(e);
        }
    }

    if mode.runs_queue() {
        if let Err(e) = queue().await {
            first_error.get_or_insert(e);
        }
    }

    first_error.map_or(Ok(()), Err)
}

async fn login(config: &Config) -> Result<Session> {
    match Session::login(&config.transfer_manager).await {
        Ok(session) => Ok(session),
        Err(e) if e.is_authentication() => {
            error!(error = %e, user = %config.transfer_manager.username, "Login rejected, check QB_USER / QB_PASS");
            Err(e).context("Transfer manager rejected the credentials")
        }
        Err(e) => {
            error!(error = %e, url = %config.transfer_manager.url, "Failed to connect to transfer manager");
            Err(e).context("Failed to connect to transfer manager")
        }
    }
}

async fn guard(config: &Config) -> Result<()> {
    let session = login(config).await?;
    let researcher = ArrResearcher::from_config(&config.research);
    let options = GuardOptions {
        remove_completed: config.guard.remove_completed,
        max_warning_lines: config.guard.max_warning_lines,
        concurrency: config.runtime.concurrency,
    };

    if let Err(e) = run_guard_pass(&session, &researcher, &config.policy, &options).await {
        error!(error = %e, "Ratio guard pass aborted, no action taken");
        return Err(e).context("Ratio guard pass aborted");
    }

    Ok(())
}

async fn queue(config: &Config) -> Result<()> {
    let session = login(config).await?;

    if let Err(e) = run_queue_pass(&session, config.queue.enabled).await {
        error!(error = %e, "Queue reorder pass aborted, no action taken");
        return Err(e).context("Queue reorder pass aborted");
    }

    Ok(())
}
