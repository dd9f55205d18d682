use crate::api::arr::{find_match, read_api_key, ArrClient, ArrKind};
use crate::core::config::{expand_home, ArrServiceConfig, ResearchConfig};
use crate::core::error::ResearchError;
use crate::models::transfer::Transfer;
use crate::utils::format::truncate_name;
use tracing::{debug, error, info, warn};

/// Requests a replacement download for a transfer that was removed
#[allow(async_fn_in_trait)]
pub trait Researcher {
    /// Whether some upstream service is routed to this category
    fn handles(&self, category: &str) -> bool;

    /// Trigger a search and return the upstream job id it was issued for
    async fn research(&self, transfer: &Transfer) -> Result<u64, ResearchError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResearchSummary {
    pub triggered: usize,
    pub failed: usize,
    pub unrouted: usize,
}

/// Best-effort: every failure is logged per transfer and never propagated
pub async fn trigger_research<R: Researcher>(researcher: &R, removed: &[&Transfer]) -> ResearchSummary {
    let mut summary = ResearchSummary::default();

    for transfer in removed {
        let name = truncate_name(&transfer.name, 60);

        if !researcher.handles(&transfer.category) {
            debug!(category = %transfer.category, name = %name, "No job-queue service for category");
            summary.unrouted += 1;
            continue;
        }

        match researcher.research(transfer).await {
            Ok(job_id) => {
                info!(category = %transfer.category, job_id, name = %name, "Triggered re-search");
                summary.triggered += 1;
            }
            Err(e) => {
                error!(category = %transfer.category, error = %e, name = %name, "Failed to trigger re-search");
                summary.failed += 1;
            }
        }
    }

    summary
}

struct Route {
    category: String,
    client: ArrClient,
}

/// Routes transfers to Radarr/Sonarr by category
pub struct ArrResearcher {
    routes: Vec<Route>,
}

impl ArrResearcher {
    /// Build routes for every service whose API key can be read.
    /// Services without a key are left out for this pass.
    pub fn from_config(config: &ResearchConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let services = [
            (ArrKind::Radarr, &config.radarr),
            (ArrKind::Sonarr, &config.sonarr),
        ];

        let routes = services
            .into_iter()
            .filter_map(|(kind, service)| build_route(kind, service, config))
            .collect();

        Self { routes }
    }

    pub fn disabled() -> Self {
        Self { routes: Vec::new() }
    }

    fn route(&self, category: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.category == category)
    }
}

fn build_route(kind: ArrKind, service: &ArrServiceConfig, config: &ResearchConfig) -> Option<Route> {
    let key_path = expand_home(&service.config_path);

    let Some(api_key) = read_api_key(&key_path) else {
        debug!(service = kind.as_str(), path = %key_path.display(), "API key not found, service disabled");
        return None;
    };

    match ArrClient::new(kind, service, api_key, config.page_size, config.timeout_secs) {
        Ok(client) => Some(Route {
            category: service.category.clone(),
            client,
        }),
        Err(e) => {
            warn!(service = kind.as_str(), error = %e, "Failed to create job-queue client");
            None
        }
    }
}

impl Researcher for ArrResearcher {
    fn handles(&self, category: &str) -> bool {
        self.route(category).is_some()
    }

    async fn research(&self, transfer: &Transfer) -> Result<u64, ResearchError> {
        let route = self
            .route(&transfer.category)
            .ok_or_else(|| ResearchError::UnknownCategory(transfer.category.clone()))?;

        let records = route.client.queue().await?;
        let record = find_match(&records, &transfer.name).ok_or(ResearchError::NoMatch)?;

        let job_id = record
            .job_id(route.client.kind())
            .ok_or_else(|| ResearchError::MissingJobId(record.title.clone()))?;

        route.client.search(job_id).await?;

        Ok(job_id)
    }
}
