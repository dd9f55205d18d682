use crate::core::error::ValidationError;
use crate::utils::hash::normalize_info_hash;
use serde::Deserialize;

/// Lifecycle state of a transfer as reported by the transfer manager
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Downloading,
    StalledDownloading,
    QueuedDownloading,
    FetchingMetadata,
    PausedDownloading,
    StoppedDownloading,
    SeedingPaused,
    SeedingStopped,
    Seeding,
    Other,
}

impl LifecycleState {
    /// Map a qBittorrent state string onto a lifecycle state
    pub fn from_api(state: &str) -> Self {
        match state {
            "downloading" | "forcedDL" => LifecycleState::Downloading,
            "stalledDL" => LifecycleState::StalledDownloading,
            "queuedDL" => LifecycleState::QueuedDownloading,
            "metaDL" | "forcedMetaDL" => LifecycleState::FetchingMetadata,
            "pausedDL" => LifecycleState::PausedDownloading,
            "stoppedDL" => LifecycleState::StoppedDownloading,
            "pausedUP" => LifecycleState::SeedingPaused,
            "stoppedUP" => LifecycleState::SeedingStopped,
            "uploading" | "stalledUP" | "queuedUP" | "forcedUP" => LifecycleState::Seeding,
            _ => LifecycleState::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Downloading => "downloading",
            LifecycleState::StalledDownloading => "stalledDL",
            LifecycleState::QueuedDownloading => "queuedDL",
            LifecycleState::FetchingMetadata => "metaDL",
            LifecycleState::PausedDownloading => "pausedDL",
            LifecycleState::StoppedDownloading => "stoppedDL",
            LifecycleState::SeedingPaused => "pausedUP",
            LifecycleState::SeedingStopped => "stoppedUP",
            LifecycleState::Seeding => "seeding",
            LifecycleState::Other => "other",
        }
    }

    /// Paused or stopped, whether downloading or seeding
    pub fn is_inactive(self) -> bool {
        matches!(
            self,
            LifecycleState::PausedDownloading
                | LifecycleState::StoppedDownloading
                | LifecycleState::SeedingPaused
                | LifecycleState::SeedingStopped
        )
    }

    /// States that belong to the download queue and take part in reordering
    pub fn is_download_related(self) -> bool {
        matches!(
            self,
            LifecycleState::Downloading
                | LifecycleState::StalledDownloading
                | LifecycleState::QueuedDownloading
                | LifecycleState::FetchingMetadata
                | LifecycleState::PausedDownloading
                | LifecycleState::StoppedDownloading
        )
    }
}

/// Estimated fraction of the swarm's pieces currently obtainable
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Availability {
    Unknown,
    Known(f64),
}

impl Availability {
    pub fn from_api(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            Availability::Known(value)
        } else {
            Availability::Unknown
        }
    }

    pub fn known(self) -> Option<f64> {
        match self {
            Availability::Known(value) => Some(value),
            Availability::Unknown => None,
        }
    }

    /// Value for log lines, `-1` when unknown
    pub fn display_value(self) -> f64 {
        self.known().unwrap_or(-1.0)
    }
}

/// Per-transfer override of the global share ratio cap
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShareLimit {
    /// Use the transfer manager's global default (-2)
    Global,
    /// No cap (-1)
    Unlimited,
    /// Explicit cap; 0 means seeding is not allowed
    Ratio(f64),
}

impl ShareLimit {
    pub const GLOBAL_SENTINEL: f64 = -2.0;
    pub const UNLIMITED_SENTINEL: f64 = -1.0;

    pub fn from_api(value: f64) -> Result<Self, ValidationError> {
        if value == Self::GLOBAL_SENTINEL {
            Ok(ShareLimit::Global)
        } else if value == Self::UNLIMITED_SENTINEL {
            Ok(ShareLimit::Unlimited)
        } else if value.is_finite() && value >= 0.0 {
            Ok(ShareLimit::Ratio(value))
        } else {
            Err(ValidationError::OutOfRange(format!("ratio_limit {}", value)))
        }
    }

    pub fn to_api(self) -> f64 {
        match self {
            ShareLimit::Global => Self::GLOBAL_SENTINEL,
            ShareLimit::Unlimited => Self::UNLIMITED_SENTINEL,
            ShareLimit::Ratio(value) => value,
        }
    }

    pub fn is_seeding_disabled(self) -> bool {
        matches!(self, ShareLimit::Ratio(value) if value == 0.0)
    }
}

/// Where a transfer's share ratio is read from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatioSource {
    /// uploaded / downloaded, recomputed from the byte counters
    #[default]
    Computed,
    /// The ratio reported by the transfer manager, falling back to computed
    Reported,
}

impl std::str::FromStr for RatioSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "computed" => Ok(RatioSource::Computed),
            "reported" => Ok(RatioSource::Reported),
            other => Err(format!("unknown ratio source '{}'", other)),
        }
    }
}

/// Read-only snapshot of one transfer at observation time
#[derive(Clone, Debug, PartialEq)]
pub struct Transfer {
    /// Lowercase hex info hash, the key for every remote command
    pub id: String,
    pub name: String,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    /// In [0, 1]; 1.0 means fully downloaded
    pub completion: f64,
    pub availability: Availability,
    pub peer_count: u32,
    pub download_rate: u64,
    pub state: LifecycleState,
    pub share_limit: ShareLimit,
    /// Ratio as reported by the transfer manager, if it sent one
    pub reported_ratio: Option<f64>,
    pub category: String,
}

impl Transfer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bytes_uploaded: 0,
            bytes_downloaded: 0,
            completion: 0.0,
            availability: Availability::Unknown,
            peer_count: 0,
            download_rate: 0,
            state: LifecycleState::Downloading,
            share_limit: ShareLimit::Global,
            reported_ratio: None,
            category: String::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion >= 1.0
    }

    /// uploaded / downloaded; infinite when only uploads exist, 0 when neither does
    pub fn computed_ratio(&self) -> f64 {
        if self.bytes_downloaded > 0 {
            self.bytes_uploaded as f64 / self.bytes_downloaded as f64
        } else if self.bytes_uploaded > 0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    pub fn ratio_for(&self, source: RatioSource) -> f64 {
        match source {
            RatioSource::Computed => self.computed_ratio(),
            RatioSource::Reported => self
                .reported_ratio
                .filter(|ratio| !ratio.is_nan())
                .unwrap_or_else(|| self.computed_ratio()),
        }
    }

    pub fn download_rate_kib(&self) -> f64 {
        self.download_rate as f64 / 1024.0
    }
}

/// One record of `/api/v2/torrents/info` as it arrives on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransfer {
    pub hash: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uploaded: u64,
    #[serde(default)]
    pub downloaded: u64,
    #[serde(default)]
    pub progress: f64,
    #[serde(default = "default_availability")]
    pub availability: f64,
    #[serde(default)]
    pub num_seeds: u32,
    #[serde(default)]
    pub dlspeed: u64,
    #[serde(default)]
    pub state: String,
    #[serde(default = "default_ratio_limit")]
    pub ratio_limit: f64,
    #[serde(default)]
    pub ratio: Option<f64>,
    #[serde(default)]
    pub category: String,
}

fn default_availability() -> f64 {
    -1.0
}

fn default_ratio_limit() -> f64 {
    ShareLimit::GLOBAL_SENTINEL
}

impl TryFrom<RawTransfer> for Transfer {
    type Error = ValidationError;

    fn try_from(raw: RawTransfer) -> Result<Self, Self::Error> {
        let id = normalize_info_hash(&raw.hash)?;

        if raw.progress.is_nan() {
            return Err(ValidationError::OutOfRange("progress is NaN".to_string()));
        }

        Ok(Self {
            id,
            name: if raw.name.is_empty() {
                "Unknown".to_string()
            } else {
                raw.name
            },
            bytes_uploaded: raw.uploaded,
            bytes_downloaded: raw.downloaded,
            completion: raw.progress.clamp(0.0, 1.0),
            availability: Availability::from_api(raw.availability),
            peer_count: raw.num_seeds,
            download_rate: raw.dlspeed,
            state: LifecycleState::from_api(&raw.state),
            share_limit: ShareLimit::from_api(raw.ratio_limit)?,
            reported_ratio: raw.ratio,
            category: raw.category,
        })
    }
}
