use std::{path::PathBuf, time::Duration};

pub const DEFAULT_OPENAI_DEPLOYMENT: &str = "gpt-4o";
pub const DEFAULT_STORAGE_CONTAINER: &str = "clinical-records";
const DEFAULT_PROFILE_DIR: &str = ".neurotrack";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechConfig {
    pub key: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightConfig {
    pub key: String,
    pub endpoint: String,
    pub deployment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub account: String,
    pub sas_token: String,
    pub container: String,
}

/// Timer cadence of one assessment cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub duration_tick: Duration,
    pub simulation_interval: Duration,
    pub stage_tick: Duration,
    pub completion_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            duration_tick: Duration::from_secs(1),
            simulation_interval: Duration::from_secs(2),
            stage_tick: Duration::from_millis(800),
            completion_delay: Duration::from_millis(1200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub speech: bool,
    pub insight: bool,
    pub prediction: bool,
    pub storage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub speech: Option<SpeechConfig>,
    pub insight: Option<InsightConfig>,
    pub prediction: Option<PredictionConfig>,
    pub storage: Option<StorageConfig>,
    pub database_url: Option<String>,
    pub profile_dir: PathBuf,
    pub allow_simulation: bool,
    pub http_timeout: Duration,
    pub log_filter: Option<String>,
    pub log_format: LogFormat,
    pub pacing: Pacing,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            speech: None,
            insight: None,
            prediction: None,
            storage: None,
            database_url: None,
            profile_dir: PathBuf::from(DEFAULT_PROFILE_DIR),
            allow_simulation: true,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            log_filter: None,
            log_format: LogFormat::Pretty,
            pacing: Pacing::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let speech = match (get("AZURE_SPEECH_KEY"), get("AZURE_SPEECH_REGION")) {
            (Some(key), Some(region)) => Some(SpeechConfig { key, region }),
            _ => None,
        };

        let insight = match (get("AZURE_OPENAI_KEY"), get("AZURE_OPENAI_ENDPOINT")) {
            (Some(key), Some(endpoint)) => Some(InsightConfig {
                key,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                deployment: get("AZURE_OPENAI_DEPLOYMENT")
                    .unwrap_or_else(|| DEFAULT_OPENAI_DEPLOYMENT.to_string()),
            }),
            _ => None,
        };

        let prediction = match (get("AZURE_ML_URL"), get("AZURE_ML_KEY")) {
            (Some(url), Some(key)) if is_rest_endpoint(&url) => Some(PredictionConfig { url, key }),
            _ => None,
        };

        let storage = match (get("AZURE_STORAGE_ACCOUNT"), get("AZURE_STORAGE_SAS_TOKEN")) {
            (Some(account), Some(sas_token)) => Some(StorageConfig {
                account,
                sas_token: sas_token.trim_start_matches('?').to_string(),
                container: get("AZURE_STORAGE_CONTAINER")
                    .unwrap_or_else(|| DEFAULT_STORAGE_CONTAINER.to_string()),
            }),
            _ => None,
        };

        let allow_simulation = !matches!(
            get("NEUROTRACK_SIMULATION").as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("off" | "false" | "0" | "disabled")
        );

        let http_timeout = get("NEUROTRACK_HTTP_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        let log_format = match get("NEUROTRACK_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            speech,
            insight,
            prediction,
            storage,
            database_url: get("DATABASE_URL"),
            profile_dir: get("NEUROTRACK_PROFILE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROFILE_DIR)),
            allow_simulation,
            http_timeout,
            log_filter: get("NEUROTRACK_LOG").or_else(|| get("RUST_LOG")),
            log_format,
            pacing: Pacing::default(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            speech: self.speech.is_some(),
            insight: self.insight.is_some(),
            prediction: self.prediction.is_some(),
            storage: self.storage.is_some(),
        }
    }

    /// Live mode needs both speech and insight credentials; otherwise the demo
    /// runs on its internal simulation.
    pub fn is_live(&self) -> bool {
        let caps = self.capabilities();
        caps.speech && caps.insight
    }
}

/// Portal links from the ML studio are not scoring endpoints.
fn is_rest_endpoint(url: &str) -> bool {
    url.starts_with("http") && !url.contains("ml.azure.com")
}
