use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) gateway: GatewaySettings,
    pub(super) headless: HeadlessSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct GatewaySettings {
    pub(crate) base_url: String,
    pub(crate) request_timeout_seconds: u64,
    pub(crate) connect_timeout_seconds: u64,
    pub(crate) upload_chunk_kb: u64,
}

/// Inputs of the headless binary: the embedded snapshot and the role.
#[derive(Debug, Clone)]
pub(crate) struct HeadlessSettings {
    pub(crate) snapshot_path: Option<String>,
    pub(crate) staff: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid handler base url: {0}")]
    InvalidBaseUrl(String),
}

impl GatewaySettings {
    pub(crate) fn upload_chunk_bytes(&self) -> usize {
        usize::try_from(self.upload_chunk_kb.saturating_mul(1024)).unwrap_or(usize::MAX)
    }
}
