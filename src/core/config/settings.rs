use super::parsing::{
    env_optional, env_or_default, parse_base_url, parse_bool, parse_environment, parse_u64,
};
use super::types::{
    ConfigError, GatewaySettings, HeadlessSettings, RuntimeSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("SGA_ENV").or_else(|| env_optional("ENVIRONMENT")));

        let base_url =
            parse_base_url(env_or_default("SGA_BASE_URL", "http://localhost:8000/handler"))?;
        let request_timeout_seconds = parse_u64(
            "SGA_REQUEST_TIMEOUT_SECONDS",
            env_or_default("SGA_REQUEST_TIMEOUT_SECONDS", "60"),
        )?;
        let connect_timeout_seconds = parse_u64(
            "SGA_CONNECT_TIMEOUT_SECONDS",
            env_or_default("SGA_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;
        let upload_chunk_kb =
            parse_u64("SGA_UPLOAD_CHUNK_KB", env_or_default("SGA_UPLOAD_CHUNK_KB", "64"))?;

        let snapshot_path = env_optional("SGA_SNAPSHOT_PATH");
        let staff = env_optional("SGA_STAFF").map(|value| parse_bool(&value)).unwrap_or(false);

        let log_level = env_or_default("LOG_LEVEL", "info");
        let json = env_optional("LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment },
            gateway: GatewaySettings {
                base_url,
                request_timeout_seconds,
                connect_timeout_seconds,
                upload_chunk_kb,
            },
            headless: HeadlessSettings { snapshot_path, staff },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn gateway(&self) -> &GatewaySettings {
        &self.gateway
    }

    pub(crate) fn headless(&self) -> &HeadlessSettings {
        &self.headless
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SGA_REQUEST_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.gateway.connect_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SGA_CONNECT_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.gateway.upload_chunk_kb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SGA_UPLOAD_CHUNK_KB",
                value: "0".to_string(),
            });
        }

        if self.runtime.environment.is_production() && self.gateway.base_url.starts_with("http://")
        {
            return Err(ConfigError::InvalidBaseUrl(self.gateway.base_url.clone()));
        }

        Ok(())
    }
}
