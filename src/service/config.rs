use {
    super::{
        api,
        metrics,
        state,
        upstream,
    },
    anyhow::Result,
    config as config_rs,
    config_rs::{
        Environment,
        File,
    },
    serde::Deserialize,
    std::{
        path::Path,
        time::Duration,
    },
};

/// Configuration for all components of the Holiday API
#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub upstream:       upstream::Config,
    #[serde(default)]
    pub api_server:     api::Config,
    #[serde(default)]
    pub metrics_server: metrics::Config,
    #[serde(default)]
    pub state:          state::Config,
    pub opentelemetry:  Option<OpenTelemetryConfig>,
}

impl Config {
    pub fn new(config_file: impl AsRef<Path>) -> Result<Self> {
        Self::load(config_file, environment())
    }

    // Build a new configuration object, allowing the default values to be
    // overridden by those in the config_file or by `environment`.
    fn load(config_file: impl AsRef<Path>, environment: Environment) -> Result<Self> {
        config_rs::Config::builder()
            .add_source(File::from(config_file.as_ref()))
            .add_source(environment)
            .build()?
            .try_deserialize()
            .map_err(|e| e.into())
    }
}

/// "HOLIDAY_"-prefixed environment variables, with nested keys separated by a
/// double underscore, e.g. HOLIDAY_UPSTREAM__BASE_URL.
fn environment() -> Environment {
    Environment::with_prefix("holiday")
        .prefix_separator("_")
        .separator("__")
}

#[derive(Deserialize, Debug)]
pub struct OpenTelemetryConfig {
    #[serde(with = "humantime_serde")]
    pub exporter_timeout_duration: Duration,
    pub exporter_endpoint:         String,
}
