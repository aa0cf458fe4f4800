use {
    super::{
        holiday::{
            CountryCode,
            Holiday,
            Year,
        },
        metrics::PROMETHEUS_REGISTRY,
        upstream::{
            FetchError,
            UpstreamClient,
        },
    },
    anyhow::{
        Context,
        Result,
    },
    chrono::{
        NaiveDate,
        Utc,
    },
    chrono_tz::Tz,
    serde::Deserialize,
};

pub mod holidays;
pub use holidays::Holidays;

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    /// Timezone deciding which calendar day is "today" when looking for past holidays.
    pub timezone: Tz,
}

impl Default for Config {
    fn default() -> Self {
        Self { timezone: Tz::UTC }
    }
}

/// State contains all relevant shared application state.
pub struct State {
    /// Client for the holiday-data source, shared by every request.
    upstream: UpstreamClient,

    /// Timezone "today" is evaluated in.
    timezone: Tz,
}

impl State {
    pub async fn new(config: &crate::service::config::Config) -> Result<Self> {
        let registry = &mut *PROMETHEUS_REGISTRY.lock().await;
        Ok(State {
            upstream: UpstreamClient::new(&config.upstream, registry)
                .context("Could not create holiday-data client")?,
            timezone: config.state.timezone,
        })
    }
}

/// Anything able to list the holidays of one country for one year.
#[async_trait::async_trait]
pub trait HolidaySource {
    async fn fetch_holidays(
        &self,
        year: Year,
        country: &CountryCode,
    ) -> std::result::Result<Vec<Holiday>, FetchError>;
}

#[async_trait::async_trait]
impl HolidaySource for UpstreamClient {
    async fn fetch_holidays(
        &self,
        year: Year,
        country: &CountryCode,
    ) -> std::result::Result<Vec<Holiday>, FetchError> {
        self.fetch(year, country).await
    }
}

#[async_trait::async_trait]
impl HolidaySource for State {
    async fn fetch_holidays(
        &self,
        year: Year,
        country: &CountryCode,
    ) -> std::result::Result<Vec<Holiday>, FetchError> {
        self.upstream.fetch_holidays(year, country).await
    }
}

/// Source of the current calendar day.
pub trait Calendar {
    fn today(&self) -> NaiveDate;
}

impl Calendar for State {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}
