//! Upstream
//!
//! Client for the public holiday-data source. Every listing is a single
//! `GET {base_url}/{year}/{country}` returning a JSON array of holiday records.
//! Failures are surfaced as a [`FetchError`] and never retried.

use {
    super::{
        holiday::{
            CountryCode,
            Holiday,
            LocalName,
            Year,
        },
        metrics::UpstreamMetrics,
    },
    anyhow::{
        Result,
        bail,
    },
    chrono::NaiveDate,
    prometheus_client::registry::Registry,
    reqwest::{
        Client,
        StatusCode,
    },
    serde::Deserialize,
    std::time::Duration,
    tracing::instrument,
    url::Url,
};

const DEFAULT_BASE_URL: &str = "https://date.nager.at/api/v3/PublicHolidays";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint the year and country code are appended to.
    pub base_url:        Url,
    /// Upper bound on a whole upstream request, body included.
    #[serde(with = "humantime_serde")]
    pub timeout:         Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url:        default_base_url(),
            timeout:         Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[allow(clippy::expect_used, reason = "constant URL")]
fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("INTERNAL: Could not parse default holiday-data URL")
}

/// Everything that can go wrong while fetching one (year, country) listing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("No holidays found for {country} in year {year}")]
    NotFound { country: CountryCode, year: Year },
    #[error("{0}")]
    BadRequest(String),
    #[error("API request failed: {path} with {status}")]
    Status { status: u16, path: String },
    #[error("Error fetching holidays: {0}")]
    Unreachable(String),
    #[error("Error parsing API response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Metric label for this failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            FetchError::NotFound { .. } => "not_found",
            FetchError::BadRequest(_) => "bad_request",
            FetchError::Status { .. } => "status",
            FetchError::Unreachable(_) => "unreachable",
            FetchError::Parse(_) => "parse",
        }
    }
}

/// One record of the upstream listing. Only the fields we serve are read.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UpstreamHoliday {
    date:       NaiveDate,
    local_name: LocalName,
}

pub struct UpstreamClient {
    client:   Client,
    base_url: Url,
    metrics:  UpstreamMetrics,
}

impl UpstreamClient {
    pub fn new(config: &Config, registry: &mut Registry) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            bail!("holiday-data URL {} cannot take path segments", config.base_url);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            metrics: UpstreamMetrics::new(registry),
        })
    }

    fn endpoint(&self, year: Year, country: &CountryCode) -> Url {
        let mut url = self.base_url.clone();
        // Always Ok: URLs that cannot be a base are refused in `new`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&year.to_string())
                .push(country);
        }
        url
    }

    #[instrument(skip(self))]
    pub async fn fetch(
        &self,
        year: Year,
        country: &CountryCode,
    ) -> std::result::Result<Vec<Holiday>, FetchError> {
        let result = self.request(year, country).await;

        match &result {
            Ok(holidays) => {
                tracing::debug!(count = holidays.len(), "Fetched holidays.");
                self.metrics.observe("ok");
            }
            Err(err) => {
                tracing::debug!(err = %err, "Holiday fetch failed.");
                self.metrics.observe(err.outcome());
            }
        }

        result
    }

    async fn request(
        &self,
        year: Year,
        country: &CountryCode,
    ) -> std::result::Result<Vec<Holiday>, FetchError> {
        let url = self.endpoint(year, country);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| FetchError::Unreachable(e.to_string()))?;
                parse_holidays(&body, country)
            }
            StatusCode::NOT_FOUND => Err(FetchError::NotFound {
                country: country.clone(),
                year,
            }),
            StatusCode::BAD_REQUEST => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| FetchError::Unreachable(e.to_string()))?;
                Err(FetchError::BadRequest(body))
            }
            // 204 and friends: the source has nothing for this country/year.
            status if status.is_success() => Ok(vec![]),
            status => Err(FetchError::Status {
                status: status.as_u16(),
                path:   url.path().to_owned(),
            }),
        }
    }
}

/// Parse an upstream listing, naming each holiday after the requested country.
fn parse_holidays(
    body: &str,
    country: &CountryCode,
) -> std::result::Result<Vec<Holiday>, FetchError> {
    if body.trim().is_empty() {
        return Ok(vec![]);
    }

    // A `null` listing carries no data, same as a blank body.
    let records: Option<Vec<UpstreamHoliday>> =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    Ok(records
        .unwrap_or_default()
        .into_iter()
        .map(|record| Holiday::new(record.date, country.clone(), record.local_name))
        .collect())
}
