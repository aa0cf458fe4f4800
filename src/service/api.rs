// The HTTP API. It validates requests, hands them to the aggregation engine and renders
// results or errors as JSON. It does not implement any holiday logic itself.
use {
    super::{
        holiday::{
            CountryCode,
            CountryRequest,
            Holiday,
            HolidayCounts,
        },
        metrics::{
            ApiMetrics,
            PROMETHEUS_REGISTRY,
        },
        state::Holidays,
    },
    anyhow::Result,
    percent_encoding::percent_decode_str,
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        collections::HashSet,
        convert::Infallible,
        net::SocketAddr,
        sync::Arc,
    },
    warp::{
        Filter,
        Reply,
        reply::{
            self,
            Response,
        },
    },
};

pub mod error;
pub use error::ApiError;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The address which the HTTP API server will listen on.
    pub listen_address: SocketAddr,
    /// Largest request body accepted by the count and common routes.
    pub max_body_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([127, 0, 0, 1], 8084)),
            max_body_bytes: 16 * 1024,
        }
    }
}

pub async fn run<S>(config: Config, state: Arc<S>)
where
    S: Holidays,
    S: Send,
    S: Sync,
    S: 'static,
{
    if let Err(err) = serve(config, state).await {
        tracing::error!(err = ?err, "API server failed.");
    }

    // Nothing is left to serve without the API.
    let _ = crate::service::EXIT.send(true);
}

async fn serve<S>(config: Config, state: Arc<S>) -> Result<()>
where
    S: Holidays,
    S: Send,
    S: Sync,
    S: 'static,
{
    let metrics = Arc::new(ApiMetrics::new(&mut *PROMETHEUS_REGISTRY.lock().await));

    let (listen_address, serve) = warp::serve(routes(state, metrics, config.max_body_bytes))
        .try_bind_with_graceful_shutdown(config.listen_address, async {
            let _ = crate::service::EXIT.subscribe().changed().await;
        })?;

    tracing::info!(
        listen_address = %listen_address,
        "Starting api server.",
    );

    tokio::task::spawn(serve).await.map_err(|e| e.into())
}

/// Every route of the API, with rejections rendered as JSON errors and each response
/// counted in `metrics`.
pub fn routes<S>(
    state: Arc<S>,
    metrics: Arc<ApiMetrics>,
    max_body_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone
where
    S: Holidays,
    S: Send,
    S: Sync,
    S: 'static,
{
    let with_state = warp::any().map(move || state.clone());

    // Paths are matched before methods so an unknown path is reported as such
    // rather than as a method mismatch on some other route.
    let past = warp::path!("holidays" / "past" / String)
        .and(warp::get())
        .and(with_state.clone())
        .then(|country: String, state: Arc<S>| async move {
            respond(past_holidays(&*state, country).await)
        });

    let count = warp::path!("holidays" / "count")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::body::json::<CountryRequest>())
        .and(with_state.clone())
        .then(|request: CountryRequest, state: Arc<S>| async move {
            respond(holidays_count(&*state, request).await)
        });

    let common = warp::path!("holidays" / "common")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::body::json::<CountryRequest>())
        .and(with_state)
        .then(|request: CountryRequest, state: Arc<S>| async move {
            respond(common_holidays(&*state, request).await)
        });

    past.or(count)
        .unify()
        .or(common)
        .unify()
        .recover(error::handle_rejection)
        .with(warp::log::custom(move |info: warp::log::Info<'_>| {
            metrics.observe(route_label(info.path()), info.status());
        }))
}

fn respond<T: Serialize>(result: Result<T, ApiError>) -> Response {
    match result {
        Ok(value) => reply::json(&value).into_response(),
        Err(err) => err.into_response(),
    }
}

fn route_label(path: &str) -> &'static str {
    match path {
        "/holidays/count" => "count",
        "/holidays/common" => "common",
        path if path.starts_with("/holidays/past/") => "past",
        _ => "unmatched",
    }
}

async fn past_holidays<S: Holidays + Sync>(
    state: &S,
    country: String,
) -> Result<Vec<Holiday>, ApiError> {
    // Path parameters arrive still percent-encoded.
    let country = percent_decode_str(&country).decode_utf8().map_err(|_| {
        ApiError::InvalidInput("Country code must be valid UTF-8.".to_string())
    })?;
    let country = CountryCode::from(country.trim());
    if country.is_empty() {
        return Err(ApiError::InvalidInput(
            "A country code is required to find past holidays.".to_string(),
        ));
    }

    Ok(state.past_holidays(&country).await?)
}

async fn holidays_count<S: Holidays + Sync>(
    state: &S,
    request: CountryRequest,
) -> Result<HolidayCounts, ApiError> {
    validate_country_codes(
        &request.country_codes,
        1,
        "At least one country code is required to find holidays count.",
    )?;

    Ok(state
        .holidays_count(request.year, &request.country_codes)
        .await?)
}

async fn common_holidays<S: Holidays + Sync>(
    state: &S,
    request: CountryRequest,
) -> Result<Vec<Holiday>, ApiError> {
    validate_country_codes(
        &request.country_codes,
        2,
        "At least two country codes are required to find common holidays.",
    )?;

    Ok(state
        .common_holidays(request.year, &request.country_codes)
        .await?)
}

fn validate_country_codes(
    countries: &[CountryCode],
    minimum: usize,
    too_few: &str,
) -> Result<(), ApiError> {
    if countries.len() < minimum {
        return Err(ApiError::InvalidInput(too_few.to_string()));
    }

    if countries.iter().any(|country| country.trim().is_empty()) {
        return Err(ApiError::InvalidInput(
            "Country codes must not be blank.".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for country in countries {
        if !seen.insert(country.to_ascii_uppercase()) {
            return Err(ApiError::InvalidInput(format!(
                "Country code {country} is listed more than once."
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::service::{
            holiday::Year,
            state::{
                Calendar,
                HolidaySource,
            },
            upstream::FetchError,
        },
        chrono::NaiveDate,
        prometheus_client::registry::Registry,
        serde_json::{
            Value,
            json,
        },
        std::{
            collections::BTreeMap,
            sync::atomic::{
                AtomicUsize,
                Ordering,
            },
        },
        warp::hyper::StatusCode,
    };

    #[derive(Default)]
    struct TestState {
        listings: BTreeMap<(Year, CountryCode), Result<Vec<Holiday>, FetchError>>,
        fetches:  AtomicUsize,
    }

    impl TestState {
        fn with(mut self, year: Year, country: &str, dates: &[(u32, u32, &str)]) -> Self {
            let holidays = dates
                .iter()
                .map(|(month, day, name)| {
                    Holiday::new(
                        NaiveDate::from_ymd_opt(year, *month, *day).unwrap(),
                        country.into(),
                        (*name).into(),
                    )
                })
                .collect();
            self.listings.insert((year, country.into()), Ok(holidays));
            self
        }

        fn failing(mut self, year: Year, country: &str, err: FetchError) -> Self {
            self.listings.insert((year, country.into()), Err(err));
            self
        }
    }

    #[async_trait::async_trait]
    impl HolidaySource for TestState {
        async fn fetch_holidays(
            &self,
            year: Year,
            country: &CountryCode,
        ) -> Result<Vec<Holiday>, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.listings
                .get(&(year, country.clone()))
                .cloned()
                .unwrap_or(Ok(vec![]))
        }
    }

    impl Calendar for TestState {
        fn today(&self) -> NaiveDate {
            NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()
        }
    }

    struct Harness {
        state:   Arc<TestState>,
        metrics: Arc<ApiMetrics>,
    }

    impl Harness {
        fn new(state: TestState) -> Self {
            Self {
                state:   Arc::new(state),
                metrics: Arc::new(ApiMetrics::new(&mut Registry::default())),
            }
        }

        async fn request(
            &self,
            method: &str,
            path: &str,
            body: Option<Value>,
        ) -> (StatusCode, String) {
            let routes = routes(self.state.clone(), self.metrics.clone(), 1024);
            let mut request = warp::test::request().method(method).path(path);
            if let Some(body) = body {
                request = request.json(&body);
            }
            let response = request.reply(&routes).await;
            (
                response.status(),
                String::from_utf8(response.body().to_vec()).unwrap(),
            )
        }

        fn fetches(&self) -> usize {
            self.state.fetches.load(Ordering::SeqCst)
        }
    }

    fn parse(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_past_holidays_route() {
        let harness = Harness::new(
            TestState::default()
                .with(2024, "US", &[(1, 1, "New Year's Day"), (7, 4, "Independence Day")])
                .with(2023, "US", &[(12, 25, "Christmas Day")]),
        );

        let (status, body) = harness.request("GET", "/holidays/past/US", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            parse(&body),
            json!([
                {"date": "2024-07-04", "localNames": {"US": "Independence Day"}},
                {"date": "2024-01-01", "localNames": {"US": "New Year's Day"}},
                {"date": "2023-12-25", "localNames": {"US": "Christmas Day"}},
            ])
        );
        assert_eq!(harness.metrics.count("past", StatusCode::OK), 1);
    }

    #[tokio::test]
    async fn test_past_holidays_route_not_found_upstream() {
        let harness = Harness::new(TestState::default().failing(
            2024,
            "XX",
            FetchError::NotFound {
                country: "XX".into(),
                year:    2024,
            },
        ));

        let (status, body) = harness.request("GET", "/holidays/past/XX", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            parse(&body),
            json!({
                "status": 404,
                "error": "Not Found",
                "message": "API error: No holidays found for XX in year 2024",
            })
        );
        assert_eq!(harness.metrics.count("past", StatusCode::NOT_FOUND), 1);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_service_unavailable() {
        let harness = Harness::new(TestState::default().failing(
            2024,
            "US",
            FetchError::Unreachable("connection refused".into()),
        ));

        let (status, body) = harness.request("GET", "/holidays/past/US", None).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            parse(&body)["message"],
            "External service is unreachable: connection refused"
        );
    }

    #[tokio::test]
    async fn test_count_route_keeps_count_order() {
        let harness = Harness::new(
            TestState::default()
                // 2024-01-06 is a Saturday.
                .with(2024, "US", &[(1, 1, "New Year's Day"), (1, 6, "Saturday")])
                .with(2024, "CA", &[(1, 1, "New Year's Day"), (7, 1, "Canada Day")]),
        );

        let (status, body) = harness
            .request(
                "POST",
                "/holidays/count",
                Some(json!({"year": 2024, "countryCodes": ["US", "CA"]})),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"CA":2,"US":1}"#);
        assert_eq!(harness.metrics.count("count", StatusCode::OK), 1);
    }

    #[tokio::test]
    async fn test_count_route_requires_a_country() {
        let harness = Harness::new(TestState::default());

        let (status, body) = harness
            .request(
                "POST",
                "/holidays/count",
                Some(json!({"year": 2024, "countryCodes": []})),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            parse(&body),
            json!({
                "status": 400,
                "error": "Bad Request",
                "message": "Invalid input: At least one country code is required to find holidays count.",
            })
        );
        assert_eq!(harness.fetches(), 0);
        assert_eq!(harness.metrics.count("count", StatusCode::BAD_REQUEST), 1);
    }

    #[tokio::test]
    async fn test_duplicate_country_codes_are_rejected() {
        let harness = Harness::new(TestState::default());

        let (status, body) = harness
            .request(
                "POST",
                "/holidays/count",
                Some(json!({"year": 2024, "countryCodes": ["US", "CA", "us"]})),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            parse(&body)["message"],
            "Invalid input: Country code us is listed more than once."
        );
        assert_eq!(harness.fetches(), 0);
    }

    #[tokio::test]
    async fn test_common_route() {
        let harness = Harness::new(
            TestState::default()
                .with(2024, "US", &[(1, 1, "New Year's Day"), (7, 4, "Independence Day")])
                .with(2024, "CA", &[(1, 1, "Jour de l'An"), (7, 1, "Canada Day")]),
        );

        let (status, body) = harness
            .request(
                "POST",
                "/holidays/common",
                Some(json!({"year": 2024, "countryCodes": ["US", "CA"]})),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            parse(&body),
            json!([
                {
                    "date": "2024-01-01",
                    "localNames": {"CA": "Jour de l'An", "US": "New Year's Day"},
                },
            ])
        );
    }

    #[tokio::test]
    async fn test_common_route_requires_two_countries() {
        let harness = Harness::new(TestState::default());

        let (status, body) = harness
            .request(
                "POST",
                "/holidays/common",
                Some(json!({"year": 2024, "countryCodes": ["US"]})),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            parse(&body)["message"],
            "Invalid input: At least two country codes are required to find common holidays."
        );
        assert_eq!(harness.fetches(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let harness = Harness::new(TestState::default());

        let (status, body) = harness
            .request(
                "POST",
                "/holidays/count",
                Some(json!({"year": "soon", "countryCodes": ["US"]})),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parse(&body)["error"], "Bad Request");
        assert_eq!(harness.fetches(), 0);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let harness = Harness::new(TestState::default());

        let (status, body) = harness.request("GET", "/holidays/future/US", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(
            parse(&body)["message"]
                .as_str()
                .unwrap()
                .starts_with("Invalid resource: ")
        );
        assert_eq!(harness.metrics.count("unmatched", StatusCode::NOT_FOUND), 1);
    }

    #[tokio::test]
    async fn test_wrong_method_is_not_allowed() {
        let harness = Harness::new(TestState::default());

        let (status, body) = harness.request("GET", "/holidays/count", None).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(parse(&body)["status"], 405);
    }

    #[tokio::test]
    async fn test_body_without_content_length_is_bad_request() {
        let harness = Harness::new(TestState::default());
        let routes = routes(harness.state.clone(), harness.metrics.clone(), 1024);

        let response = warp::test::request()
            .method("POST")
            .path("/holidays/count")
            .header("transfer-encoding", "chunked")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = parse(std::str::from_utf8(response.body()).unwrap());
        assert_eq!(body["status"], 400);
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("Malformed request: ")
        );
        assert_eq!(harness.fetches(), 0);
    }

    #[tokio::test]
    async fn test_past_holidays_route_decodes_country_code() {
        let harness = Harness::new(
            TestState::default().with(2024, "US", &[(7, 4, "Independence Day")]),
        );

        let (status, body) = harness.request("GET", "/holidays/past/U%53", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            parse(&body),
            json!([{"date": "2024-07-04", "localNames": {"US": "Independence Day"}}])
        );
    }

    #[tokio::test]
    async fn test_past_holidays_route_rejects_encoded_blank_code() {
        let harness = Harness::new(TestState::default());

        let (status, body) = harness.request("GET", "/holidays/past/%20", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            parse(&body)["message"],
            "Invalid input: A country code is required to find past holidays."
        );
        assert_eq!(harness.fetches(), 0);
    }

    #[tokio::test]
    async fn test_past_holidays_route_rejects_invalid_utf8() {
        let harness = Harness::new(TestState::default());

        let (status, _) = harness.request("GET", "/holidays/past/%FF", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(harness.fetches(), 0);
    }

    #[tokio::test]
    async fn test_failed_bind_shuts_the_service_down() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = Config {
            listen_address: taken.local_addr().unwrap(),
            ..Config::default()
        };
        let exit = crate::service::EXIT.subscribe();

        run(config, Arc::new(TestState::default())).await;

        assert!(*exit.borrow());
    }

    #[test]
    fn test_route_labels() {
        assert_eq!(route_label("/holidays/past/US"), "past");
        assert_eq!(route_label("/holidays/count"), "count");
        assert_eq!(route_label("/holidays/common"), "common");
        assert_eq!(route_label("/holidays/past"), "unmatched");
        assert_eq!(route_label("/"), "unmatched");
    }
}
