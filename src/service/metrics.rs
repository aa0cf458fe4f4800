use {
    lazy_static::lazy_static,
    prometheus_client::{
        encoding::{
            EncodeLabelSet,
            text::encode,
        },
        metrics::{
            counter::Counter,
            family::Family,
        },
        registry::Registry,
    },
    serde::Deserialize,
    std::{
        net::SocketAddr,
        sync::Arc,
    },
    tokio::sync::Mutex,
    warp::{
        Filter,
        Rejection,
        Reply,
        hyper::StatusCode,
        reply,
    },
};

pub fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8888))
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub bind_address: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

lazy_static! {
    pub static ref PROMETHEUS_REGISTRY: Arc<Mutex<Registry>> =
        Arc::new(Mutex::new(<Registry>::default()));
}

/// Instantiate a metrics API.
pub async fn spawn_server(addr: impl Into<SocketAddr> + 'static) {
    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and_then(move || async move {
            let mut buf = String::new();
            let response = encode(&mut buf, &*PROMETHEUS_REGISTRY.lock().await)
                .map(|_| Box::new(reply::with_status(buf, StatusCode::OK)))
                .unwrap_or_else(|e| {
                    tracing::error!(err = ?e, "Metrics: Could not gather metrics from registry");
                    Box::new(reply::with_status(
                        "Could not gather metrics. See logs for details".to_string(),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    ))
                });

            Result::<Box<dyn Reply>, Rejection>::Ok(response)
        });

    let (_, serve) = warp::serve(metrics_route).bind_with_graceful_shutdown(addr, async {
        let _ = crate::service::EXIT.subscribe().changed().await;
    });
    serve.await
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpstreamFetchLabels {
    pub outcome: String,
}

/// Outcome counters for requests made to the holiday-data source.
pub struct UpstreamMetrics {
    fetches: Family<UpstreamFetchLabels, Counter>,
}

impl UpstreamMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self {
            fetches: Family::default(),
        };

        registry.register(
            "upstream_fetches",
            "Holiday listings requested from the holiday-data source, by outcome",
            metrics.fetches.clone(),
        );

        metrics
    }

    pub fn observe(&self, outcome: &str) {
        self.fetches
            .get_or_create(&UpstreamFetchLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    #[cfg(test)]
    pub fn count(&self, outcome: &str) -> u64 {
        self.fetches
            .get_or_create(&UpstreamFetchLabels {
                outcome: outcome.to_string(),
            })
            .get()
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ApiRequestLabels {
    pub route:  String,
    pub status: String,
}

/// Counters for requests served by the HTTP API.
pub struct ApiMetrics {
    requests: Family<ApiRequestLabels, Counter>,
}

impl ApiMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self {
            requests: Family::default(),
        };

        registry.register(
            "api_requests",
            "Requests served by the holiday API, by route and response status",
            metrics.requests.clone(),
        );

        metrics
    }

    pub fn observe(&self, route: &str, status: StatusCode) {
        self.requests
            .get_or_create(&ApiRequestLabels {
                route:  route.to_string(),
                status: status.as_u16().to_string(),
            })
            .inc();
    }

    #[cfg(test)]
    pub fn count(&self, route: &str, status: StatusCode) -> u64 {
        self.requests
            .get_or_create(&ApiRequestLabels {
                route:  route.to_string(),
                status: status.as_u16().to_string(),
            })
            .get()
    }
}
