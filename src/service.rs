/* ###################################################### System Architecture #######################################################

                                            +-------------------------------------------+
                                            |               Holiday API                 |
+--------+                                  |                                           |
|        |   GET  /holidays/past/{cc}       |   +---------+      +-----------------+    |        +-------------------+
|        |   POST /holidays/count           |   |         |      |                 |    |        |                   |
|  User  |--------------------------------->|   |   API   |----->|   Aggregation   |    |        |   Holiday-data    |
|        |   POST /holidays/common          |   |  Server |      |     Engine      |    |        |      source       |
|        |<---------------------------------|   |         |<-----|   (Holidays)    |    |        |                   |
+--------+                                  |   +---------+      +-----------------+    |        +-------------------+
                                            |                         |       ^         |             ^       |
                                            |                         v       |         |             |       |
                                            |                    +-----------------+    |  GET {base}/{year}/{cc}
                                            |                    | Upstream Client |---------------------+       |
                                            |                    |                 |<----------------------------+
                                            |                    +-----------------+    |
                                            |                                           |
                                            |   +----------------+                      |
                                            |   | Metrics Server |  GET /metrics        |
                                            |   +----------------+                      |
                                            +-------------------------------------------+

Request path:
- The API Server validates the request (path or JSON body) and calls the Aggregation Engine.
- The Aggregation Engine asks the Upstream Client for one (year, country) listing at a time,
  sequentially for past/common holidays and concurrently for per-country counts.
- The Upstream Client issues one GET per listing through a single pooled HTTP client and
  returns either the parsed holidays or a tagged FetchError.
- The API Server renders results as JSON, and errors as `{status, error, message}`.

Nothing is persisted or cached: every request builds its own result from fresh upstream data.

################################################################################################################################## */

pub mod api;
pub mod config;
pub mod holiday;
pub mod metrics;
pub mod state;
pub mod upstream;

use {
    self::config::Config,
    anyhow::Result,
    futures_util::future::join_all,
    lazy_static::lazy_static,
    std::sync::Arc,
    tokio::sync::watch,
};

lazy_static! {
    /// A static exit flag to indicate to running tasks that we're shutting down. This is used to
    /// gracefully shut down the application.
    ///
    /// The `Receiver` side of a watch channel detects changes that happened after the subscribe,
    /// so every listener is notified no matter when it started waiting.
    pub static ref EXIT: watch::Sender<bool> = watch::channel(false).0;
}

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        App { config }
    }

    pub async fn start(&self) {
        tracing::info!(
            config = format!("{:?}", &self.config),
            version = env!("CARGO_PKG_VERSION"),
            "Starting {}",
            env!("CARGO_PKG_NAME"),
        );

        if let Err(err) = self.spawn().await {
            tracing::error!(err = ?err, "Holiday API failed.");
        };
    }

    async fn spawn(&self) -> Result<()> {
        // job handles
        let mut jhs = vec![];

        // Create the shared application state.
        let state = Arc::new(state::State::new(&self.config).await?);

        // Spawn the HTTP API server.
        jhs.push(tokio::spawn(api::run(
            self.config.api_server.clone(),
            state.clone(),
        )));

        // Spawn the metrics server
        jhs.push(tokio::spawn(metrics::spawn_server(
            self.config.metrics_server.bind_address,
        )));

        // Listen for Ctrl-C and tell every component to wind down. Stops early if
        // something else already triggered the shutdown.
        let mut exit = EXIT.subscribe();
        jhs.push(tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        tracing::error!(err = ?err, "Could not listen for shutdown signal.");
                        return;
                    }
                    tracing::info!("Shut-down signal received.");
                    let _ = EXIT.send(true);
                }
                _ = exit.changed() => {}
            }
        }));

        // Wait for all tasks to complete
        join_all(jhs).await;

        Ok(())
    }
}
