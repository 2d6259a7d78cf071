use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::annotation::{Annotator, DisabledAnnotator, GeminiClient, RetryPolicy};
use crate::auth::AuthService;
use crate::configuration::config::Config;
use crate::dashboard::DashboardStats;
use crate::error_handling::types::*;
use crate::inspection::DetailCoordinator;
use crate::monitor::LiveMonitor;
use crate::storage::open_storage;
use crate::telemetry::public_ip::IPIFY_URL;
use crate::telemetry::{
    lookup_public_ip, ResourceFeed, ResourceTimingSource, SimulatedSource, TelemetrySource,
};
use crate::web_interface::{AppState, WebServer};

/// Owns the configuration and wires the monitor, the annotation pipeline
/// and the web console together.
pub struct Controller {
    pub config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Builds the shared state and the telemetry sources.
    pub async fn build(&self) -> Result<(AppState, Vec<Box<dyn TelemetrySource>>), ControllerError> {
        let config = &self.config;

        let storage = open_storage(&config.storage).await?;
        info!("Storage backend ready ({:?})", config.storage.backend);

        let auth = Arc::new(AuthService::new(storage.clone(), &config.auth));
        auth.restore().await?;
        if let Some(user) = auth.current_user() {
            info!("Restored session of {} ({})", user.name, user.role);
        }

        let annotator: Arc<dyn Annotator> = match GeminiClient::from_settings(&config.annotation) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!("Annotation disabled: {}", e);
                Arc::new(DisabledAnnotator)
            }
        };
        let retry = RetryPolicy::from_settings(&config.annotation);
        let language = config.annotation.language;

        let mut monitor = LiveMonitor::from_settings(&config.monitor)?;
        if config.monitor.lookup_public_ip {
            let info = lookup_public_ip(IPIFY_URL).await;
            info!("Local address {} ({}, {})", info.ip, info.city, info.org);
            monitor.set_local_address(&info.ip);
        }

        let resources = ResourceFeed::new();
        if let Some(ref path) = config.monitor.resource_feed_path {
            let count = resources.load_json_file(path).map_err(|e| {
                ControllerError::InitializationFailed(format!(
                    "cannot load resource feed {}: {}",
                    path.display(),
                    e
                ))
            })?;
            info!("Loaded {} resource timing entries from {}", count, path.display());
        }

        let sources: Vec<Box<dyn TelemetrySource>> = vec![
            Box::new(SimulatedSource::new(config.monitor.simulated_probability)),
            Box::new(ResourceTimingSource::new(
                resources.clone(),
                config.monitor.max_resources_per_tick,
            )),
        ];

        let coordinator = Arc::new(DetailCoordinator::new(
            annotator.clone(),
            auth.clone(),
            retry,
            language,
        ));

        let state = AppState {
            monitor: Arc::new(Mutex::new(monitor)),
            coordinator,
            auth,
            annotator,
            storage,
            dashboard: Arc::new(Mutex::new(DashboardStats::default())),
            resources,
            retry,
            language,
        };
        Ok((state, sources))
    }

    /// Runs until ctrl-c or until the web server fails.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        info!("Starting controller");
        let (state, sources) = self.build().await?;

        let period = Duration::from_millis(self.config.monitor.tick_interval_ms);
        let ingest = tokio::spawn(ingest_loop(state.monitor.clone(), sources, period));

        let mut server = if self.config.web.enabled {
            let web = self.config.web.clone();
            let server = WebServer::new(state.clone());
            Some(tokio::spawn(async move {
                server.start(&web.bind_address, web.port).await
            }))
        } else {
            info!("Web console disabled");
            None
        };

        let result = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Shutdown requested"),
                    Err(e) => error!("Unable to listen for shutdown signal: {}", e),
                }
                Ok(())
            }
            outcome = wait_for_server(&mut server) => outcome,
        };

        ingest.abort();
        if let Some(handle) = server {
            handle.abort();
        }
        self.shutdown();
        result
    }

    pub fn shutdown(&self) {
        info!("Controller stopped");
    }
}

async fn wait_for_server(
    server: &mut Option<JoinHandle<Result<(), WebError>>>,
) -> Result<(), ControllerError> {
    let Some(handle) = server else {
        return pending().await;
    };
    match handle.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("{}", e);
            Err(e.into())
        }
        Err(e) => Err(ControllerError::InitializationFailed(format!(
            "web server task failed: {}",
            e
        ))),
    }
}

/// Polls every source once and appends the events. Returns the number of
/// records added; a paused monitor leaves the sources untouched.
///
/// The monitor stays locked from the pause check to the append, so a pause
/// cannot land between a poll and its tick. Polling is synchronous.
pub fn ingest_once(monitor: &Mutex<LiveMonitor>, sources: &mut [Box<dyn TelemetrySource>]) -> usize {
    let mut monitor = lock_monitor(monitor);
    if monitor.is_paused() {
        return 0;
    }

    let mut events = Vec::new();
    for source in sources.iter_mut() {
        let polled = source.poll();
        if !polled.is_empty() {
            trace!("{} produced {} event(s)", source.name(), polled.len());
        }
        events.extend(polled);
    }
    if events.is_empty() {
        return 0;
    }
    monitor.tick(events)
}

async fn ingest_loop(
    monitor: Arc<Mutex<LiveMonitor>>,
    mut sources: Vec<Box<dyn TelemetrySource>>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!("Ingesting every {:?}", period);
    loop {
        interval.tick().await;
        ingest_once(&monitor, &mut sources);
    }
}

fn lock_monitor(monitor: &Mutex<LiveMonitor>) -> std::sync::MutexGuard<'_, LiveMonitor> {
    monitor
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::StorageBackend;
    use crate::telemetry::{RawEvent, ResourceTiming};
    use std::io::Write;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::File;
        config.storage.path = dir.path().join("data");
        config.web.enabled = false;
        config.annotation.api_key_env = "RAMPART_CONTROLLER_TEST_UNSET_KEY".to_string();
        config
    }

    struct FixedSource(Vec<RawEvent>);

    impl TelemetrySource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn poll(&mut self) -> Vec<RawEvent> {
            std::mem::take(&mut self.0)
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = Config::default();
        config.monitor.capacity = 0;
        assert!(matches!(
            Controller::new(config),
            Err(ControllerError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn build_without_api_key_disables_annotation() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let controller = Controller::new(test_config(&dir)).unwrap();

        let (state, sources) = controller.build().await.unwrap();
        assert_eq!(sources.len(), 2);
        assert!(!state.auth.is_authenticated());
        assert!(matches!(
            state.annotator.generate("hello").await,
            Err(AnnotationError::MissingApiKey)
        ));
        let status = state.monitor().status();
        assert_eq!(status.capacity, 100);
        assert_eq!(status.interface.id, "wlan0");
    }

    #[tokio::test]
    async fn build_loads_resource_feed() {
        let dir = TempDir::new().unwrap();
        let feed_path = dir.path().join("feed.json");
        let mut file = std::fs::File::create(&feed_path).unwrap();
        write!(
            file,
            r#"[{{"name": "https://cdn.example.org/app.js", "initiatorType": "script", "durationMs": 12.5}}]"#
        )
        .unwrap();

        let mut config = test_config(&dir);
        config.monitor.resource_feed_path = Some(feed_path);
        config.monitor.simulated_probability = 0.0;
        let controller = Controller::new(config).unwrap();

        let (state, mut sources) = controller.build().await.unwrap();
        assert_eq!(state.resources.len(), 1);
        assert_eq!(ingest_once(&state.monitor, &mut sources), 1);
        let records = state.monitor().snapshot();
        assert_eq!(records[0].destination_address, "cdn.example.org");
    }

    #[tokio::test]
    async fn build_rejects_malformed_resource_feed() {
        let dir = TempDir::new().unwrap();
        let feed_path = dir.path().join("feed.json");
        std::fs::write(&feed_path, "not json").unwrap();

        let mut config = test_config(&dir);
        config.monitor.resource_feed_path = Some(feed_path);
        let controller = Controller::new(config).unwrap();
        assert!(matches!(
            controller.build().await,
            Err(ControllerError::InitializationFailed(_))
        ));
    }

    #[test]
    fn ingest_once_appends_all_sources_in_order() {
        let monitor = Mutex::new(LiveMonitor::new(10, "wlan0").unwrap());
        let event = |info: &str| RawEvent {
            info: Some(info.to_string()),
            ..Default::default()
        };
        let mut sources: Vec<Box<dyn TelemetrySource>> = vec![
            Box::new(FixedSource(vec![event("a"), event("b")])),
            Box::new(FixedSource(vec![event("c")])),
        ];

        assert_eq!(ingest_once(&monitor, &mut sources), 3);
        assert_eq!(ingest_once(&monitor, &mut sources), 0);
        let infos: Vec<String> = lock_monitor(&monitor)
            .snapshot()
            .into_iter()
            .map(|r| r.info_text)
            .collect();
        assert_eq!(infos, vec!["a", "b", "c"]);
    }

    #[test]
    fn paused_monitor_does_not_drain_sources() {
        let monitor = Mutex::new(LiveMonitor::new(10, "wlan0").unwrap());
        let feed = ResourceFeed::new();
        feed.push(ResourceTiming {
            name: "https://example.org/".to_string(),
            initiator_type: "fetch".to_string(),
            transfer_size: None,
            duration_ms: 1.0,
        });
        let mut sources: Vec<Box<dyn TelemetrySource>> =
            vec![Box::new(ResourceTimingSource::new(feed, 5))];

        lock_monitor(&monitor).pause();
        assert_eq!(ingest_once(&monitor, &mut sources), 0);

        lock_monitor(&monitor).resume();
        assert_eq!(ingest_once(&monitor, &mut sources), 1);
    }

    /// Drains a feed and tries to pause the monitor from inside `poll`, the
    /// way a concurrent pause request would.
    struct PausingSource {
        monitor: Arc<Mutex<LiveMonitor>>,
        inner: ResourceTimingSource,
    }

    impl TelemetrySource for PausingSource {
        fn name(&self) -> &str {
            "pausing"
        }

        fn poll(&mut self) -> Vec<RawEvent> {
            let events = self.inner.poll();
            if let Ok(mut monitor) = self.monitor.try_lock() {
                monitor.pause();
            }
            events
        }
    }

    #[test]
    fn pause_cannot_split_poll_from_tick() {
        let monitor = Arc::new(Mutex::new(LiveMonitor::new(10, "wlan0").unwrap()));
        let feed = ResourceFeed::new();
        feed.push(ResourceTiming {
            name: "https://example.org/app.js".to_string(),
            initiator_type: "script".to_string(),
            transfer_size: Some(512.0),
            duration_ms: 3.0,
        });
        let mut sources: Vec<Box<dyn TelemetrySource>> = vec![Box::new(PausingSource {
            monitor: monitor.clone(),
            inner: ResourceTimingSource::new(feed.clone(), 5),
        })];

        assert_eq!(ingest_once(&monitor, &mut sources), 1);
        assert!(!lock_monitor(&monitor).is_paused());

        let records = lock_monitor(&monitor).snapshot();
        assert_eq!(records.len(), feed.len());
        assert_eq!(records[0].destination_address, "example.org");
    }

    #[test]
    fn concurrent_pauses_never_lose_events() {
        let monitor = Arc::new(Mutex::new(LiveMonitor::new(500, "wlan0").unwrap()));
        let mut sources: Vec<Box<dyn TelemetrySource>> = (0..200)
            .map(|i| {
                let event = RawEvent {
                    info: Some(format!("event {}", i)),
                    ..Default::default()
                };
                Box::new(FixedSource(vec![event])) as Box<dyn TelemetrySource>
            })
            .collect();

        let toggler = {
            let monitor = monitor.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    let mut guard = lock_monitor(&monitor);
                    if i % 2 == 0 {
                        guard.pause();
                    } else {
                        guard.resume();
                    }
                }
            })
        };
        for _ in 0..1_000 {
            ingest_once(&monitor, &mut sources);
        }
        toggler.join().unwrap();

        lock_monitor(&monitor).resume();
        ingest_once(&monitor, &mut sources);
        assert_eq!(lock_monitor(&monitor).snapshot().len(), 200);
    }

    #[tokio::test]
    async fn run_fails_when_port_is_taken() {
        let dir = TempDir::new().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut config = test_config(&dir);
        config.web.enabled = true;
        config.web.port = port;
        let mut controller = Controller::new(config).unwrap();

        assert!(matches!(
            controller.run().await,
            Err(ControllerError::WebError(WebError::BindFailed(_)))
        ));
    }
}
