#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use once_cell::sync::Lazy;
use relay::config::RuntimeSettings;
use relay::domain::manager::QueueManager;
use relay::domain::RelayLimits;
use relay::registry::SubscriberRegistry;
use relay::store::memory::MemoryStore;
use relay::telemetry::{get_subscriber, init_subscriber};

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();
    // `TEST_LOG=true cargo test health_check_works | bunyan` to see logs for
    // a single test.
    if std::env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(
            subscriber_name,
            default_filter_level,
            std::io::stdout,
        ));
    } else {
        init_subscriber(get_subscriber(
            subscriber_name,
            default_filter_level,
            std::io::sink,
        ));
    }
});

pub struct TestApp {
    pub address: String,
    pub manager: Arc<QueueManager>,
    pub registry: Arc<SubscriberRegistry>,
}

impl TestApp {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.address)
    }
}

/// Start the relay against an in-process [`MemoryStore`] so the suite never
/// depends on a live Redis instance. Limits match `configuration/base.yaml`.
pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind to random port");
    let port = listener.local_addr().unwrap().port();

    let registry = Arc::new(SubscriberRegistry::new());
    let manager = Arc::new(QueueManager::new(
        Arc::new(MemoryStore::new()),
        registry.clone(),
        RelayLimits::default(),
    ));
    let runtime = RuntimeSettings {
        request_timeout_secs: 60,
        shutdown_grace_secs: 10,
        sweep_interval_secs: 3600,
        ws_ping_interval_secs: 30,
        ws_pong_timeout_secs: 60,
    };

    let server = relay::run(listener, manager.clone(), registry.clone(), runtime)
        .expect("failed to bind address");
    tokio::spawn(server);

    TestApp {
        address: format!("127.0.0.1:{port}"),
        manager,
        registry,
    }
}
