use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use relay::config::get_configuration;
use relay::domain::manager::QueueManager;
use relay::domain::RelayLimits;
use relay::registry::SubscriberRegistry;
use relay::store::redis::RedisStore;
use relay::telemetry::{get_subscriber, init_subscriber};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber("relay".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let configuration = get_configuration("").expect("Could not load configuration.");

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)
        .unwrap_or_else(|e| panic!("Failed to bind to {address}: {e}"));
    info!(%address, "starting relay");

    info!(addr = %configuration.redis.addr, "connecting to redis");
    let mut counter = 0;
    let mut store_result = RedisStore::connect(&configuration.redis).await;
    while let Err(e) = store_result {
        info!("Failed to connect to redis: {}", e);
        tokio::time::sleep(Duration::from_secs(1)).await;
        counter += 1;
        if counter > 10 {
            panic!("Redis not ready after 10 seconds.");
        }
        store_result = RedisStore::connect(&configuration.redis).await;
    }
    let store = store_result.unwrap();

    let registry = Arc::new(SubscriberRegistry::new());
    let manager = Arc::new(QueueManager::new(
        Arc::new(store),
        registry.clone(),
        RelayLimits::from(&configuration.limits),
    ));

    let cancel = CancellationToken::new();
    let sweeper = tokio::spawn(relay::sweeper::run(
        manager.clone(),
        Duration::from_secs(configuration.runtime.sweep_interval_secs),
        cancel.clone(),
    ));

    let server = relay::run(
        listener,
        manager,
        registry.clone(),
        configuration.runtime.clone(),
    )?;
    let result = server.await;

    cancel.cancel();
    let _ = tokio::time::timeout(
        Duration::from_secs(configuration.runtime.shutdown_grace_secs),
        sweeper,
    )
    .await;
    registry.close().await;

    result
}
