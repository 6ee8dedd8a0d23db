//! A zero-knowledge store-and-forward message relay: the server never
//! inspects `payload`, only handles, tokens, and message ids.

pub mod config;
pub mod domain;
pub mod endpoints;
pub mod error;
pub mod registry;
pub mod store;
pub mod sweeper;
pub mod telemetry;

use std::net::TcpListener;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::error::JsonPayloadError;
use actix_web::http::Method;
use actix_web::{dev::Server, web, App, HttpResponse, HttpServer, ResponseError};
use tracing_actix_web::TracingLogger;

use crate::config::RuntimeSettings;
use crate::domain::manager::QueueManager;
use crate::endpoints::{health_check, queue, ws};
use crate::error::RelayError;
use crate::registry::SubscriberRegistry;

/// `Vec<u8>` payloads are wire-encoded as a JSON array of octets (up to 3
/// digits plus a separator per byte), so the request body can run several
/// times larger than the raw payload it carries; this is the slack factor
/// applied on top of `max_msg_bytes` when sizing the JSON extractor limit.
const JSON_ENCODING_SLACK: usize = 4;
const JSON_FRAME_OVERHEAD: usize = 1024;

async fn options_no_content() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// Configure and run the relay's HTTP/WS surface. CORS is
/// permissive: the relay is a public anonymous service with no notion of
/// an allowed-origin list.
pub fn run(
    listener: TcpListener,
    manager: Arc<QueueManager>,
    registry: Arc<SubscriberRegistry>,
    runtime: RuntimeSettings,
) -> Result<Server, std::io::Error> {
    let json_limit = manager
        .limits()
        .max_msg_bytes
        .saturating_mul(JSON_ENCODING_SLACK)
        + JSON_FRAME_OVERHEAD;

    let manager_data = web::Data::new(manager);
    let registry_data = web::Data::new(registry);
    let runtime_data = web::Data::new(runtime);

    tracing::info!(
        address = %listener.local_addr().expect("Could not get local address"),
        "starting relay"
    );

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default()
            .limit(json_limit)
            .error_handler(|err, _req| {
                let relay_err = match &err {
                    JsonPayloadError::Overflow { .. } => RelayError::PayloadTooLarge,
                    other => RelayError::BadRequest(other.to_string()),
                };
                actix_web::error::InternalError::from_response(
                    err,
                    relay_err.error_response(),
                )
                .into()
            });

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(manager_data.clone())
            .app_data(registry_data.clone())
            .app_data(runtime_data.clone())
            .app_data(json_config)
            .service(
                web::resource("/health")
                    .route(web::get().to(health_check))
                    .route(web::method(Method::OPTIONS).to(options_no_content)),
            )
            .service(
                web::resource("/queue/create")
                    .route(web::post().to(queue::create_queue))
                    .route(web::method(Method::OPTIONS).to(options_no_content)),
            )
            .service(
                web::resource("/queue/{handle}/send")
                    .route(web::post().to(queue::send_message))
                    .route(web::method(Method::OPTIONS).to(options_no_content)),
            )
            .service(
                web::resource("/queue/{handle}/receive")
                    .route(web::get().to(queue::receive_messages))
                    .route(web::method(Method::OPTIONS).to(options_no_content)),
            )
            .service(
                web::resource("/queue/{handle}")
                    .route(web::delete().to(queue::delete_queue))
                    .route(web::method(Method::OPTIONS).to(options_no_content)),
            )
            .service(
                web::resource("/ws")
                    .route(web::get().to(ws::upgrade_connection))
                    .route(web::method(Method::OPTIONS).to(options_no_content)),
            )
    })
    .listen(listener)?
    .run();
    Ok(server)
}
