//! `GET /ws`: upgrades to a streaming session with no
//! queue bound at connect time — subscriptions happen via `subscribe`
//! frames rather than a per-connection header parameter.

pub(crate) mod messages;
pub(crate) mod session;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::config::RuntimeSettings;
use crate::domain::manager::QueueManager;
use crate::registry::SubscriberRegistry;
use session::RelaySession;

#[tracing::instrument(name = "Upgrade connection to websocket", skip_all)]
pub async fn upgrade_connection(
    req: HttpRequest,
    stream: web::Payload,
    manager: web::Data<Arc<QueueManager>>,
    registry: web::Data<Arc<SubscriberRegistry>>,
    runtime: web::Data<RuntimeSettings>,
) -> Result<HttpResponse, actix_web::Error> {
    let session = RelaySession::new(
        registry.get_ref().clone(),
        manager.get_ref().clone(),
        Duration::from_secs(runtime.ws_ping_interval_secs),
        Duration::from_secs(runtime.ws_pong_timeout_secs),
    );
    actix_web_actors::ws::start(session, &req, stream)
}
