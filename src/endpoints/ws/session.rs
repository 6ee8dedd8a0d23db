//! The per-connection streaming session (state machine:
//! CONNECT -> OPEN -> SUBSCRIBED -> CLOSED). An `actix::Actor` over
//! `actix_web_actors::ws::WebsocketContext`: a heartbeat `run_interval`
//! closes the session if no pong arrives in time, and async registry
//! calls are bridged into the actor via `actix::fut::wrap_future` +
//! `ctx.spawn`.
//!
//! Only one task ever writes to `ctx` at a time — actix serializes
//! `StreamHandler`/`Handler` callbacks for a single actor — so replies
//! and broadcast notifications never interleave on the wire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, Handler, Running, StreamHandler, WrapFuture};
use actix_web_actors::ws;

use crate::domain::manager::QueueManager;
use crate::registry::{BroadcastNotification, SubscriberId, SubscriberRegistry};

use super::messages::{ClientFrame, ServerFrame};

pub struct RelaySession {
    registry: Arc<SubscriberRegistry>,
    manager: Arc<QueueManager>,
    subscriptions: HashMap<String, SubscriberId>,
    heartbeat: Instant,
    ping_interval: Duration,
    pong_timeout: Duration,
}

impl RelaySession {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        manager: Arc<QueueManager>,
        ping_interval: Duration,
        pong_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            manager,
            subscriptions: HashMap::new(),
            heartbeat: Instant::now(),
            ping_interval,
            pong_timeout,
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let pong_timeout = self.pong_timeout;
        ctx.run_interval(self.ping_interval, move |act, ctx| {
            if Instant::now().duration_since(act.heartbeat) > pong_timeout {
                tracing::info!("closing websocket session: pong deadline exceeded");
                ctx.stop();
                return;
            }
            ctx.ping(b"relay");
        });
    }

    fn send_frame(&self, ctx: &mut ws::WebsocketContext<Self>, frame: &ServerFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => ctx.text(json),
            Err(e) => tracing::warn!(error = %e, "failed to serialize outgoing frame"),
        }
    }

    fn handle_frame(&mut self, raw: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.send_frame(
                    ctx,
                    &ServerFrame::Error {
                        error: format!("malformed frame: {e}"),
                    },
                );
                return;
            }
        };

        match frame {
            ClientFrame::Subscribe {
                queue_id,
                access_token,
            } => self.subscribe(queue_id, access_token, ctx),
            ClientFrame::Unsubscribe { queue_id } => self.unsubscribe(queue_id),
            ClientFrame::Ack {
                queue_id,
                message_id,
                access_token,
            } => self.ack(queue_id, message_id, access_token),
            ClientFrame::Ping => self.send_frame(ctx, &ServerFrame::Pong),
        }
    }

    /// Attach this session as a subscriber of `queue_id`. An absent token
    /// attaches unconditionally (matching the documented client behavior);
    /// a *present* token is validated against the token index and a
    /// mismatch rejects the subscribe with an `error` frame instead of
    /// attaching, tightening privacy for clients that do send a token
    /// without breaking the undocumented-token path.
    fn subscribe(
        &mut self,
        queue_id: String,
        access_token: Option<String>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let registry = self.registry.clone();
        let manager = self.manager.clone();
        let recipient = ctx.address().recipient();
        let handle = queue_id.clone();

        let fut = async move {
            if let Some(token) = &access_token {
                if !manager.validate_token(&handle, token).await {
                    return Err(());
                }
            }
            let id = registry.attach(&handle, recipient).await;
            Ok((handle, id))
        };

        ctx.spawn(fut.into_actor(self).map(move |result, act, ctx| {
            match result {
                Ok((handle, id)) => {
                    act.subscriptions.insert(handle, id);
                }
                Err(()) => {
                    act.send_frame(
                        ctx,
                        &ServerFrame::Error {
                            error: format!("unauthorized subscribe for queue {queue_id}"),
                        },
                    );
                }
            }
        }));
    }

    fn unsubscribe(&mut self, queue_id: String) {
        if let Some(id) = self.subscriptions.remove(&queue_id) {
            let registry = self.registry.clone();
            actix::spawn(async move {
                registry.detach(&queue_id, id).await;
            });
        }
    }

    fn ack(&mut self, queue_id: String, message_id: String, access_token: String) {
        let manager = self.manager.clone();
        actix::spawn(async move {
            if let Err(e) = manager.acknowledge(&queue_id, &message_id, &access_token).await {
                tracing::debug!(error = ?e, %queue_id, %message_id, "ack failed");
            }
        });
    }
}

impl Actor for RelaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);
    }

    /// Terminal state CLOSED: detach every per-handle subscription.
    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        let registry = self.registry.clone();
        let subscriptions = std::mem::take(&mut self.subscriptions);
        actix::spawn(async move {
            for (handle, id) in subscriptions {
                registry.detach(&handle, id).await;
            }
        });
        Running::Stop
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelaySession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, "websocket protocol error, closing session");
                ctx.stop();
                return;
            }
        };

        match msg {
            ws::Message::Ping(bytes) => {
                self.heartbeat = Instant::now();
                ctx.pong(&bytes);
            }
            ws::Message::Pong(_) => {
                self.heartbeat = Instant::now();
            }
            ws::Message::Text(text) => self.handle_frame(&text, ctx),
            ws::Message::Binary(bin) => {
                if let Ok(text) = std::str::from_utf8(&bin) {
                    self.handle_frame(text, ctx);
                }
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) => {
                tracing::trace!("continuation frames are not supported, closing session");
                ctx.stop();
            }
            ws::Message::Nop => {}
        }
    }
}

/// Handler for a broadcast notification routed to this session by the
/// registry. Registry lookups are already scoped to the relevant queue
/// handle, so every notification delivered here is meant for this
/// session.
impl Handler<BroadcastNotification> for RelaySession {
    type Result = ();

    fn handle(&mut self, msg: BroadcastNotification, ctx: &mut Self::Context) {
        self.send_frame(
            ctx,
            &ServerFrame::Message {
                queue_id: msg.queue_handle,
                message_id: msg.message_id,
                payload: msg.payload,
                timestamp: msg.timestamp,
            },
        );
    }
}
