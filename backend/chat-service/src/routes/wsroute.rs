use crate::metrics;
use crate::services::credential_from_request;
use crate::state::AppState;
use crate::websocket::handlers::handle_client_event;
use crate::websocket::message_types::{ClientEvent, ConnectedUser, ServerEvent};
use crate::websocket::ConnectionId;
use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler, WrapFuture};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

// WebSocket Actor for an authenticated user
struct WsSession {
    user_id: Uuid,
    connection_id: Option<ConnectionId>,
    state: AppState,
    hb: Instant,
}

impl WsSession {
    fn new(user_id: Uuid, state: AppState) -> Self {
        Self {
            user_id,
            connection_id: None,
            state,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.state.config.ws_heartbeat_interval;
        let timeout = self.state.config.ws_client_timeout;

        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(user_id = %act.user_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_event(ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        match event.to_frame() {
            Ok(frame) => ctx.text(frame),
            Err(e) => tracing::error!(event = event.name(), error = %e, "failed to encode event"),
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "WebSocket session started");

        self.hb(ctx);

        Self::send_event(
            ctx,
            &ServerEvent::ConnectionSuccess {
                message: "Connected successfully".into(),
                user: ConnectedUser { id: self.user_id },
            },
        );

        // Frames addressed to this connection by other sessions and services
        let (connection_id, rx) = self.state.presence.register(self.user_id);
        self.connection_id = Some(connection_id);
        ctx.add_stream(UnboundedReceiverStream::new(rx));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "WebSocket session stopped");

        if let Some(connection_id) = self.connection_id.take() {
            self.state.presence.unregister(self.user_id, connection_id);
        }
    }
}

// Outbound frames from the presence registry
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

// Handle WebSocket protocol messages
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                let event = match ClientEvent::parse(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!(user_id = %self.user_id, error = %e, "failed to parse WS message");
                        Self::send_event(ctx, &ServerEvent::error("Invalid event payload"));
                        return;
                    }
                };

                let state = self.state.clone();
                let user_id = self.user_id;
                let fut = async move {
                    handle_client_event(&state.services, &state.presence, user_id, event).await
                };

                // One event at a time per connection
                ctx.wait(fut.into_actor(self).map(|replies, _act, ctx| {
                    for reply in &replies {
                        Self::send_event(ctx, reply);
                    }
                }));
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::debug!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(user_id = %self.user_id, "WebSocket close message received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Short-lived actor for a failed handshake: one `error` event, then close
struct RejectedSession {
    reason: String,
}

impl Actor for RejectedSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        match ServerEvent::error(self.reason.clone()).to_frame() {
            Ok(frame) => ctx.text(frame),
            Err(e) => tracing::error!(error = %e, "failed to encode rejection"),
        }
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: Some(self.reason.clone()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RejectedSession {
    fn handle(&mut self, _msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

// HTTP handler
#[get("/chat/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let token = credential_from_request(&req);

    match state.services.identity.authenticate(token.as_deref()).await {
        Ok(user_id) => ws::start(WsSession::new(user_id, state.get_ref().clone()), &req, stream),
        Err(e) => {
            metrics::AUTH_REJECTIONS.inc();
            tracing::warn!(error = %e, "WebSocket connection rejected");
            ws::start(
                RejectedSession {
                    reason: e.client_message(),
                },
                &req,
                stream,
            )
        }
    }
}
