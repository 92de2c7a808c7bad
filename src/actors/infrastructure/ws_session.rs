use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::notification_hub::{Connect, Disconnect, NotificationHub, WsEvent};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// One dashboard connection. Receive-only: client text frames are ignored.
pub struct WsSession {
    id: Option<Uuid>,
    hub: Addr<NotificationHub>,
    last_heartbeat: Instant,
}

impl WsSession {
    pub fn new(hub: Addr<NotificationHub>) -> Self {
        Self {
            id: None,
            hub,
            last_heartbeat: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |session, ctx| {
            if Instant::now().duration_since(session.last_heartbeat) > CLIENT_TIMEOUT {
                tracing::debug!(session_id = ?session.id, "Websocket client timed out");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);

        self.hub
            .send(Connect { addr: ctx.address().recipient() })
            .into_actor(self)
            .then(|result, session, ctx| {
                match result {
                    Ok(id) => session.id = Some(id),
                    Err(e) => {
                        tracing::warn!(error = %e, "Notification hub unavailable, closing websocket");
                        ctx.stop();
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        if let Some(id) = self.id.take() {
            self.hub.do_send(Disconnect { id });
        }
        Running::Stop
    }
}

impl Handler<WsEvent> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: WsEvent, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(bytes)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&bytes);
            }
            Ok(ws::Message::Pong(_)) => self.last_heartbeat = Instant::now(),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {}
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Websocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// `GET /ws`
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<Addr<NotificationHub>>,
) -> Result<HttpResponse, actix_web::Error> {
    ws::start(WsSession::new(hub.get_ref().clone()), &req, stream)
}
