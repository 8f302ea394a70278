use log::warn;
use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, guard, http::Method, web};
use actix_ws::{Message, MessageStream, Session};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::error::AppError;
use crate::gpio::GpioBackend;
use crate::properties::PropertySurface;
use crate::registry::PropertyRegistry;
use crate::state::DigitEvent;

pub struct AppState<B: GpioBackend> {
    pub registry: Arc<PropertyRegistry<B>>,
}

impl<B: GpioBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

#[derive(Deserialize, Default)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn handle_event_websocket(
    mut session: Session,
    mut client_stream: MessageStream,
    rx: broadcast::Receiver<DigitEvent>,
) {
    let mut events = BroadcastStream::new(rx);

    loop {
        tokio::select! {
            msg = client_stream.recv() => {
                let Some(msg) = msg else { break; };

                match msg {
                    Ok(Message::Ping(bytes)) => {
                        let _ = session.pong(&bytes).await;
                    }
                    Ok(Message::Close(reason)) => {
                        let _ = session.close(reason).await;
                        break;
                    }
                    Ok(Message::Text(_))
                    | Ok(Message::Binary(_))
                    | Ok(Message::Pong(_))
                    | Ok(Message::Continuation(_))
                    | Ok(Message::Nop) => {}
                    Err(_) => break,
                }
            }
            event = events.next() => {
                let Some(event) = event else { break; };

                match event {
                    Ok(event) => {
                        if let Ok(text) = serde_json::to_string(&event) {
                            if session.text(text).await.is_err() {
                                warn!("WebSocket client disconnected");
                                break;
                            }
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        let msg = AppError::InvalidValue(format!("Event stream lagged by {n} messages"));
                        if session.text(msg.to_string()).await.is_err() {
                            warn!("WebSocket client lagged and disconnected");
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl<B: GpioBackend + 'static> AppState<B> {
    pub fn api_scope(&self, base_path: &str) -> actix_web::Scope {
        web::scope(base_path)
            .service(
                web::resource("/dtmf")
                    .route(web::get().to(list_groups::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/dtmf/{group}")
                    .route(web::get().to(group_values::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/dtmf/{group}/history")
                    .route(web::get().to(get_history::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/dtmf/{group}/events")
                    .route(web::get().to(events_ws::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/dtmf/{group}/{attr}")
                    .route(web::get().to(get_attribute::<B>))
                    .route(web::post().to(set_attribute::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
    }
}

async fn list_groups<B: GpioBackend + 'static>(
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    Ok(web::Json(state.registry.names()))
}

async fn group_values<B: GpioBackend + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let surface = lookup_group(&req, &state)?;

    let mut map = Map::new();
    for (name, value) in surface.values() {
        let value = match value {
            Ok(value) => Value::String(value.trim_end().to_string()),
            Err(e) => {
                warn!("{}: failed to read {name}: {e}", surface.group());
                Value::Null
            }
        };
        map.insert(name.to_string(), value);
    }

    Ok(web::Json(Value::Object(map)))
}

async fn get_attribute<B: GpioBackend + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let surface = lookup_group(&req, &state)?;
    let attr = match_param(&req, "attr")?;
    let value = surface.get(attr)?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(value))
}

async fn set_attribute<B: GpioBackend + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let surface = lookup_group(&req, &state)?;
    let attr = match_param(&req, "attr")?;
    let text = String::from_utf8_lossy(&body);

    surface.set(attr, &text)?;

    Ok(HttpResponse::Ok())
}

async fn get_history<B: GpioBackend + 'static>(
    req: HttpRequest,
    query: web::Query<HistoryQuery>,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let surface = lookup_group(&req, &state)?;

    Ok(web::Json(surface.status().history(query.limit)))
}

async fn events_ws<B: GpioBackend + 'static>(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState<B>>,
) -> Result<HttpResponse, AppError> {
    let rx = lookup_group(&req, &state)?.status().subscribe();
    let (response, session, client_stream) = actix_ws::handle(&req, stream)
        .map_err(|e| AppError::InvalidValue(format!("Websocket error: {e}")))?;

    actix_web::rt::spawn(async move {
        handle_event_websocket(session, client_stream, rx).await;
    });

    Ok(response)
}

fn match_param<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str, AppError> {
    req.match_info()
        .get(name)
        .ok_or_else(|| AppError::InvalidValue(format!("Missing {name}")))
}

fn lookup_group<B: GpioBackend>(
    req: &HttpRequest,
    state: &AppState<B>,
) -> Result<Arc<PropertySurface<B>>, AppError> {
    let group = match_param(req, "group")?;
    state
        .registry
        .get(group)
        .ok_or_else(|| AppError::NotFoundGroup(group.to_string()))
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn guard_not_methods(methods: &[Method]) -> impl guard::Guard {
    let allowed: Vec<Method> = methods.to_vec();
    guard::fn_guard(move |ctx| !allowed.iter().any(|m| m == ctx.head().method))
}
