//! Request routing and JSON responses for the HTTP gateway.

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use kumagate_client::ClientError;
use kumagate_core::{Error, MonitorService};
use kumagate_types::MonitorId;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};

const ALLOWED_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// A request the gateway knows how to answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Health,
    Preflight,
    ListMonitors,
    ListStatuses,
    CreateMonitor,
    GetMonitor(MonitorId),
    UpdateMonitor(MonitorId),
    DeleteMonitor(MonitorId),
    MonitorStatus(MonitorId),
    PauseMonitor(MonitorId),
    ResumeMonitor(MonitorId),
}

/// Why a request matched no route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotFound,
    InvalidId,
}

/// Map a method and path onto a route.
pub fn resolve(method: &Method, path: &str) -> Result<Route, Rejection> {
    if method == Method::OPTIONS {
        return Ok(Route::Preflight);
    }

    let segments: Vec<&str> = path.trim_end_matches('/').split('/').skip(1).collect();

    match (method.clone(), segments.as_slice()) {
        (Method::GET, ["health"]) => Ok(Route::Health),
        (Method::GET, ["api", "monitors"]) => Ok(Route::ListMonitors),
        (Method::POST, ["api", "monitors"]) => Ok(Route::CreateMonitor),
        (Method::GET, ["api", "monitors", "status"]) => Ok(Route::ListStatuses),
        (Method::GET, ["api", "monitors", id]) => parse_id(id).map(Route::GetMonitor),
        (Method::PUT, ["api", "monitors", id]) => parse_id(id).map(Route::UpdateMonitor),
        (Method::DELETE, ["api", "monitors", id]) => parse_id(id).map(Route::DeleteMonitor),
        (Method::GET, ["api", "monitors", id, "status"]) => parse_id(id).map(Route::MonitorStatus),
        (Method::POST, ["api", "monitors", id, "pause"]) => parse_id(id).map(Route::PauseMonitor),
        (Method::POST, ["api", "monitors", id, "resume"]) => parse_id(id).map(Route::ResumeMonitor),
        _ => Err(Rejection::NotFound),
    }
}

/// Monitor ids in paths must be plain integers.
fn parse_id(segment: &str) -> Result<MonitorId, Rejection> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Rejection::InvalidId);
    }
    segment
        .parse::<i64>()
        .map(MonitorId::from)
        .map_err(|_| Rejection::InvalidId)
}

/// Answer one request.
pub async fn handle<B>(service: &MonitorService, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let route = match resolve(req.method(), req.uri().path()) {
        Ok(route) => route,
        Err(Rejection::InvalidId) => return failure(StatusCode::BAD_REQUEST, "Invalid monitor ID"),
        Err(Rejection::NotFound) => {
            let message = format!("Cannot {} {}", req.method(), req.uri().path());
            return failure(StatusCode::NOT_FOUND, &message);
        }
    };
    debug!(?route, "Request");

    match route {
        Route::Preflight => preflight(&req),
        Route::Health => json_response(
            StatusCode::OK,
            &json!({
                "success": true,
                "message": "API is running",
                "uptime_kuma_connected": service.session_state().authenticated,
            }),
        ),
        Route::ListMonitors => match service.get_monitors().await {
            Ok(monitors) => listing(&monitors),
            Err(e) => error_response("get monitors", &e, None),
        },
        Route::ListStatuses => match service.get_monitor_statuses().await {
            Ok(statuses) => listing(&statuses),
            Err(e) => error_response("get monitor statuses", &e, None),
        },
        Route::GetMonitor(id) => match service.get_monitor(&id).await {
            Ok(record) => data(StatusCode::OK, None, &record),
            Err(e) => error_response("get monitor", &e, Some("Monitor not found")),
        },
        Route::MonitorStatus(id) => match service.get_monitor_status(&id).await {
            Ok(status) => data(StatusCode::OK, None, &status),
            Err(e) => error_response("get monitor status", &e, Some("Monitor not found")),
        },
        Route::CreateMonitor => {
            let fields = match read_json(req).await {
                Ok(fields) => fields,
                Err(response) => return response,
            };
            match service.create_monitor(fields).await {
                Ok(reply) => data(StatusCode::CREATED, Some("Monitor created successfully"), &reply),
                Err(e) => error_response("create monitor", &e, None),
            }
        }
        Route::UpdateMonitor(id) => {
            let fields = match read_json(req).await {
                Ok(fields) => fields,
                Err(response) => return response,
            };
            match service.update_monitor(&id, fields).await {
                Ok(reply) => data(StatusCode::OK, Some("Monitor updated successfully"), &reply),
                Err(e) => error_response("update monitor", &e, Some("Monitor not found or update failed")),
            }
        }
        Route::DeleteMonitor(id) => match service.delete_monitor(&id).await {
            Ok(()) => message(StatusCode::OK, "Monitor deleted successfully"),
            Err(e) => error_response("delete monitor", &e, Some("Monitor not found or delete failed")),
        },
        Route::PauseMonitor(id) => match service.pause_monitor(&id).await {
            Ok(()) => message(StatusCode::OK, "Monitor paused successfully"),
            Err(e) => error_response("pause monitor", &e, None),
        },
        Route::ResumeMonitor(id) => match service.resume_monitor(&id).await {
            Ok(()) => message(StatusCode::OK, "Monitor resumed successfully"),
            Err(e) => error_response("resume monitor", &e, None),
        },
    }
}

/// Read a JSON body. An empty body reads as `{}`.
async fn read_json<B>(req: Request<B>) -> Result<Value, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let message = format!("Failed to read request body: {}", e);
            return Err(failure(StatusCode::BAD_REQUEST, &message));
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        let message = format!("Invalid JSON body: {}", e);
        failure(StatusCode::BAD_REQUEST, &message)
    })
}

/// Status code and message for a failed call.
///
/// A backend rejection maps to 404 with `not_found` when the operation
/// targets a single monitor.
pub fn classify(err: &Error, not_found: Option<&str>) -> (StatusCode, String) {
    match (err, not_found) {
        (Error::Validation(msg), _) | (Error::InvalidPayload(msg), _) => {
            (StatusCode::BAD_REQUEST, msg.clone())
        }
        (Error::Client(ClientError::RpcRejected { .. }), Some(msg)) => {
            (StatusCode::NOT_FOUND, msg.to_string())
        }
        (other, _) => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn error_response(operation: &str, err: &Error, not_found: Option<&str>) -> Response<Full<Bytes>> {
    let (status, msg) = classify(err, not_found);
    if status.is_server_error() {
        error!(error = %err, "Failed to {}", operation);
    } else {
        debug!(error = %err, status = status.as_u16(), "Failed to {}", operation);
    }
    failure(status, &msg)
}

fn listing<T: Serialize>(items: &[T]) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({ "success": true, "count": items.len(), "data": items }),
    )
}

fn data<T: Serialize>(status: StatusCode, message: Option<&str>, value: &T) -> Response<Full<Bytes>> {
    let mut body = json!({ "success": true });
    if let Some(message) = message {
        body["message"] = json!(message);
    }
    body["data"] = serde_json::to_value(value).unwrap_or(Value::Null);
    json_response(status, &body)
}

fn message(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "success": true, "message": message }))
}

fn failure(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "success": false, "error": message }))
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn preflight<B>(req: &Request<B>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;

    let allow_headers = req
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("Content-Type"));

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}
