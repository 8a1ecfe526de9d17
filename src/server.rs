//! Local HTTP API
//!
//! Routes:
//! - `POST /api/auth/login`
//! - `POST /api/export`
//! - `GET  /api/news/headlines`
//! - `GET  /api/news/search`
//! - `GET  /api/payouts`
//! - `GET  /api/analytics`
//! - `GET  /api/status`
//! - `GET  /metrics`
//!
//! Validation failures answer 400 with `{"error": ...}`; anything else 500.
//! Bodies over [`MAX_BODY_BYTES`] answer 413.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::analytics::AnalyticsReport;
use crate::auth::{self, LoginRequest};
use crate::cache::CacheStats;
use crate::clock::Clock;
use crate::error::{NewsdeskError, Result};
use crate::export::{self, ExportOutput, ExportRequest, CSV_FILENAME};
use crate::gateway::NewsGateway;
use crate::metrics;
use crate::payout::{AggregationEngine, RateBook};
use crate::schemas::{FilterOptions, PayoutData, ResponseStatus};

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for request handlers
pub struct AppState {
    pub gateway: Arc<NewsGateway>,
    pub rates: RateBook,
    pub engine: AggregationEngine,
    pub clock: Arc<dyn Clock>,
    /// Serve `/metrics`
    pub metrics_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PayoutSummary {
    status: ResponseStatus,
    by_source: Vec<PayoutData>,
    by_author: Vec<PayoutData>,
    total: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceStatus {
    online: bool,
    cache: CacheStats,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

// ============================================
// RESPONSE HELPERS
// ============================================

fn respond(status: StatusCode, body: impl Into<Bytes>, content_type: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => respond(status, bytes, "application/json"),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"Internal server error"}"#,
                "application/json",
            )
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error: message })
}

fn into_response(result: Result<Response<Full<Bytes>>>) -> Response<Full<Bytes>> {
    match result {
        Ok(response) => response,
        Err(NewsdeskError::ValidationError(message)) => {
            error_response(StatusCode::BAD_REQUEST, &message)
        }
        Err(e) => {
            error!(error = %e, "Request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn parse_json<'a, T: serde::Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| NewsdeskError::ValidationError(format!("Malformed request body: {e}")))
}

fn filters_from_query(query: &str) -> Result<FilterOptions> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    FilterOptions::from_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

// ============================================
// HANDLERS
// ============================================

fn handle_login(body: &[u8]) -> Result<Response<Full<Bytes>>> {
    let request: LoginRequest = parse_json(body)?;
    let response = auth::login(&request)?;
    info!(user = %response.user.email, "User logged in");
    Ok(json_response(StatusCode::OK, &response))
}

fn handle_export(body: &[u8]) -> Result<Response<Full<Bytes>>> {
    let request: ExportRequest = parse_json(body)?;
    match export::export(&request)? {
        ExportOutput::Csv(csv) => {
            let mut response = respond(StatusCode::OK, csv, "text/csv");
            response.headers_mut().insert(
                CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=payout-report.csv"),
            );
            debug!(rows = request.data.len(), file = CSV_FILENAME, "Exported CSV");
            Ok(response)
        }
        ExportOutput::Placeholder(body) => Ok(json_response(StatusCode::OK, &body)),
    }
}

async fn handle_search(state: &AppState, query: &str) -> Result<Response<Full<Bytes>>> {
    let filters = filters_from_query(query)?;
    let response = state.gateway.search(&filters).await;
    Ok(json_response(StatusCode::OK, &response))
}

async fn handle_payouts(state: &AppState, query: &str) -> Result<Response<Full<Bytes>>> {
    let filters = filters_from_query(query)?;
    let news = state.gateway.search(&filters).await;
    let rates = state.rates.load().await?;

    let summary = PayoutSummary {
        status: news.status,
        by_source: state.engine.calculate_payouts(&news.articles, &rates),
        by_author: state.engine.payouts_by_author(&news.articles, &rates),
        total: state.engine.total_payout(&news.articles, &rates),
    };
    Ok(json_response(StatusCode::OK, &summary))
}

async fn handle_analytics(state: &AppState, query: &str) -> Result<Response<Full<Bytes>>> {
    let filters = filters_from_query(query)?;
    let news = state.gateway.search(&filters).await;
    let rates = state.rates.load().await?;

    let report = AnalyticsReport::build(&news.articles, &rates, &state.engine, state.clock.today());
    Ok(json_response(StatusCode::OK, &report))
}

/// Dispatches a fully read request
pub async fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    query: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let result = match (method, path) {
        (&Method::POST, "/api/auth/login") => handle_login(body),
        (&Method::POST, "/api/export") => handle_export(body),
        (&Method::GET, "/api/news/headlines") => {
            Ok(json_response(StatusCode::OK, &state.gateway.headlines().await))
        }
        (&Method::GET, "/api/news/search") => handle_search(state, query).await,
        (&Method::GET, "/api/payouts") => handle_payouts(state, query).await,
        (&Method::GET, "/api/analytics") => handle_analytics(state, query).await,
        (&Method::GET, "/api/status") => Ok(json_response(
            StatusCode::OK,
            &ServiceStatus {
                online: state.gateway.network().is_online(),
                cache: state.gateway.stats(),
            },
        )),
        (&Method::GET, "/metrics") if state.metrics_enabled => Ok(respond(
            StatusCode::OK,
            metrics::gather_metrics(),
            "text/plain; version=0.0.4",
        )),
        _ => Ok(error_response(StatusCode::NOT_FOUND, "Not found")),
    };
    into_response(result)
}

/// Collects a request body up to [`MAX_BODY_BYTES`]
async fn read_body<B>(body: B) -> std::result::Result<Bytes, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(limit = MAX_BODY_BYTES, "Request body too large");
            Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"))
        }
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            Err(error_response(StatusCode::BAD_REQUEST, "Failed to read request body"))
        }
    }
}

async fn handle(req: Request<Incoming>, state: Arc<AppState>) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();

    let body = match read_body(req.into_body()).await {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };

    debug!(method = %method, path = %path, "Handling request");
    Ok(route(&state, &method, &path, &query, &body).await)
}

// ============================================
// SERVER
// ============================================

/// Serves connections from an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(error = %e, "Error serving connection");
            }
        });
    }
}

/// Binds `addr` and serves the API
pub async fn start_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP API listening");
    serve(listener, state).await
}
