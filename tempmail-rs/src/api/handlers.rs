//! API request handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::error::MailError;
use crate::registry::{Domain, DomainRegistry, DomainStats};
use crate::storage::{MailStats, MailStore, Message, MessagePage, MessageQuery};

/// Default page size of `GET /api/emails`
const DEFAULT_PAGE_SIZE: usize = 20;

/// Shared application state
pub struct AppState {
    pub registry: Arc<DomainRegistry>,
    pub store: Arc<MailStore>,
    /// Live count of accepting SMTP listeners
    pub smtp_listeners: Arc<AtomicUsize>,
    pub started_at: Instant,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn not_found(msg: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::NOT_FOUND, Json(ApiError::new(msg)))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DomainsResponse {
    pub domains: Vec<Domain>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

/// Query string of `GET /api/emails`
#[derive(Debug, Default, Deserialize)]
pub struct EmailsParams {
    pub domain: Option<String>,
    pub recipient: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedAddress {
    pub email: String,
    pub domain: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub uptime_secs: u64,
    pub smtp_listeners: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub domains: DomainStats,
    pub emails: MailStats,
    pub system: SystemStats,
}

/// GET /api/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/domains - All registered domains
pub async fn list_domains(State(state): State<Arc<AppState>>) -> Json<DomainsResponse> {
    Json(DomainsResponse {
        domains: state.registry.list_all().await,
    })
}

/// PUT /api/domains/:name - Enable or disable a domain
pub async fn toggle_domain(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<Json<Domain>> {
    match state.registry.toggle(&name, req.enabled).await {
        Ok(domain) => Ok(Json(domain)),
        Err(MailError::DomainNotFound(_)) => Err(not_found("Domain not found")),
        Err(e) => {
            warn!("Toggle of {} failed: {}", name, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("Failed to update domain")),
            ))
        }
    }
}

/// GET /api/emails - Filtered, paginated message list (newest first)
pub async fn list_emails(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EmailsParams>,
) -> Json<MessagePage> {
    let filter = MessageQuery {
        domain: params.domain.filter(|s| !s.is_empty()),
        recipient: params.recipient.filter(|s| !s.is_empty()),
        search: params.search.filter(|s| !s.is_empty()),
    };
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    Json(state.store.query(&filter, page, limit).await)
}

/// GET /api/emails/:id
pub async fn get_email(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Message>> {
    state
        .store
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Email not found"))
}

/// POST /api/emails/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.store.mark_read(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Email not found"))
    }
}

/// DELETE /api/emails/:id
pub async fn delete_email(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.store.delete(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Email not found"))
    }
}

/// GET /api/stats - Domain, message and process counters
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        domains: state.registry.stats().await,
        emails: state.store.stats().await,
        system: SystemStats {
            uptime_secs: state.started_at.elapsed().as_secs(),
            smtp_listeners: state.smtp_listeners.load(Ordering::SeqCst),
        },
    })
}

/// GET /api/generate-email - Fresh random address on the next domain
pub async fn generate_email(State(state): State<Arc<AppState>>) -> ApiResult<Json<GeneratedAddress>> {
    match state.registry.allocate_address().await {
        Ok((email, domain)) => Ok(Json(GeneratedAddress { email, domain })),
        Err(_) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new("No available domains")),
        )),
    }
}
