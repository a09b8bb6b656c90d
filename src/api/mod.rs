//! JSON-over-HTTP surface for the journal.
//!
//! Handlers are thin: each one takes the shared connection on a blocking thread,
//! calls one journal operation, and serializes its result. Every body carries a
//! `success` flag; a failed operation answers `{ "success": false, "error": ... }`
//! with a matching status and leaves the server running.

mod handlers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::config::JournalConfig;
use crate::error::JournalError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: Arc<JournalConfig>,
}

impl AppState {
    pub fn new(conn: Connection, config: JournalConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/users", post(handlers::register_user))
        .route("/api/users/{username}/logs", post(handlers::import_logs))
        .route("/api/users/{username}/convert", post(handlers::convert_logs))
        .route("/api/users/{username}/friends", get(handlers::list_friends))
        .route("/api/users/{username}/stats", get(handlers::user_stats))
        .route("/api/groups/recompute", post(handlers::recompute_groups))
        .route("/api/users/{username}/events", post(handlers::create_event))
        .route(
            "/api/events/{id}",
            get(handlers::get_event).delete(handlers::delete_event),
        )
        .route("/api/events/{id}/notes", put(handlers::update_notes))
        .route(
            "/api/events/{id}/tags",
            get(handlers::event_tags).post(handlers::add_tag),
        )
        .route("/api/events/{id}/tags/{tag}", delete(handlers::remove_tag))
        .route("/api/tags", get(handlers::all_tags))
        .route(
            "/api/events/{id}/comments",
            get(handlers::event_comments).post(handlers::add_comment),
        )
        .route("/api/events/{id}/like", post(handlers::toggle_like))
        .route("/api/events/{id}/group", get(handlers::event_group))
        .with_state(state)
}

/// A failed request.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<JournalError> for ApiError {
    fn from(err: JournalError) -> Self {
        let status = match &err {
            JournalError::UserNotFound(_) | JournalError::EventNotFound(_) => StatusCode::NOT_FOUND,
            JournalError::InvalidUsername(_) | JournalError::InvalidEvent(_) => {
                StatusCode::BAD_REQUEST
            }
            JournalError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StatusCode::CONFLICT
            }
            JournalError::Transaction { .. } | JournalError::Database(_) | JournalError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.message, "request rejected");
        }
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
