use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::error::Result as JournalResult;
use crate::journal::convert::{convert_user_logs, ConvertResult};
use crate::journal::events::NewEvent;
use crate::journal::grouping::{self, RegroupResult};
use crate::journal::ingest::{import_log_text, ImportResult};
use crate::journal::types::parse_ts;
use crate::journal::{events, friends, stats, users};

/// Run a journal operation on the shared connection, off the async runtime.
async fn with_conn<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Connection) -> JournalResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(&state.db);
    tokio::task::spawn_blocking(move || {
        let mut conn = db
            .lock()
            .map_err(|e| ApiError::internal(format!("db lock poisoned: {e}")))?;
        op(&mut conn).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal(format!("db task failed: {e}")))?
}

pub async fn health() -> Json<Value> {
    Json(json!({ "success": true, "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

pub async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user = with_conn(&state, move |conn| users::register_user(conn, &req.username)).await?;
    tracing::info!(user = %user.username, id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "user": user }))))
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    /// Date the pasted text is interpreted against; defaults to now.
    pub reference: Option<String>,
}

/// Body is the raw text copied from the client's log view.
pub async fn import_logs(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> Result<Json<ImportResult>, ApiError> {
    let reference: NaiveDateTime = match query.reference.as_deref() {
        Some(raw) => parse_ts(raw).ok_or_else(|| ApiError {
            status: StatusCode::BAD_REQUEST,
            message: format!("invalid reference timestamp: {raw}"),
        })?,
        None => chrono::Local::now().naive_local(),
    };

    let result = with_conn(&state, move |conn| {
        let user = users::require_user(conn, &username)?;
        import_log_text(conn, user.id, &body, reference)
    })
    .await?;
    Ok(Json(result))
}

pub async fn convert_logs(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ConvertResult>, ApiError> {
    let grouping = state.config.grouping.clone();
    let result = with_conn(&state, move |conn| {
        let user = users::require_user(conn, &username)?;
        convert_user_logs(conn, user.id, &grouping)
    })
    .await?;
    Ok(Json(result))
}

pub async fn recompute_groups(State(state): State<AppState>) -> Result<Json<RegroupResult>, ApiError> {
    let result = with_conn(&state, grouping::regroup_all).await?;
    Ok(Json(result))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let (user, friends) = with_conn(&state, move |conn| {
        let user = users::require_user(conn, &username)?;
        let friends = friends::friends_of(conn, user.id)?;
        Ok((user, friends))
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "username": user.username,
        "friends": friends,
    })))
}

pub async fn user_stats(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stats = with_conn(&state, move |conn| {
        let user = users::require_user(conn, &username)?;
        stats::journal_stats(conn, user.id)
    })
    .await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

/// The event's group with its members and the group-wide comments and likes.
pub async fn event_group(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let body = with_conn(&state, move |conn| {
        let group = grouping::group_of_event(conn, event_id)?;
        let members = match &group {
            Some(g) => grouping::group_members(conn, g.id)?,
            None => vec![events::get_event(conn, event_id)?],
        };
        let comments = events::group_comments(conn, event_id)?;
        let like_count = events::group_like_count(conn, event_id)?;
        Ok(json!({
            "success": true,
            "event_id": event_id,
            "group": group,
            "members": members,
            "comments": comments,
            "like_count": like_count,
        }))
    })
    .await?;
    Ok(Json(body))
}

/// Record an event by hand for `username`. It joins a group through the
/// windowed lookup until the next full regroup.
pub async fn create_event(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(new): Json<NewEvent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let window = state.config.grouping.lookup_window_minutes;
    let event = with_conn(&state, move |conn| {
        let user = users::require_user(conn, &username)?;
        events::create_manual_event(conn, user.id, &new, window)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "event": event }))))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let (event, tags) = with_conn(&state, move |conn| {
        let event = events::get_event(conn, event_id)?;
        let tags = events::tags_for_event(conn, event_id)?;
        Ok((event, tags))
    })
    .await?;
    Ok(Json(json!({ "success": true, "event": event, "tags": tags })))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    with_conn(&state, move |conn| events::delete_event(conn, event_id)).await?;
    Ok(Json(json!({ "success": true, "event_id": event_id })))
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn update_notes(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<NotesRequest>,
) -> Result<Json<Value>, ApiError> {
    let notes = req.notes.clone();
    with_conn(&state, move |conn| {
        events::update_event_notes(conn, event_id, req.notes.as_deref())
    })
    .await?;
    Ok(Json(json!({ "success": true, "event_id": event_id, "notes": notes })))
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub tag: String,
}

pub async fn event_tags(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let tags = with_conn(&state, move |conn| {
        events::get_event(conn, event_id)?;
        events::tags_for_event(conn, event_id)
    })
    .await?;
    Ok(Json(json!({ "success": true, "event_id": event_id, "tags": tags })))
}

pub async fn add_tag(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<TagRequest>,
) -> Result<Json<Value>, ApiError> {
    let (added, tags) = with_conn(&state, move |conn| {
        let added = events::add_tag(conn, event_id, &req.tag)?;
        Ok((added, events::tags_for_event(conn, event_id)?))
    })
    .await?;
    Ok(Json(json!({ "success": true, "added": added, "tags": tags })))
}

pub async fn remove_tag(
    State(state): State<AppState>,
    Path((event_id, tag)): Path<(i64, String)>,
) -> Result<Json<Value>, ApiError> {
    let (removed, tags) = with_conn(&state, move |conn| {
        events::get_event(conn, event_id)?;
        let removed = events::remove_tag(conn, event_id, &tag)?;
        Ok((removed, events::tags_for_event(conn, event_id)?))
    })
    .await?;
    Ok(Json(json!({ "success": true, "removed": removed, "tags": tags })))
}

/// Every tag in use, most used first.
pub async fn all_tags(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tags = with_conn(&state, |conn| events::all_tags(conn)).await?;
    Ok(Json(json!({ "success": true, "tags": tags })))
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

pub async fn event_comments(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let comments = with_conn(&state, move |conn| events::group_comments(conn, event_id)).await?;
    Ok(Json(json!({ "success": true, "event_id": event_id, "comments": comments })))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let comment = with_conn(&state, move |conn| {
        let user = users::require_user(conn, &req.username)?;
        events::add_comment(conn, event_id, user.id, &req.content, req.parent_id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "comment": comment }))))
}

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub username: String,
}

/// Like or unlike; answers with the group-wide count afterwards.
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<LikeRequest>,
) -> Result<Json<Value>, ApiError> {
    let (liked, like_count) = with_conn(&state, move |conn| {
        let user = users::require_user(conn, &req.username)?;
        let liked = events::toggle_like(conn, event_id, user.id)?;
        Ok((liked, events::group_like_count(conn, event_id)?))
    })
    .await?;
    Ok(Json(json!({ "success": true, "liked": liked, "like_count": like_count })))
}
