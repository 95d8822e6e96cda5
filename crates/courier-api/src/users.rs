use axum::{Extension, extract::State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use courier_db::models::{PartyRow, ThreadMessageRow, UserRow};
use courier_types::api::{Claims, ThreadResponse, UserResponse, UsersResponse};
use courier_types::models::{Counterparty, ThreadMessage, UserProfile, UserSummary};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::middleware::ensure_correct_user;

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: pass the `sent_at` of the oldest message from the previous
    /// page to fetch older messages.
    pub before: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    50
}

const MAX_PAGE: u32 = 200;

/// GET /users — public fields of every user.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<UsersResponse>, ApiError> {
    let rows = crate::blocking(move || state.db.list_users()).await?;
    Ok(Json(UsersResponse {
        users: rows.into_iter().map(summary).collect(),
    }))
}

/// GET /users/:username — full public profile, self only.
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserResponse>, ApiError> {
    ensure_correct_user(&claims, &username)?;

    let row = crate::blocking(move || state.db.get_user(&username)).await?;
    Ok(Json(UserResponse {
        user: profile(row),
    }))
}

/// GET /users/:username/to — messages received, each with its sender.
pub async fn messages_to(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<ThreadQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ThreadResponse>, ApiError> {
    ensure_correct_user(&claims, &username)?;

    let limit = query.limit.min(MAX_PAGE);
    let rows =
        crate::blocking(move || state.db.messages_to(&username, limit, query.before)).await?;

    let messages = rows
        .into_iter()
        .map(|row| thread_message(row, Counterparty::From))
        .collect::<Result<_, _>>()?;
    Ok(Json(ThreadResponse { messages }))
}

/// GET /users/:username/from — messages sent, each with its recipient.
pub async fn messages_from(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<ThreadQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ThreadResponse>, ApiError> {
    ensure_correct_user(&claims, &username)?;

    let limit = query.limit.min(MAX_PAGE);
    let rows =
        crate::blocking(move || state.db.messages_from(&username, limit, query.before)).await?;

    let messages = rows
        .into_iter()
        .map(|row| thread_message(row, Counterparty::To))
        .collect::<Result<_, _>>()?;
    Ok(Json(ThreadResponse { messages }))
}

fn summary(row: PartyRow) -> UserSummary {
    UserSummary {
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone,
    }
}

/// Map the internal row to the external profile. The hash stops here.
fn profile(row: UserRow) -> UserProfile {
    UserProfile {
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone,
        join_at: row.join_at,
        last_login_at: row.last_login_at,
    }
}

fn thread_message(
    row: ThreadMessageRow,
    side: fn(UserSummary) -> Counterparty,
) -> Result<ThreadMessage, ApiError> {
    let id = row
        .id
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt message id {}: {e}", row.id)))?;

    Ok(ThreadMessage {
        id,
        body: row.body,
        sent_at: row.sent_at,
        read_at: row.read_at,
        counterparty: side(UserSummary {
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
        }),
    })
}
