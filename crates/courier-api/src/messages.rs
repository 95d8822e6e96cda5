use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use uuid::Uuid;

use courier_db::models::{MessageDetailRow, PartyRow};
use courier_types::api::{
    Claims, MessageResponse, ReadReceipt, ReadReceiptResponse, SendMessageRequest, SentMessage,
    SentMessageResponse,
};
use courier_types::models::{MessageDetail, UserSummary};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{Json, Path};

/// GET /messages/:id — either party of the message may read it; anyone
/// else gets a 403, never the body.
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    let row = crate::blocking(move || state.db.get_message(&id.to_string())).await?;

    if claims.sub != row.from_user.username && claims.sub != row.to_user.username {
        return Err(ApiError::Forbidden("not a party to this message".into()));
    }

    Ok(Json(MessageResponse {
        message: detail(row)?,
    }))
}

/// POST /messages — send a direct message. Sender is the authenticated
/// identity, never a field of the request body.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.body.trim().is_empty() {
        return Err(ApiError::Validation("message body must not be empty".into()));
    }

    let id = Uuid::new_v4();
    let sent_at = Utc::now();

    let from = claims.sub.clone();
    let to = req.to_username.clone();
    let body = req.body.clone();
    crate::blocking(move || {
        state
            .db
            .insert_message(&id.to_string(), &from, &to, &body, sent_at)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SentMessageResponse {
            message: SentMessage {
                id,
                from_username: claims.sub,
                to_username: req.to_username,
                body: req.body,
                sent_at,
                read_at: None,
            },
        }),
    ))
}

/// POST /messages/:id/read — only the recipient may mark a message read,
/// checked before the mutation runs.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReadReceiptResponse>, ApiError> {
    let st = state.clone();
    let row = crate::blocking(move || st.db.get_message(&id.to_string())).await?;

    if claims.sub != row.to_user.username {
        return Err(ApiError::Forbidden(
            "only the recipient may mark a message read".into(),
        ));
    }

    let read_at = crate::blocking(move || state.db.mark_read(&id.to_string(), Utc::now())).await?;

    Ok(Json(ReadReceiptResponse {
        message: ReadReceipt { id, read_at },
    }))
}

fn detail(row: MessageDetailRow) -> Result<MessageDetail, ApiError> {
    let id = row
        .id
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt message id {}: {e}", row.id)))?;

    Ok(MessageDetail {
        id,
        body: row.body,
        sent_at: row.sent_at,
        read_at: row.read_at,
        from_user: summary(row.from_user),
        to_user: summary(row.to_user),
    })
}

fn summary(row: PartyRow) -> UserSummary {
    UserSummary {
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone,
    }
}
