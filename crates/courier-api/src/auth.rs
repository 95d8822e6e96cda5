use std::sync::Arc;

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use courier_db::Database;
use courier_types::api::{Claims, LoginRequest, RegisterRequest, TokenResponse};

use crate::error::ApiError;
use crate::extract::Json;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    hasher: Argon2<'static>,
}

impl AppStateInner {
    /// `hash_cost` is the argon2 time cost (iteration count); memory and
    /// parallelism stay at the RFC 9106 recommended values.
    pub fn new(
        db: Database,
        jwt_secret: String,
        hash_cost: u32,
        token_ttl_hours: i64,
    ) -> anyhow::Result<Self> {
        let params = Params::new(Params::DEFAULT_M_COST, hash_cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        Ok(Self {
            db,
            jwt_secret,
            token_ttl: Duration::hours(token_ttl_hours),
            hasher,
        })
    }
}

/// POST /register — create the user and log them in, in one step.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::Validation(
            "username must be 3 to 32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    // Hash and insert off the async runtime. The row we get back carries
    // the hash; it stays in this scope and is never serialized.
    let st = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let hash = st
            .hasher
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?
            .to_string();

        st.db
            .create_user(
                &req.username,
                &hash,
                &req.first_name,
                &req.last_name,
                &req.phone,
                Utc::now(),
            )
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {e}")))??;

    info!(username = %user.username, "registered new user");

    let token = issue_token(&state.jwt_secret, &user.username, state.token_ttl)?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// POST /login — verify the credential, bump `last_login_at`, issue a
/// token. Unknown username and wrong password are indistinguishable to the
/// client.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let username = req.username.clone();
    let ok = tokio::task::spawn_blocking(move || authenticate(&st, &username, &req.password))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {e}")))??;

    if !ok {
        return Err(ApiError::Unauthorized);
    }

    let st = state.clone();
    let username = req.username.clone();
    crate::blocking(move || st.db.touch_last_login(&username, Utc::now())).await?;

    let token = issue_token(&state.jwt_secret, &req.username, state.token_ttl)?;
    Ok(Json(TokenResponse { token }))
}

/// Is this username/password pair valid? False for unknown username or hash
/// mismatch. Unknown usernames short-circuit without running the verifier;
/// registration already discloses username existence via its conflict
/// response, so the timing difference adds no new signal.
fn authenticate(state: &AppStateInner, username: &str, password: &str) -> Result<bool, ApiError> {
    let Some(stored) = state.db.get_password_hash(username)? else {
        return Ok(false);
    };

    let parsed = PasswordHash::new(&stored)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash is malformed: {e}")))?;

    Ok(state
        .hasher
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Sign a bearer token binding `username`, with a mandatory expiry.
pub fn issue_token(secret: &str, username: &str, ttl: Duration) -> Result<String, ApiError> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("token signing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn issued_token_verifies_and_carries_username() {
        let token = issue_token("test-secret", "alice", Duration::hours(1)).unwrap();

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();

        assert_eq!(data.claims.sub, "alice");
        assert!(data.claims.exp > Utc::now().timestamp() as usize);
    }

    #[test]
    fn token_signed_with_other_secret_rejected() {
        let token = issue_token("secret-a", "alice", Duration::hours(1)).unwrap();

        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret-b"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let token = issue_token("test-secret", "alice", Duration::hours(-2)).unwrap();

        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }
}
