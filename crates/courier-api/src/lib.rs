pub mod auth;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod users;

use courier_db::StoreError;

use error::ApiError;

/// Run a store call off the async runtime. rusqlite is blocking, so every
/// handler goes through here rather than holding the connection lock on an
/// executor thread.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}
