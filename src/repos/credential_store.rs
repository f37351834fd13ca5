/*
 * Responsibility
 * - contract between AuthService and whatever holds login/password/name rows
 * - acquire() hands out a per-request handle, the lookup runs on that handle
 * - implementations must bind login and hash as parameters, never splice them into SQL
 */
use async_trait::async_trait;

use crate::repos::error::RepoResult;

/// One row of `SELECT name FROM users WHERE login = $1 AND password = $2`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DisplayNameRow {
    pub name: Option<String>,
}

impl DisplayNameRow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// A source of credential lookups.
///
/// Shared process-wide behind `Arc<dyn CredentialStore>`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    // Returns the backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Obtain a handle for one request.
    //
    // Returns:
    // - `Err(RepoError::Unavailable)` when no handle can be obtained
    async fn acquire(&self) -> RepoResult<Box<dyn CredentialLookup>>;
}

/// A per-request handle on the store.
#[async_trait]
pub trait CredentialLookup: Send {
    // Rows whose login equals `login` and whose stored hash equals `password_hash`.
    async fn lookup_display_names(
        &mut self,
        login: &str,
        password_hash: &str,
    ) -> RepoResult<Vec<DisplayNameRow>>;
}
