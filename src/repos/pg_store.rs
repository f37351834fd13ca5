/*
 * Responsibility
 * - credential lookup against the users table (PostgreSQL / SQLx)
 * - acquire() only hands out a pool handle; a connection is checked out for the
 *   query itself, never while the request body is still arriving
 * - login / hash are always bound ($1, $2)
 */
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;

use crate::repos::credential_store::{CredentialLookup, CredentialStore, DisplayNameRow};
use crate::repos::error::{RepoError, RepoResult};

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn acquire(&self) -> RepoResult<Box<dyn CredentialLookup>> {
        if self.pool.is_closed() {
            error!("database pool is closed");
            return Err(RepoError::Unavailable(sqlx::Error::PoolClosed));
        }

        Ok(Box::new(PgCredentialLookup {
            pool: self.pool.clone(),
        }))
    }
}

struct PgCredentialLookup {
    pool: PgPool,
}

#[async_trait]
impl CredentialLookup for PgCredentialLookup {
    async fn lookup_display_names(
        &mut self,
        login: &str,
        password_hash: &str,
    ) -> RepoResult<Vec<DisplayNameRow>> {
        let rows = sqlx::query_as::<_, DisplayNameRow>(
            r#"
            SELECT name
            FROM users
            WHERE login = $1 AND password = $2
            "#,
        )
        .bind(login)
        .bind(password_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            // Statement text only; bound values stay out of the log.
            error!(error = %e, "credential lookup query failed");
            classify(e)
        })?;

        Ok(rows)
    }
}

// No connection to run the query on is "unavailable", anything else is a query failure.
fn classify(e: sqlx::Error) -> RepoError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => RepoError::Unavailable(e),
        other => RepoError::Db(other),
    }
}
