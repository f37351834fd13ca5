/**
 * Responsibility
 * - what the credential store reports upwards
 * - acquisition failures and query failures stay distinguishable
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("credential store unavailable")]
    Unavailable(#[source] sqlx::Error),
    #[error("db error")]
    Db(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;
