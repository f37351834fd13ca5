//! In-process credential store.
//!
//! Used by the test suites and for running the service without a database.
//! Rows are fixed at construction; a failure mode can be injected to exercise
//! the error paths of `AuthService`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::repos::credential_store::{CredentialLookup, CredentialStore, DisplayNameRow};
use crate::repos::error::{RepoError, RepoResult};
use crate::services::digest::digest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub login: String,
    // sha256 hex, same format as users.password
    pub password_hash: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFailure {
    // acquire() fails
    Unavailable,
    // acquire() succeeds, every lookup fails
    QueryFails,
    // acquire() succeeds, no connection is free when the lookup runs
    Exhausted,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore {
    users: Arc<Vec<UserRecord>>,
    failure: Option<MemoryFailure>,
    lookups: Arc<AtomicUsize>,
}

impl MemoryCredentialStore {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            users: Arc::new(users),
            failure: None,
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a user, hashing `password` the same way the service does.
    pub fn with_user(self, login: &str, password: &str, name: &str) -> Self {
        let mut users = self.users.as_ref().clone();
        users.push(UserRecord {
            login: login.to_string(),
            password_hash: digest(password).to_string(),
            name: Some(name.to_string()),
        });
        Self {
            users: Arc::new(users),
            ..self
        }
    }

    pub fn failing(self, failure: MemoryFailure) -> Self {
        Self {
            failure: Some(failure),
            ..self
        }
    }

    /// Number of lookups issued against this store (clones share the counter).
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn acquire(&self) -> RepoResult<Box<dyn CredentialLookup>> {
        if self.failure == Some(MemoryFailure::Unavailable) {
            return Err(RepoError::Unavailable(sqlx::Error::PoolTimedOut));
        }

        Ok(Box::new(MemoryLookup {
            users: Arc::clone(&self.users),
            failure: self.failure,
            lookups: Arc::clone(&self.lookups),
        }))
    }
}

struct MemoryLookup {
    users: Arc<Vec<UserRecord>>,
    failure: Option<MemoryFailure>,
    lookups: Arc<AtomicUsize>,
}

#[async_trait]
impl CredentialLookup for MemoryLookup {
    async fn lookup_display_names(
        &mut self,
        login: &str,
        password_hash: &str,
    ) -> RepoResult<Vec<DisplayNameRow>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        match self.failure {
            Some(MemoryFailure::QueryFails) => {
                return Err(RepoError::Db(sqlx::Error::Protocol(
                    "memory store configured to fail".to_string(),
                )));
            }
            Some(MemoryFailure::Exhausted) => {
                return Err(RepoError::Unavailable(sqlx::Error::PoolTimedOut));
            }
            _ => {}
        }

        Ok(self
            .users
            .iter()
            .filter(|u| u.login == login && u.password_hash == password_hash)
            .map(|u| DisplayNameRow {
                name: u.name.clone(),
            })
            .collect())
    }
}
