use std::fmt;
use std::sync::Arc;

use futures_util::Stream;
use tracing::{debug, info, warn};

use crate::repos::credential_store::CredentialStore;
use crate::repos::error::RepoError;
use crate::services::digest::digest;
use crate::services::params::{self, ExtractLimits, ParameterMap, RequestMeta};

pub const USER_PARAM: &str = "user";
pub const PASS_PARAM: &str = "pass";

/// Terminal outcome of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
    Granted { name: String },
    Denied,
    SystemError(SystemErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemErrorKind {
    StoreUnavailable,
    BadRequest,
    StoreQueryFailed,
}

impl fmt::Display for SystemErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemErrorKind::StoreUnavailable => write!(f, "credential store unavailable"),
            SystemErrorKind::BadRequest => write!(f, "malformed request parameters"),
            SystemErrorKind::StoreQueryFailed => write!(f, "credential lookup failed"),
        }
    }
}

/// Login and password as sent by the client.
///
/// `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Missing parameters become empty strings.
    pub fn from_params(params: &ParameterMap) -> Self {
        let get = |key: &str| params.get(key).cloned().unwrap_or_default();
        Self {
            user: get(USER_PARAM),
            password: get(PASS_PARAM),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Service that verifies `user`/`pass` request parameters against the
/// credential store.
///
/// - The store is injected at construction (no process-wide handle).
/// - No retries: a store failure is reported as `SystemError` right away.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    limits: ExtractLimits,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("store", &self.store.backend_name())
            .field("limits", &self.limits)
            .finish()
    }
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, limits: ExtractLimits) -> Self {
        Self { store, limits }
    }

    pub async fn authenticate<S, B, E>(&self, meta: &RequestMeta, body: S) -> AuthVerdict
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        // 1) store handle
        let mut handle = match self.store.acquire().await {
            Ok(h) => h,
            Err(e) => {
                warn!(backend = self.store.backend_name(), error = %e, "credential store unavailable");
                return AuthVerdict::SystemError(SystemErrorKind::StoreUnavailable);
            }
        };

        // 2) parameters
        let params = match params::extract(meta, body, self.limits).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to extract request parameters");
                return AuthVerdict::SystemError(SystemErrorKind::BadRequest);
            }
        };

        // 3) + 4)
        let credentials = Credentials::from_params(&params);
        let password_hash = digest(&credentials.password);
        info!(user = %credentials.user, "authenticating");

        // 5) + 6) bound lookup
        let rows = match handle
            .lookup_display_names(&credentials.user, password_hash.as_str())
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                let kind = match e {
                    RepoError::Unavailable(_) => SystemErrorKind::StoreUnavailable,
                    RepoError::Db(_) => SystemErrorKind::StoreQueryFailed,
                };
                warn!(user = %credentials.user, error = %e, "credential lookup failed");
                return AuthVerdict::SystemError(kind);
            }
        };

        debug!(user = %credentials.user, rows = rows.len(), "credential lookup finished");

        // 7) + 8) the last row wins, as rows are read in order
        match rows.into_iter().last().and_then(|row| row.name) {
            Some(name) if !name.is_empty() => {
                info!(user = %credentials.user, name = %name, "access granted");
                AuthVerdict::Granted { name }
            }
            _ => {
                warn!(user = %credentials.user, "name not found");
                AuthVerdict::Denied
            }
        }
    }
}
