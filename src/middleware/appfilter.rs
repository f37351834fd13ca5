//! Query-string signature filter in front of every route.
//!
//! Runs before any handler, so a blocked request never reaches the auth handler
//! or the credential store.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::filter::{self, FilterVerdict};
use crate::state::AppState;

/// Apply the filter to `router`.
///
/// ```ignore
/// let app = api::routes(&config.app_handler_path);
/// let app = middleware::appfilter::apply(app, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, appfilter_middleware))
}

async fn appfilter_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // The raw query string, before any percent-decoding.
    let raw_args = req.uri().query();

    if let FilterVerdict::Blocked { signature } = filter::evaluate(raw_args, &state.filter) {
        tracing::warn!(
            signature = %signature,
            method = %req.method(),
            path = %req.uri().path(),
            "request blocked by appfilter"
        );
        return Err(AppError::Forbidden);
    }

    Ok(next.run(req).await)
}
