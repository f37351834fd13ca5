/*
 * Responsibility
 * - GET/POST/HEAD on the authentication path
 * - RequestMeta + body stream -> AuthService -> welcome page / 403 / 500
 * - HEAD answers with headers only and does not authenticate
 */
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::services::auth::AuthVerdict;
use crate::services::params::RequestMeta;
use crate::state::AppState;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

pub async fn app(State(state): State<AppState>, req: Request<Body>) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();

    if parts.method == Method::HEAD {
        return Ok((StatusCode::OK, [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)]).into_response());
    }

    let meta = RequestMeta::from_parts(&parts);

    match state.auth.authenticate(&meta, body.into_data_stream()).await {
        AuthVerdict::Granted { name } => Ok(welcome(&name)),
        AuthVerdict::Denied => Err(AppError::Forbidden),
        AuthVerdict::SystemError(kind) => {
            tracing::error!(kind = %kind, "authentication aborted");
            Err(kind.into())
        }
    }
}

fn welcome(name: &str) -> Response {
    let body = format!("<p>Welcome, {}</p>\n\n", escape_html(name));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

// Display names come from the database; escape before embedding them in markup.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
