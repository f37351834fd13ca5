/*
 * Responsibility
 * - shared context attached to the Router (AppState)
 * - Clone-cheap: everything inside is behind Arc
 * - FilterConfig is read-only after startup; no locking
 */
use std::sync::Arc;

use crate::services::{auth::AuthService, filter::FilterConfig};

#[derive(Clone, Debug)]
pub struct AppState {
    pub filter: Arc<FilterConfig>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(filter: Arc<FilterConfig>, auth: Arc<AuthService>) -> Self {
        Self { filter, auth }
    }
}
