//! HTTP authentication gate.
//!
//! Two stages sit in front of the application: a signature filter over the raw
//! query string, then an authentication handler that checks `user`/`pass`
//! request parameters against a credential store.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod repos;
pub mod services;
pub mod state;
