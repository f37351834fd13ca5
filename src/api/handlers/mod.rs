pub mod app;
pub mod health;
