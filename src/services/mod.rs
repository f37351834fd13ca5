pub mod auth;
pub mod digest;
pub mod filter;
pub mod params;
