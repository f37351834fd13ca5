pub mod credential_store;
pub mod error;
pub mod memory_store;
pub mod pg_store;
