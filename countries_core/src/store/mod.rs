//! Durable storage for country records and refresh metadata.

pub mod metadata;
pub mod sqlite;
pub mod traits;
