//! External sources: the country catalog and the exchange-rate table.
//!
//! Each source is a small trait so HTTP implementations can be swapped for
//! in-process stubs; `ExternalSourceClient` fetches both concurrently under a
//! per-source timeout and fails fast if either is unavailable.

pub mod client;
pub mod http;
pub mod traits;
