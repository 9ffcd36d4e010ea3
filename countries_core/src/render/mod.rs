//! Summary artifact: a PNG with the top countries by estimated GDP.
//!
//! Rendering is a best-effort side effect of a committed refresh; callers log
//! failures and move on.

pub mod png;
mod text;
pub mod traits;
