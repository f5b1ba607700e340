//! Per-request output options.
//!
//! Clients send their options as JSON in the `X-Options` header: a single
//! object or an array of objects, one per requested output.

mod error;
mod parse;

pub use error::OptionsError;
pub use parse::{parse_options, OPTIONS_HEADER};
