//! Output formatting for streamed documents
//!
//! This module provides:
//! - Compact JSON, one document per line
//! - Pretty-printed JSON with optional color highlighting

mod json;

pub use json::JsonFormatter;
