//! Error handling for the cursor.
//!
//! This module provides:
//! - The typed failures a cursor can surface (disposed, no current item,
//!   unsupported operation, cancellation, channel failures)
//! - Structured error information extracted from MongoDB driver errors
//!
//! # Example
//!
//! ```rust,no_run
//! use mongocursor::error::{CursorError, Result};
//!
//! fn classify(result: Result<bool>) {
//!     match result {
//!         Ok(true) => println!("document available"),
//!         Ok(false) => println!("cursor exhausted"),
//!         Err(CursorError::Cancelled) => println!("cancelled"),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{ChannelError, ConfigError, CursorError, Result};
pub use mongo::{ErrorInfo, extract_error_info, is_cursor_not_found};
