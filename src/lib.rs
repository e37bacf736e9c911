//! Prefetching MongoDB cursor
//!
//! A forward-only cursor over a server-side result set that fetches the
//! next batch in the background while the current one is consumed.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing
//! - `config`: Configuration management
//! - `connection`: Channel seam, wire commands and the driver-backed provider
//! - `cursor`: The cursor, prefetch coordination, policies and materializers
//! - `error`: Error types and handling
//! - `formatter`: Output formatting
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mongocursor::connection::{CollectionNamespace, FindRequest, MongoChannelProvider};
//! use mongocursor::cursor::{BsonMaterializer, Cursor, CursorOptions, CursorSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = mongodb::Client::with_uri_str("mongodb://localhost:27017").await?;
//!     let provider = Arc::new(MongoChannelProvider::start(&client, "shop").await?);
//!     let namespace = CollectionNamespace::new("shop", "orders");
//!
//!     let reply = provider
//!         .find(&FindRequest {
//!             namespace: namespace.clone(),
//!             filter: Default::default(),
//!             batch_size: Some(100),
//!             limit: None,
//!             comment: None,
//!         })
//!         .await?;
//!
//!     let spec = CursorSpec::from_reply(reply, namespace);
//!     let mut cursor = Cursor::new(spec, provider, BsonMaterializer, CursorOptions::default())?;
//!     while cursor.advance().await? {
//!         println!("{}", cursor.current()?);
//!     }
//!     cursor.dispose().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod formatter;

// Re-export commonly used types
pub use config::Config;
pub use connection::{ChannelProvider, MongoChannelProvider};
pub use cursor::{Cursor, CursorOptions, CursorSpec, DocumentCursor};
pub use error::{CursorError, Result};
pub use formatter::JsonFormatter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
