//! JSON formatting for streamed documents
//!
//! Documents are rendered as relaxed extended JSON, so BSON types without
//! a JSON counterpart (ObjectId, dates, binary) keep their `$`-wrapped
//! form and can be parsed back by other MongoDB tools.

use std::io;

use bson::{Bson, Document};
use colored_json::prelude::*;

use crate::config::DisplayConfig;
use crate::error::Result;

/// JSON formatter with pretty printing support
pub struct JsonFormatter {
    /// Enable pretty printing
    pretty: bool,

    /// Indentation level
    indent: usize,

    /// Enable colored output
    use_colors: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    ///
    /// # Arguments
    /// * `pretty` - Enable pretty printing
    /// * `use_colors` - Enable colored output
    /// * `indent` - Spaces per indentation level
    pub fn new(pretty: bool, use_colors: bool, indent: usize) -> Self {
        Self {
            pretty,
            indent,
            use_colors,
        }
    }

    /// Create a formatter from display configuration
    pub fn from_config(config: &DisplayConfig) -> Self {
        Self::new(config.format.is_pretty(), config.color, 2)
    }

    /// Format a single document as a JSON object
    ///
    /// # Arguments
    /// * `doc` - Document to format
    ///
    /// # Returns
    /// * `Result<String>` - JSON object string
    pub fn format_document(&self, doc: &Document) -> Result<String> {
        let value = Bson::Document(doc.clone()).into_relaxed_extjson();

        let json_str = if self.pretty {
            self.to_pretty_string(&value)?
        } else {
            serde_json::to_string(&value).map_err(io::Error::from)?
        };

        // Compact output stays uncoloured for piping
        if self.use_colors && self.pretty {
            Ok(json_str.to_colored_json_auto().unwrap_or(json_str))
        } else {
            Ok(json_str)
        }
    }

    /// Serialize with a custom indentation width
    fn to_pretty_string(&self, value: &serde_json::Value) -> Result<String> {
        use serde::Serialize;

        let mut buf = Vec::new();
        let indent = " ".repeat(self.indent);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut ser).map_err(io::Error::from)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new(true, false, 2)
    }
}
