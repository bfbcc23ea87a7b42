//! Structured error types for the patra compositor.
//!
//! One unified enum covers the real failure sources: record decoding,
//! template resolution and loading, photo validation, and render internals.
//! Font-embed fallback is deliberately *not* here — it degrades with a log
//! line, never an error.

use thiserror::Error;

/// The unified error type returned by all public patra API functions.
#[derive(Debug, Error)]
pub enum PatraError {
    /// The record payload failed to decode as JSON.
    #[error("failed to parse record: {source}\n  hint: {hint}")]
    RecordParse {
        source: serde_json::Error,
        hint: String,
    },

    /// A caller-supplied layout description failed to decode.
    #[error("failed to parse layout: {0}")]
    LayoutParse(#[source] serde_json::Error),

    /// The requested template name is not registered.
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    /// A photo failed validation before any render work started.
    #[error("unsupported photo: {0}")]
    UnsupportedPhoto(String),

    /// Template bytes were unavailable or undecodable.
    #[error("template '{name}' could not be loaded: {reason}")]
    TemplateLoadFailed { name: String, reason: String },

    /// A photo was present but undecodable at embed time. Composition
    /// catches this and completes text-only; it only surfaces from the
    /// photo pipeline API itself.
    #[error("photo could not be embedded: {0}")]
    PhotoEmbedFailed(String),

    /// A render backend failed internally.
    #[error("render failed: {0}")]
    Render(String),
}

impl PatraError {
    /// Wrap a serde_json error with a hint about what likely went wrong.
    pub fn record_parse(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "check for trailing commas, missing quotes, or an un-decoded URL parameter".to_string()
            }
            serde_json::error::Category::Data => {
                "the JSON is valid but doesn't match the record shape; check field names and types"
                    .to_string()
            }
            serde_json::error::Category::Eof => {
                "unexpected end of input — is the payload truncated?".to_string()
            }
            serde_json::error::Category::Io => "the input could not be read".to_string(),
        };
        PatraError::RecordParse { source: e, hint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_carries_hint() {
        let err = serde_json::from_str::<serde_json::Value>("{\"a\":").unwrap_err();
        let wrapped = PatraError::record_parse(err);
        let msg = wrapped.to_string();
        assert!(msg.contains("hint:"));
    }

    #[test]
    fn test_unknown_template_message() {
        let err = PatraError::UnknownTemplate("visiting-card".to_string());
        assert_eq!(err.to_string(), "unknown template 'visiting-card'");
    }
}
