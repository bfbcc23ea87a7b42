//! # Record Model
//!
//! The data subject being rendered onto a template. Records arrive as JSON
//! from an upstream collaborator (a URL query parameter, a fetch-by-id call,
//! a file on disk) and are consumed read-only: the compositor never mutates
//! a record and never keeps one after a render returns.
//!
//! Everything except `userId` is optional. The address is the one loose
//! field: depending on which upstream produced the record it is either a
//! structured object or an already-flattened string, so it deserializes
//! through an untagged enum and is normalized by the formatter.

use serde::{Deserialize, Serialize};

use crate::error::PatraError;

/// A member/donor record ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable identifier, required for card rendering.
    pub user_id: String,

    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub father_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    /// Role code, resolved to a localized title by the formatter.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub email: Option<String>,

    /// Structured object or flat string; both normalize to one line.
    #[serde(default)]
    pub address: Option<AddressInput>,

    /// Displayed verbatim if present.
    #[serde(default)]
    pub aadhar_card: Option<String>,
    #[serde(default)]
    pub pancard: Option<String>,

    /// Remote path or a `data:image/...;base64,` URI from a local upload.
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// An address as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressInput {
    /// Already a single formatted line.
    Flat(String),
    /// Structured parts, joined by the formatter.
    Structured(StructuredAddress),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAddress {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Record {
    /// A minimal record with only the required identity field set.
    pub fn new(user_id: &str) -> Self {
        Record {
            user_id: user_id.to_string(),
            name: None,
            father_name: None,
            age: None,
            role: None,
            gender: None,
            contact: None,
            email: None,
            address: None,
            aadhar_card: None,
            pancard: None,
            photo_url: None,
        }
    }

    /// Decode a record from a JSON payload.
    pub fn from_json(payload: &str) -> Result<Self, PatraError> {
        serde_json::from_str(payload).map_err(PatraError::record_parse)
    }
}
