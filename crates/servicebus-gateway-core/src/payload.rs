//! Demo payload carried by the typed endpoints.

use serde::{Deserialize, Serialize};

/// Free text with a list of tags
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaggedText {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaggedText {
    pub fn new(text: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            text: text.into(),
            tags,
        }
    }
}
