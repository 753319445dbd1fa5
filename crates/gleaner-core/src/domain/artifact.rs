//! Resolved artifacts handed to the blob store.

use serde::{Deserialize, Serialize};

/// A usable artifact produced by a resolver: a transcript, extracted text,
/// or similar. Handed to the blob store collaborator on success; the
/// pipeline keeps only the returned [`crate::StorageRef`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// MIME type of the body (e.g. "text/plain", "text/vtt").
    pub content_type: String,

    /// The extracted content itself.
    pub body: String,

    /// URL the artifact was actually fetched from, when it differs from
    /// the candidate's origin (mirrors, canonical pages).
    pub resolved_from: Option<String>,
}

impl Artifact {
    /// Creates a plain-text artifact.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/plain".to_string(),
            body: body.into(),
            resolved_from: None,
        }
    }

    /// Creates an artifact with an explicit content type.
    pub fn with_content_type(content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
            resolved_from: None,
        }
    }

    /// Sets the URL the artifact was resolved from.
    #[must_use]
    pub fn resolved_from(mut self, url: impl Into<String>) -> Self {
        self.resolved_from = Some(url.into());
        self
    }

    /// Whitespace-delimited word count of the body.
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_artifact() {
        let artifact = Artifact::text("hello transcript world");
        assert_eq!(artifact.content_type, "text/plain");
        assert_eq!(artifact.word_count(), 3);
    }

    #[test]
    fn test_resolved_from() {
        let artifact = Artifact::with_content_type("text/vtt", "WEBVTT")
            .resolved_from("https://mirror.example.com/ep1.vtt");
        assert!(artifact.resolved_from.is_some());
    }
}
