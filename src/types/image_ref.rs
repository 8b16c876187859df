// ABOUTME: Container image reference parsing for build-and-push targets.
// ABOUTME: Handles repo, repo:tag and registry/org/repo:tag forms plus cache refs.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("image reference has an empty component: {0}")]
    EmptyComponent(String),
}

/// A pushable image reference. Digests are not accepted since we only ever push tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    repository: String,
    tag: String,
}

impl ImageRef {
    pub const DEFAULT_TAG: &'static str = "latest";

    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_'))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        // A colon after the last slash separates the tag; earlier colons belong to a
        // registry port.
        let last_slash = input.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (without_tag, tag) = match input[last_slash..].rfind(':') {
            Some(i) => (&input[..last_slash + i], &input[last_slash + i + 1..]),
            None => (input, Self::DEFAULT_TAG),
        };

        let (registry, repository) = match without_tag.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, without_tag.to_string()),
        };

        if tag.is_empty() || repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(ParseImageRefError::EmptyComponent(input.to_string()));
        }

        Ok(Self {
            registry,
            repository,
            tag: tag.to_string(),
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Same repository with a different tag.
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: tag.to_string(),
        }
    }

    /// Registry reference used as a build cache for this image.
    pub fn cache_ref(&self) -> Self {
        self.with_tag("buildcache")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{registry}/")?;
        }
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
