//! Resource providers and the shared resource cache
//!
//! Resources are addressed as `<scheme>://<path>`. Each scheme is served by one or
//! more [`ResourceProvider`]s registered with the [`ResourceCache`], which decodes raw
//! bytes into typed [`Resource`]s and keeps them alive while anything references them.

pub mod cache;
pub mod mesh;
pub mod provider;
pub mod texture;

use std::any::Any;

use thiserror::Error;

pub use cache::ResourceCache;
pub use mesh::{MeshData, MeshLoader, PrimitiveMeshLoader};
pub use provider::{FilesystemProvider, InternetProvider, ResourceProvider};
pub use texture::TextureResource;

/// Resource loading errors
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Identifier is not of the form `<scheme>://<path>`
    #[error("Invalid resource identifier: {0}")]
    InvalidIdentifier(String),

    /// No registered provider has the resource
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Reading from disk failed
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// A network request failed
    #[error("Network error: {0}")]
    Network(String),

    /// Bytes could not be decoded into the requested resource
    #[error("Decode error: {0}")]
    Decode(String),

    /// No mesh loader is registered under the name
    #[error("No mesh loader named {0}")]
    NoLoader(String),
}

/// A parsed `<scheme>://<path>` identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceId<'a> {
    /// Provider scheme such as `file` or `https`
    pub scheme: &'a str,
    /// Provider-specific path
    pub path: &'a str,
}

impl<'a> ResourceId<'a> {
    /// Separator between scheme and path
    pub const SEPARATOR: &'static str = "://";

    /// Split an identifier at the first `://`
    pub fn parse(identifier: &'a str) -> Result<Self, ResourceError> {
        match identifier.split_once(Self::SEPARATOR) {
            Some((scheme, path)) if !scheme.is_empty() => Ok(Self { scheme, path }),
            _ => Err(ResourceError::InvalidIdentifier(identifier.to_string())),
        }
    }

    /// Split an identifier, logging an error instead of returning it
    pub fn split(identifier: &'a str) -> Option<Self> {
        match Self::parse(identifier) {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("{e}");
                None
            }
        }
    }
}

impl std::fmt::Display for ResourceId<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.scheme, Self::SEPARATOR, self.path)
    }
}

/// A value that can be built from the raw bytes of a resource
pub trait Resource: Any {
    /// Decode `bytes` into `self`
    fn compile(&mut self, bytes: Vec<u8>) -> Result<(), ResourceError>;
}

/// Undecoded resource bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryResource {
    /// Raw contents
    pub data: Vec<u8>,
}

impl Resource for BinaryResource {
    fn compile(&mut self, bytes: Vec<u8>) -> Result<(), ResourceError> {
        self.data = bytes;
        Ok(())
    }
}

/// UTF-8 text resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextResource {
    /// Decoded text
    pub text: String,
}

impl Resource for TextResource {
    fn compile(&mut self, bytes: Vec<u8>) -> Result<(), ResourceError> {
        self.text = String::from_utf8(bytes).map_err(|e| ResourceError::Decode(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_splits_at_first_separator() {
        let id = ResourceId::parse("https://example.com/a://b").unwrap();
        assert_eq!(id.scheme, "https");
        assert_eq!(id.path, "example.com/a://b");
        assert_eq!(id.to_string(), "https://example.com/a://b");
    }

    #[test]
    fn test_identifier_without_scheme_is_rejected() {
        assert!(ResourceId::split("textures/ui/icon.png").is_none());
        assert!(ResourceId::parse("://missing").is_err());
    }

    #[test]
    fn test_text_resource_rejects_invalid_utf8() {
        let mut text = TextResource::default();
        assert!(text.compile(vec![0xff, 0xfe]).is_err());
        text.compile(b"hello".to_vec()).unwrap();
        assert_eq!(text.text, "hello");
    }
}
