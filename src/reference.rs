use crate::{
    error::{Error, Result},
    Digest, Tag,
};
use std::fmt;

/// Tag-or-digest part of an image reference, kept as the user wrote it.
///
/// Whether the reference addresses the image by tag (`app:v1`) or by digest
/// (`app@sha256:...`) is not decided here. [Reference::kind] classifies the
/// suffix when a caller actually needs to know, so that formats which never
/// look at the tag (the image layout) do not reject unusual but fetchable
/// references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference(String);

/// A classified reference suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKind {
    Tag(Tag),
    Digest(Digest),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Reference {
    pub fn new(reference: &str) -> Result<Self> {
        if reference.is_empty() {
            return Err(Error::InvalidReference(reference.to_string()));
        }
        Ok(Reference(reference.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify into tag or digest.
    ///
    /// A digest always contains `:`, which is forbidden in tags, so the two
    /// grammars never overlap. A suffix matching neither grammar is fatal.
    pub fn kind(&self) -> Result<RefKind> {
        if self.0.contains(':') {
            match Digest::new(&self.0) {
                Ok(digest) => Ok(RefKind::Digest(digest)),
                Err(_) => Err(Error::UnresolvableReference(self.0.clone())),
            }
        } else {
            match Tag::new(&self.0) {
                Ok(tag) => Ok(RefKind::Tag(tag)),
                Err(_) => Err(Error::UnresolvableReference(self.0.clone())),
            }
        }
    }

    pub fn is_digest(&self) -> bool {
        matches!(self.kind(), Ok(RefKind::Digest(_)))
    }
}
