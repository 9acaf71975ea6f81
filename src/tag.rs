use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;

/// Tag of a container image
///
/// In [OCI distribution spec](https://github.com/opencontainers/distribution-spec/blob/main/spec.md):
/// > `<reference>` as a tag MUST be at most 128 characters
/// > in length and MUST match the following regular expression:
/// > ```text
/// > [a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}
/// > ```
/// This struct checks this restriction at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

lazy_static::lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").unwrap();
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Tag {
    pub fn new(tag: &str) -> Result<Self> {
        if TAG_RE.is_match(tag) {
            Ok(Tag(tag.to_string()))
        } else {
            Err(Error::InvalidReference(tag.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag() {
        assert_eq!(Tag::new("latest").unwrap().as_str(), "latest");
        assert_eq!(Tag::new("20.04").unwrap().as_str(), "20.04");
        // @ is not allowed
        assert!(Tag::new("my_super_tag@2").is_err());
        // : is not allowed
        assert!(Tag::new("sha256:abcd").is_err());
    }
}
