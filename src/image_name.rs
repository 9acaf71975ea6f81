use crate::{error::Result, Name, Reference};
use std::fmt;
use url::Url;

/// Parsed image reference, e.g. `ghcr.io/owner/app:v1` or
/// `registry.example.com/app@sha256:...`
///
/// Immutable once parsed. The reference part is either a tag or a digest,
/// never both; see [Reference].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName {
    pub domain: String,
    pub port: Option<u16>,
    pub name: Name,
    pub reference: Reference,
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.domain)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        let separator = if self.reference.is_digest() { '@' } else { ':' };
        write!(f, "/{}{}{}", self.name, separator, self.reference)
    }
}

impl ImageName {
    pub fn parse(name: &str) -> Result<Self> {
        let (name, digest) = match name.split_once('@') {
            Some((name, digest)) => (name, Some(digest)),
            None => (name, None),
        };
        let (domain, name) = name.split_once('/').unwrap_or(("docker.io", name));
        let (domain, port) = if let Some((domain, port)) = domain.split_once(':') {
            (domain, Some(str::parse(port)?))
        } else {
            (domain, None)
        };
        let (name, reference) = if let Some(digest) = digest {
            (name, digest)
        } else {
            name.split_once(':').unwrap_or((name, "latest"))
        };
        Ok(ImageName {
            domain: domain.to_string(),
            port,
            name: Name::new(name)?,
            reference: Reference::new(reference)?,
        })
    }

    pub fn url(&self) -> String {
        let domain = if let Some(port) = self.port {
            format!("{}:{}", self.domain, port)
        } else {
            self.domain.clone()
        };
        if self.domain.starts_with("localhost") {
            format!("http://{}", domain)
        } else {
            format!("https://{}", domain)
        }
    }

    pub fn registry_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.url())?)
    }
}
