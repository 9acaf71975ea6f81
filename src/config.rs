use crate::error::{Error, Result};
use std::{fmt, str::FromStr};

/// Default tag recorded when a digest-addressed image is saved as a tarball.
pub const DEFAULT_DIGEST_TAG: &str = "i-was-a-digest";

/// Options for a single pull operation.
///
/// Passed explicitly into [crate::pull]; nothing here is global state.
#[derive(Debug, Clone)]
pub struct PullConfig {
    /// Tag substituted when the image is addressed by digest and the output
    /// format needs a tag. Tarballs cannot record a digest as their repo-tag.
    pub digest_tag: String,
    /// Platform to select out of a multi-platform index when saving to a
    /// tarball format. Tarballs hold a single image, so an index without a
    /// platform request is an error.
    pub platform: Option<PlatformRequest>,
    /// Log manifest digests, sizes and timings, and print the indented JSON
    /// rendering of the root manifest.
    pub detail: bool,
}

impl Default for PullConfig {
    fn default() -> Self {
        PullConfig {
            digest_tag: DEFAULT_DIGEST_TAG.to_string(),
            platform: None,
            detail: false,
        }
    }
}

/// Requested platform in docker notation, e.g. `linux/amd64`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRequest {
    pub os: String,
    pub architecture: String,
}

impl FromStr for PlatformRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((os, architecture)) if !os.is_empty() && !architecture.is_empty() => {
                Ok(PlatformRequest {
                    os: os.to_string(),
                    architecture: architecture.to_string(),
                })
            }
            _ => Err(Error::InvalidPlatform(s.to_string())),
        }
    }
}

impl fmt::Display for PlatformRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)
    }
}

impl PlatformRequest {
    /// Whether a manifest descriptor in an index targets this platform.
    pub fn matches(&self, platform: &oci_spec::image::Platform) -> bool {
        platform.os().to_string() == self.os
            && platform.architecture().to_string() == self.architecture
    }
}
