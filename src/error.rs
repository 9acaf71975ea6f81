use crate::Digest;
use oci_spec::{distribution::ErrorResponse, OciSpecError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Invalid user input
    //
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
    #[error("Invalid name for repository: {0}")]
    InvalidName(String),
    #[error(transparent)]
    InvalidPort(#[from] std::num::ParseIntError),
    #[error("Invalid reference to image: {0}")]
    InvalidReference(String),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid platform, expected os/architecture: {0}")]
    InvalidPlatform(String),
    #[error("Reference is neither a tag nor a digest: {0}")]
    UnresolvableReference(String),
    #[error("Unknown format: {0}")]
    UnknownFormat(String),
    #[error("Not a directory, or not exist: {0}")]
    NotADirectory(PathBuf),

    //
    // Invalid container image
    //
    #[error("Not a single-platform image, select a platform to save it as a tarball: {0}")]
    NotASingleImage(String),
    #[error("Neither an image nor an index: {0}")]
    NeitherImageNorIndex(String),
    #[error("No manifest for platform {platform} in index of {image}")]
    NoMatchingPlatform { image: String, platform: String },
    #[error("Blob not found in image: {0}")]
    MissingBlob(Digest),
    #[error("Incompatible oci-layout version in {0}")]
    IncompatibleLayoutVersion(PathBuf),
    #[error(transparent)]
    InvalidJson(#[from] serde_json::error::Error),

    //
    // Error from OCI registry
    //
    #[error(transparent)]
    NetworkError(Box<ureq::Transport>),
    #[error(transparent)]
    RegistryError(#[from] ErrorResponse),
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(url::Url),
    #[error("Unsupported WWW-Authentication header: {0}")]
    UnSupportedAuthHeader(String),

    //
    // System error
    //
    #[error(transparent)]
    UnknownIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<OciSpecError> for Error {
    fn from(e: OciSpecError) -> Self {
        match e {
            OciSpecError::SerDe(e) => Error::InvalidJson(e),
            OciSpecError::Io(e) => Error::UnknownIo(e),
            OciSpecError::Builder(_) => unreachable!(),
            OciSpecError::Other(e) => panic!("Unknown error within oci_spec: {}", e),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(_status, res) => match res.into_json::<ErrorResponse>() {
                Ok(err) => Error::RegistryError(err),
                Err(e) => Error::UnknownIo(e),
            },
            ureq::Error::Transport(e) => Error::NetworkError(e.into()),
        }
    }
}
