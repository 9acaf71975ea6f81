//! Materialize fetched images as tarballs or an OCI image layout

mod docker_archive;
mod layout;
mod legacy_archive;
mod remote;

pub use docker_archive::write_docker_archive;
pub use layout::OciLayoutDir;
pub use legacy_archive::write_legacy_archive;
pub use remote::{resolve_single_image, FetchedManifest, ManifestKind, ResolvedImage};

use crate::{
    distribution::Client,
    error::{Error, Result},
    Digest, Reference,
};
use std::collections::HashMap;

/// `org.opencontainers.image.ref.name` annotation key, recording the
/// reference an entry was pulled by.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Annotation set attached to a layout entry, carrying the original
/// reference string. Created fresh per operation.
pub fn ref_name_annotations(reference: &str) -> HashMap<String, String> {
    HashMap::from([(REF_NAME_ANNOTATION.to_string(), reference.to_string())])
}

/// Source of the manifests and blobs that make up an image.
///
/// Persistence writers pull content through this seam, so they work against
/// a live registry client or any in-memory store. Manifests get their own
/// method since registries serve them from a separate endpoint than blobs.
pub trait ImageSource {
    fn fetch_blob(&mut self, digest: &Digest) -> Result<Vec<u8>>;
    fn fetch_manifest(&mut self, digest: &Digest) -> Result<Vec<u8>>;
}

impl ImageSource for Client {
    fn fetch_blob(&mut self, digest: &Digest) -> Result<Vec<u8>> {
        self.get_blob(digest)
    }

    fn fetch_manifest(&mut self, digest: &Digest) -> Result<Vec<u8>> {
        let (raw, _media_type) = self.get_manifest(&Reference::new(&digest.to_string())?)?;
        Ok(raw)
    }
}

impl ImageSource for HashMap<Digest, Vec<u8>> {
    fn fetch_blob(&mut self, digest: &Digest) -> Result<Vec<u8>> {
        self.get(digest)
            .cloned()
            .ok_or_else(|| Error::MissingBlob(digest.clone()))
    }

    fn fetch_manifest(&mut self, digest: &Digest) -> Result<Vec<u8>> {
        self.fetch_blob(digest)
    }
}
