use crate::{
    config::PlatformRequest,
    distribution::Client,
    error::{Error, Result},
    image::ImageSource,
    Digest, ImageName,
};
use oci_spec::image::{ImageIndex, ImageManifest, MediaType};

/// Raw manifest bytes fetched from a registry, before their shape is known.
///
/// The reference may legitimately resolve to either a single image manifest
/// or a multi-platform index; [FetchedManifest::classify] decides which.
pub struct FetchedManifest {
    raw: Vec<u8>,
    media_type: MediaType,
    digest: Digest,
}

/// Outcome of interpreting raw manifest bytes, index attempted first.
pub enum ManifestKind {
    Index(ImageIndex),
    Image(ImageManifest),
    Neither,
}

impl FetchedManifest {
    /// Fetch the manifest the reference points at, which becomes the root of
    /// whatever gets persisted.
    pub fn fetch(client: &mut Client, image: &ImageName) -> Result<Self> {
        let (raw, media_type) = client.get_manifest(&image.reference)?;
        let digest = Digest::from_buf_sha256(&raw);
        Ok(FetchedManifest {
            raw,
            media_type,
            digest,
        })
    }

    /// Wrap manifest bytes obtained elsewhere, e.g. read back from disk.
    pub fn from_raw(raw: Vec<u8>, media_type: MediaType) -> Self {
        let digest = Digest::from_buf_sha256(&raw);
        FetchedManifest {
            raw,
            media_type,
            digest,
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Content digest of the raw bytes as served by the registry.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Interpret the bytes as an index first, falling back to a single image.
    ///
    /// The two shapes cannot be confused: an index requires `manifests`,
    /// an image manifest requires `config` and `layers`.
    pub fn classify(&self) -> ManifestKind {
        if let Ok(index) = serde_json::from_slice::<ImageIndex>(&self.raw) {
            return ManifestKind::Index(index);
        }
        if let Ok(manifest) = serde_json::from_slice::<ImageManifest>(&self.raw) {
            return ManifestKind::Image(manifest);
        }
        ManifestKind::Neither
    }
}

/// Single image manifest resolved out of a fetched root manifest.
pub struct ResolvedImage {
    pub manifest: ImageManifest,
    pub raw: Vec<u8>,
    pub digest: Digest,
}

/// Resolve the fetched manifest to exactly one image manifest, as required
/// by the tarball formats.
///
/// A root that is already a single image is used as-is. An index needs a
/// platform request to pick one of its children; without one it is an error,
/// since a tarball holds a single image.
pub fn resolve_single_image(
    source: &mut impl ImageSource,
    image: &ImageName,
    fetched: &FetchedManifest,
    platform: Option<&PlatformRequest>,
) -> Result<ResolvedImage> {
    match fetched.classify() {
        ManifestKind::Image(manifest) => Ok(ResolvedImage {
            manifest,
            raw: fetched.raw.clone(),
            digest: fetched.digest.clone(),
        }),
        ManifestKind::Index(index) => {
            let platform = match platform {
                Some(platform) => platform,
                None => return Err(Error::NotASingleImage(image.to_string())),
            };
            let descriptor = index
                .manifests()
                .iter()
                .find(|descriptor| {
                    descriptor
                        .platform()
                        .as_ref()
                        .map(|p| platform.matches(p))
                        .unwrap_or(false)
                })
                .ok_or_else(|| Error::NoMatchingPlatform {
                    image: image.to_string(),
                    platform: platform.to_string(),
                })?;
            let digest = Digest::from_descriptor(descriptor)?;
            let raw = source.fetch_manifest(&digest)?;
            let manifest = serde_json::from_slice(&raw)?;
            Ok(ResolvedImage {
                manifest,
                raw,
                digest,
            })
        }
        ManifestKind::Neither => Err(Error::NeitherImageNorIndex(image.to_string())),
    }
}
