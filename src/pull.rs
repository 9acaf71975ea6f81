//! The pull operation: fetch a manifest and persist it in the chosen format
//!
//! This is the single decision point between the three on-disk formats.
//! Exactly one writer path runs per call; the unknown-format case fails
//! before any network or file I/O happens.

use crate::{
    config::PullConfig,
    distribution::Client,
    error::{Error, Result},
    image::{
        ref_name_annotations, resolve_single_image, write_docker_archive, write_legacy_archive,
        FetchedManifest, ManifestKind, OciLayoutDir,
    },
    ImageName, Name, RefKind, Tag,
};
use oci_spec::image::MediaType;
use std::{fmt, fs, path::Path, str::FromStr, time::Instant};

/// On-disk representation for a pulled image.
///
/// Selected explicitly by the caller, never inferred from the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `docker save` style tarball
    DockerArchive,
    /// Pre-1.10 docker tarball
    LegacyArchive,
    /// OCI image layout directory, appendable across pulls
    OciLayout,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v1-tarball" => Ok(Format::DockerArchive),
            "legacy-tarball" => Ok(Format::LegacyArchive),
            "v1-layout" => Ok(Format::OciLayout),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Format::DockerArchive => "v1-tarball",
            Format::LegacyArchive => "legacy-tarball",
            Format::OciLayout => "v1-layout",
        };
        write!(f, "{}", token)
    }
}

/// Repository and tag recorded in tarball metadata.
///
/// Derived once per pull and never persisted beyond it. Only the tarball
/// formats need one; the layout format records the original reference string
/// as an annotation instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTag {
    domain: String,
    port: Option<u16>,
    name: Name,
    tag: Tag,
}

impl ResolvedTag {
    /// Repository part, with the default registry elided as docker does.
    pub fn repository(&self) -> String {
        if self.domain == "docker.io" && self.port.is_none() {
            return self.name.to_string();
        }
        match self.port {
            Some(port) => format!("{}:{}/{}", self.domain, port, self.name),
            None => format!("{}/{}", self.domain, self.name),
        }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn repo_tag(&self) -> String {
        format!("{}:{}", self.repository(), self.tag)
    }
}

impl fmt::Display for ResolvedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repo_tag())
    }
}

/// Produce the tag recorded by tarball formats.
///
/// A tag reference is used unchanged. A digest reference gets the
/// placeholder tag from [PullConfig::digest_tag], since a tarball cannot
/// record a digest as its repo-tag. A reference matching neither grammar is
/// fatal.
pub fn resolve_tag(image: &ImageName, config: &PullConfig) -> Result<ResolvedTag> {
    let tag = match image.reference.kind()? {
        RefKind::Tag(tag) => tag,
        RefKind::Digest(_) => Tag::new(&config.digest_tag)?,
    };
    Ok(ResolvedTag {
        domain: image.domain.clone(),
        port: image.port,
        name: image.name.clone(),
        tag,
    })
}

/// Pull `image` from its registry and persist it at `path` in `format`.
///
/// `format` is one of `v1-tarball`, `legacy-tarball` or `v1-layout`. The
/// operation either fully succeeds or reports one error; nothing is retried
/// here, transport retries live in the registry client.
pub fn pull(image: &str, format: &str, path: &Path, config: &PullConfig) -> Result<()> {
    // Reject unknown formats before any parsing, network or file I/O
    let format = Format::from_str(format)?;
    let image_name = ImageName::parse(image)?;
    let mut client = Client::from_image_name(&image_name)?;

    let start = Instant::now();
    let fetched = FetchedManifest::fetch(&mut client, &image_name)?;
    log::debug!(
        "fetched root manifest of {} in {} ms",
        image_name,
        start.elapsed().as_millis()
    );
    if config.detail {
        log::info!("root manifest {} {} bytes", fetched.digest(), fetched.size());
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(fetched.raw()) {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    let start = Instant::now();
    match format {
        Format::DockerArchive => {
            let tag = resolve_tag(&image_name, config)?;
            let resolved =
                resolve_single_image(&mut client, &image_name, &fetched, config.platform.as_ref())?;
            if config.detail {
                log::info!(
                    "image manifest {} {} bytes",
                    resolved.digest,
                    resolved.raw.len()
                );
            }
            // The output file is created only after the image resolved
            let f = fs::File::create(path)?;
            write_docker_archive(f, &mut client, &resolved.manifest, &tag)?;
        }
        Format::LegacyArchive => {
            let tag = resolve_tag(&image_name, config)?;
            let resolved =
                resolve_single_image(&mut client, &image_name, &fetched, config.platform.as_ref())?;
            if config.detail {
                log::info!(
                    "image manifest {} {} bytes",
                    resolved.digest,
                    resolved.raw.len()
                );
            }
            // Passed by value; dropped and closed on every exit path
            let f = fs::File::create(path)?;
            write_legacy_archive(f, &mut client, &resolved.manifest, &tag)?;
        }
        Format::OciLayout => match fetched.classify() {
            ManifestKind::Index(index) => {
                let layout = OciLayoutDir::open_or_create(path)?;
                layout.append_index(
                    &mut client,
                    &index,
                    fetched.raw(),
                    entry_media_type(fetched.media_type(), MediaType::ImageIndex),
                    ref_name_annotations(image),
                )?;
            }
            ManifestKind::Image(manifest) => {
                let layout = OciLayoutDir::open_or_create(path)?;
                layout.append_image(
                    &mut client,
                    &manifest,
                    fetched.raw(),
                    entry_media_type(fetched.media_type(), MediaType::ImageManifest),
                    ref_name_annotations(image),
                )?;
            }
            // Classified before the layout is touched, so a bad manifest
            // cannot leave a half-initialized directory behind
            ManifestKind::Neither => {
                return Err(Error::NeitherImageNorIndex(image.to_string()))
            }
        },
    }
    log::debug!(
        "saved {} to {} in {} ms",
        image_name,
        path.display(),
        start.elapsed().as_millis()
    );
    Ok(())
}

/// Media type recorded on the layout entry: what the registry declared, or
/// the standard OCI type when it declared nothing.
fn entry_media_type(declared: &MediaType, default: MediaType) -> MediaType {
    match declared {
        MediaType::Other(ty) if ty.is_empty() => default,
        declared => declared.clone(),
    }
}
