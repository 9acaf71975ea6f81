//! `docker save` style tarball, the "v1 tarball" format
//!
//! The archive carries the config blob, one file per layer blob, and a
//! `manifest.json` tying them to a repo-tag. `docker load` and compatible
//! tools follow `manifest.json`, so blob file names only need to be
//! consistent within the archive.

use crate::{error::*, image::ImageSource, pull::ResolvedTag, Digest};
use chrono::Utc;
use oci_spec::image::{Descriptor, ImageManifest, MediaType};
use serde::Serialize;
use std::io;

#[derive(Debug, Serialize)]
struct TarManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags")]
    repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

/// Serialize a single-platform image into a docker-archive tar stream.
///
/// Blobs are fetched through `blobs` as they are written; nothing is
/// buffered beyond one blob at a time. The writer is returned on success so
/// callers can flush or close it.
pub fn write_docker_archive<W: io::Write>(
    writer: W,
    blobs: &mut impl ImageSource,
    manifest: &ImageManifest,
    tag: &ResolvedTag,
) -> Result<W> {
    let mut ar = tar::Builder::new(writer);

    let config_digest = Digest::from_descriptor(manifest.config())?;
    let config_name = format!("{}.json", config_digest.encoded);
    let config = blobs.fetch_blob(&config_digest)?;
    append_file(&mut ar, &config_name, &config)?;

    let mut layer_names = Vec::new();
    for layer in manifest.layers() {
        let digest = Digest::from_descriptor(layer)?;
        let name = layer_file_name(layer, &digest);
        let blob = blobs.fetch_blob(&digest)?;
        append_file(&mut ar, &name, &blob)?;
        layer_names.push(name);
    }

    let entry = TarManifestEntry {
        config: config_name,
        repo_tags: vec![tag.repo_tag()],
        layers: layer_names,
    };
    let manifest_json = serde_json::to_vec(&[entry])?;
    append_file(&mut ar, "manifest.json", &manifest_json)?;

    Ok(ar.into_inner()?)
}

fn layer_file_name(layer: &Descriptor, digest: &Digest) -> String {
    match layer.media_type() {
        MediaType::ImageLayerGzip => format!("{}.tar.gz", digest.encoded),
        MediaType::Other(ty) if ty.ends_with("tar.gzip") => format!("{}.tar.gz", digest.encoded),
        _ => format!("{}.tar", digest.encoded),
    }
}

fn append_file<W: io::Write>(ar: &mut tar::Builder<W>, name: &str, buf: &[u8]) -> Result<()> {
    let mut header = create_file_header(buf.len());
    ar.append_data(&mut header, name, buf)?;
    Ok(())
}

pub(super) fn create_file_header(size: usize) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_size(size as u64);
    header.set_cksum();
    header.set_mode(0b110100100); // rw-r--r--
    header.set_mtime(Utc::now().timestamp() as u64);
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pull::resolve_tag, ImageName, PullConfig};
    use std::{collections::HashMap, io::Read};

    fn test_manifest(config: &[u8], layer: &[u8]) -> (ImageManifest, HashMap<Digest, Vec<u8>>) {
        let config_digest = Digest::from_buf_sha256(config);
        let layer_digest = Digest::from_buf_sha256(layer);
        let manifest = serde_json::from_value(serde_json::json!({
            "schemaVersion": 2,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config_digest.to_string(),
                "size": config.len()
            },
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": layer_digest.to_string(),
                "size": layer.len()
            }]
        }))
        .unwrap();
        let blobs = HashMap::from([
            (config_digest, config.to_vec()),
            (layer_digest, layer.to_vec()),
        ]);
        (manifest, blobs)
    }

    fn tar_entries(buf: &[u8]) -> HashMap<String, Vec<u8>> {
        let mut ar = tar::Archive::new(buf);
        let mut entries = HashMap::new();
        for entry in ar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            entries.insert(path, content);
        }
        entries
    }

    #[test]
    fn archive_layout() -> Result<()> {
        let (manifest, mut blobs) = test_manifest(b"{}", b"layer-bytes");
        let image = ImageName::parse("registry.example.com/app:v1")?;
        let tag = resolve_tag(&image, &PullConfig::default())?;

        let buf = write_docker_archive(Vec::new(), &mut blobs, &manifest, &tag)?;
        let entries = tar_entries(&buf);

        let manifest_json: serde_json::Value =
            serde_json::from_slice(&entries["manifest.json"]).unwrap();
        let entry = &manifest_json[0];
        assert_eq!(entry["RepoTags"], serde_json::json!(["registry.example.com/app:v1"]));

        let config_name = entry["Config"].as_str().unwrap();
        assert_eq!(entries[config_name], b"{}".to_vec());
        let layer_name = entry["Layers"][0].as_str().unwrap();
        assert!(layer_name.ends_with(".tar.gz"));
        assert_eq!(entries[layer_name], b"layer-bytes".to_vec());
        Ok(())
    }

    #[test]
    fn digest_reference_gets_placeholder_repo_tag() -> Result<()> {
        let (manifest, mut blobs) = test_manifest(b"{}", b"layer-bytes");
        let image = ImageName::parse(
            "registry.example.com/app@sha256:a1d6478a5d2b4e0fed536e1b80e2915a3183bfbeaf2bba2e029cfc10a5a967e8",
        )?;
        let tag = resolve_tag(&image, &PullConfig::default())?;

        let buf = write_docker_archive(Vec::new(), &mut blobs, &manifest, &tag)?;
        let entries = tar_entries(&buf);
        let manifest_json: serde_json::Value =
            serde_json::from_slice(&entries["manifest.json"]).unwrap();
        assert_eq!(
            manifest_json[0]["RepoTags"],
            serde_json::json!(["registry.example.com/app:i-was-a-digest"])
        );
        Ok(())
    }

    #[test]
    fn missing_blob_fails() -> Result<()> {
        let (manifest, _blobs) = test_manifest(b"{}", b"layer-bytes");
        let mut empty: HashMap<Digest, Vec<u8>> = HashMap::new();
        let image = ImageName::parse("registry.example.com/app:v1")?;
        let tag = resolve_tag(&image, &PullConfig::default())?;
        assert!(matches!(
            write_docker_archive(Vec::new(), &mut empty, &manifest, &tag),
            Err(Error::MissingBlob(_))
        ));
        Ok(())
    }
}
