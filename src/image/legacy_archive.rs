//! Legacy (pre-1.10 docker) image tarball
//!
//! One directory per layer holding `VERSION`, a v1 compatibility `json` and
//! an uncompressed `layer.tar`, plus a top-level `repositories` file mapping
//! repository and tag to the topmost layer id. Layer ids do not exist in the
//! OCI model, so they are synthesized as a deterministic hash chain over the
//! layer digests.

use crate::{
    error::*,
    image::{docker_archive::create_file_header, ImageSource},
    pull::ResolvedTag,
    Digest,
};
use oci_spec::image::{Descriptor, ImageManifest, MediaType};
use serde_json::{json, Map, Value};
use std::io::{self, Read};

/// Serialize a single-platform image into a legacy tarball.
///
/// The writer is taken by value and returned on success; on failure it is
/// dropped, so a file handle passed in is closed on every exit path.
pub fn write_legacy_archive<W: io::Write>(
    writer: W,
    blobs: &mut impl ImageSource,
    manifest: &ImageManifest,
    tag: &ResolvedTag,
) -> Result<W> {
    let mut ar = tar::Builder::new(writer);

    let config_digest = Digest::from_descriptor(manifest.config())?;
    let config: Value = serde_json::from_slice(&blobs.fetch_blob(&config_digest)?)?;
    let created = config
        .get("created")
        .and_then(Value::as_str)
        .unwrap_or("1970-01-01T00:00:00Z")
        .to_string();

    let mut parent: Option<String> = None;
    let mut top_id = String::new();
    let layer_count = manifest.layers().len();
    for (i, layer) in manifest.layers().iter().enumerate() {
        let id = layer_id(parent.as_deref(), layer);
        let blob = blobs.fetch_blob(&Digest::from_descriptor(layer)?)?;
        let layer_tar = decompress_layer(layer, blob)?;

        let compat = if i + 1 == layer_count {
            top_layer_json(&config, &id, parent.as_deref())?
        } else {
            layer_json(&id, parent.as_deref(), &created)
        };

        append_file(&mut ar, &format!("{}/VERSION", id), b"1.0")?;
        append_file(&mut ar, &format!("{}/json", id), &serde_json::to_vec(&compat)?)?;
        append_file(&mut ar, &format!("{}/layer.tar", id), &layer_tar)?;

        top_id = id.clone();
        parent = Some(id);
    }

    let repositories = json!({ tag.repository(): { tag.tag().as_str(): top_id } });
    append_file(&mut ar, "repositories", &serde_json::to_vec(&repositories)?)?;

    Ok(ar.into_inner()?)
}

/// Deterministic id chain: each layer id hashes its parent id and its own
/// content digest, so the same image always produces the same ids.
fn layer_id(parent: Option<&str>, layer: &Descriptor) -> String {
    let seed = format!("{}\n{}", parent.unwrap_or(""), layer.digest());
    Digest::from_buf_sha256(seed.as_bytes()).encoded
}

fn decompress_layer(layer: &Descriptor, blob: Vec<u8>) -> Result<Vec<u8>> {
    let gzipped = match layer.media_type() {
        MediaType::ImageLayerGzip => true,
        MediaType::Other(ty) => ty.ends_with("tar.gzip"),
        _ => false,
    };
    if !gzipped {
        return Ok(blob);
    }
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(blob.as_slice()).read_to_end(&mut out)?;
    Ok(out)
}

fn layer_json(id: &str, parent: Option<&str>, created: &str) -> Value {
    let mut compat = Map::new();
    compat.insert("id".to_string(), json!(id));
    if let Some(parent) = parent {
        compat.insert("parent".to_string(), json!(parent));
    }
    compat.insert("created".to_string(), json!(created));
    compat.insert("container_config".to_string(), json!({}));
    Value::Object(compat)
}

/// The top layer carries the image config, minus the fields the legacy
/// format does not know about.
fn top_layer_json(config: &Value, id: &str, parent: Option<&str>) -> Result<Value> {
    let mut compat = match config {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    compat.remove("history");
    compat.remove("rootfs");
    compat.insert("id".to_string(), json!(id));
    if let Some(parent) = parent {
        compat.insert("parent".to_string(), json!(parent));
    }
    Ok(Value::Object(compat))
}

fn append_file<W: io::Write>(ar: &mut tar::Builder<W>, name: &str, buf: &[u8]) -> Result<()> {
    let mut header = create_file_header(buf.len());
    ar.append_data(&mut header, name, buf)?;
    Ok(())
}
