//! OCI image layout directory with append semantics
//!
//! A layout is a blob store plus an `index.json` listing the manifests it
//! holds. Unlike a tarball, a layout can accumulate entries: repeated pulls
//! into the same path each append one descriptor to the index.

use crate::{
    error::{Error, Result},
    image::ImageSource,
    Digest,
};
use oci_spec::image::{
    Descriptor, DescriptorBuilder, ImageIndex, ImageIndexBuilder, ImageManifest, MediaType,
    SCHEMA_VERSION,
};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

const OCI_LAYOUT_FILE: &str = "oci-layout";
const INDEX_FILE: &str = "index.json";
const LAYOUT_VERSION: &str = "1.0.0";

#[derive(Debug, Deserialize)]
struct LayoutMarker {
    #[serde(rename = "imageLayoutVersion")]
    image_layout_version: String,
}

/// Handle of an [OCI Image Layout](https://github.com/opencontainers/image-spec/blob/v1.1.0/image-layout.md) directory
pub struct OciLayoutDir {
    root: PathBuf,
}

impl OciLayoutDir {
    /// Open the layout at `root`, initializing an empty one if the path does
    /// not hold a layout yet.
    ///
    /// Initialization writes the `oci-layout` marker and an index with no
    /// manifests, so a fresh directory and a previously used one behave the
    /// same for appending.
    pub fn open_or_create(root: &Path) -> Result<Self> {
        if root.exists() && !root.is_dir() {
            return Err(Error::NotADirectory(root.to_owned()));
        }
        let layout = Self {
            root: root.to_owned(),
        };
        let marker = root.join(OCI_LAYOUT_FILE);
        if marker.is_file() {
            let marker: LayoutMarker = serde_json::from_slice(&fs::read(&marker)?)?;
            if marker.image_layout_version != LAYOUT_VERSION {
                return Err(Error::IncompatibleLayoutVersion(root.to_owned()));
            }
            return Ok(layout);
        }
        fs::create_dir_all(root)?;
        fs::write(
            root.join(OCI_LAYOUT_FILE),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )?;
        let index = ImageIndexBuilder::default()
            .schema_version(SCHEMA_VERSION)
            .manifests(Vec::new())
            .build()?;
        layout.write_index(&index)?;
        Ok(layout)
    }

    /// Append a single image with its config and layer blobs, recording
    /// `annotations` on the index entry.
    pub fn append_image(
        &self,
        source: &mut impl ImageSource,
        manifest: &ImageManifest,
        raw_manifest: &[u8],
        media_type: MediaType,
        annotations: HashMap<String, String>,
    ) -> Result<()> {
        self.write_image_blobs(source, manifest)?;
        let (digest, size) = self.add_blob(raw_manifest)?;
        self.append_descriptor(descriptor(media_type, &digest, size, annotations)?)
    }

    /// Append a multi-platform index, recording `annotations` on the index
    /// entry. Every manifest tree the index references is written into the
    /// blob store first; the entry appears in `index.json` only after all of
    /// its content is durable.
    pub fn append_index(
        &self,
        source: &mut impl ImageSource,
        index: &ImageIndex,
        raw_index: &[u8],
        media_type: MediaType,
        annotations: HashMap<String, String>,
    ) -> Result<()> {
        for child in index.manifests() {
            self.write_manifest_tree(source, &Digest::from_descriptor(child)?)?;
        }
        let (digest, size) = self.add_blob(raw_index)?;
        self.append_descriptor(descriptor(media_type, &digest, size, annotations)?)
    }

    /// Store a blob by content address. Re-adding identical content
    /// overwrites the same path, so blob writes are idempotent.
    pub fn add_blob(&self, data: &[u8]) -> Result<(Digest, i64)> {
        let digest = Digest::from_buf_sha256(data);
        let out = self.root.join(digest.as_path());
        fs::create_dir_all(out.parent().expect("blob path always has a parent"))?;
        fs::write(out, data)?;
        Ok((digest, data.len() as i64))
    }

    /// Append one descriptor to `index.json`, keeping existing entries.
    pub fn append_descriptor(&self, descriptor: Descriptor) -> Result<()> {
        let index = self.read_index()?;
        let mut manifests = index.manifests().clone();
        manifests.push(descriptor);
        let index = ImageIndexBuilder::default()
            .schema_version(SCHEMA_VERSION)
            .manifests(manifests)
            .build()?;
        self.write_index(&index)
    }

    pub fn read_index(&self) -> Result<ImageIndex> {
        let index_json = fs::read_to_string(self.root.join(INDEX_FILE))?;
        Ok(serde_json::from_str(&index_json)?)
    }

    fn write_index(&self, index: &ImageIndex) -> Result<()> {
        // Replace via rename so readers never see a half-written index
        let tmp = self.root.join(format!("{}.tmp", INDEX_FILE));
        fs::write(&tmp, serde_json::to_vec(index)?)?;
        fs::rename(tmp, self.root.join(INDEX_FILE))?;
        Ok(())
    }

    /// Write a manifest and everything below it into the blob store, without
    /// touching `index.json`. Nested indexes recurse.
    fn write_manifest_tree<S: ImageSource>(&self, source: &mut S, digest: &Digest) -> Result<()> {
        let raw = source.fetch_manifest(digest)?;
        if let Ok(index) = serde_json::from_slice::<ImageIndex>(&raw) {
            for child in index.manifests() {
                self.write_manifest_tree(source, &Digest::from_descriptor(child)?)?;
            }
        } else if let Ok(manifest) = serde_json::from_slice::<ImageManifest>(&raw) {
            self.write_image_blobs(source, &manifest)?;
        } else {
            return Err(Error::NeitherImageNorIndex(digest.to_string()));
        }
        self.add_blob(&raw)?;
        Ok(())
    }

    fn write_image_blobs(
        &self,
        source: &mut impl ImageSource,
        manifest: &ImageManifest,
    ) -> Result<()> {
        let config = source.fetch_blob(&Digest::from_descriptor(manifest.config())?)?;
        self.add_blob(&config)?;
        for layer in manifest.layers() {
            let blob = source.fetch_blob(&Digest::from_descriptor(layer)?)?;
            self.add_blob(&blob)?;
        }
        Ok(())
    }
}

fn descriptor(
    media_type: MediaType,
    digest: &Digest,
    size: i64,
    annotations: HashMap<String, String>,
) -> Result<Descriptor> {
    Ok(DescriptorBuilder::default()
        .media_type(media_type)
        .digest(digest.to_string())
        .size(size)
        .annotations(annotations)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ref_name_annotations, REF_NAME_ANNOTATION};

    fn test_image(layer_content: &[u8]) -> (ImageManifest, Vec<u8>, HashMap<Digest, Vec<u8>>) {
        let config = b"{}".to_vec();
        let config_digest = Digest::from_buf_sha256(&config);
        let layer_digest = Digest::from_buf_sha256(layer_content);
        let raw_manifest = serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config_digest.to_string(),
                "size": config.len()
            },
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": layer_digest.to_string(),
                "size": layer_content.len()
            }]
        }))
        .unwrap();
        let manifest = serde_json::from_slice(&raw_manifest).unwrap();
        let blobs = HashMap::from([
            (config_digest, config),
            (layer_digest, layer_content.to_vec()),
        ]);
        (manifest, raw_manifest, blobs)
    }

    #[test]
    fn open_initializes_empty_layout() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let root = tmp_dir.path().join("layout");
        let layout = OciLayoutDir::open_or_create(&root)?;
        assert!(root.join("oci-layout").is_file());
        assert!(layout.read_index()?.manifests().is_empty());

        // Reopening is a no-op
        let layout = OciLayoutDir::open_or_create(&root)?;
        assert!(layout.read_index()?.manifests().is_empty());
        Ok(())
    }

    #[test]
    fn open_rejects_non_directory() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let file = tmp_dir.path().join("file");
        fs::write(&file, b"not a layout")?;
        assert!(matches!(
            OciLayoutDir::open_or_create(&file),
            Err(Error::NotADirectory(_))
        ));
        Ok(())
    }

    #[test]
    fn append_image_writes_blobs_and_annotated_entry() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let layout = OciLayoutDir::open_or_create(tmp_dir.path())?;
        let (manifest, raw_manifest, mut blobs) = test_image(b"layer-a");

        layout.append_image(
            &mut blobs,
            &manifest,
            &raw_manifest,
            MediaType::ImageManifest,
            ref_name_annotations("registry.example.com/app:v1"),
        )?;

        let index = layout.read_index()?;
        assert_eq!(index.manifests().len(), 1);
        let entry = &index.manifests()[0];
        assert_eq!(
            entry.annotations().as_ref().unwrap()[REF_NAME_ANNOTATION],
            "registry.example.com/app:v1"
        );

        // All blobs present under their content address
        let manifest_digest = Digest::from_buf_sha256(&raw_manifest);
        assert!(tmp_dir.path().join(manifest_digest.as_path()).is_file());
        for digest in blobs.keys() {
            assert!(tmp_dir.path().join(digest.as_path()).is_file());
        }
        Ok(())
    }

    #[test]
    fn repeated_appends_accumulate_entries() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let layout = OciLayoutDir::open_or_create(tmp_dir.path())?;

        let (manifest_a, raw_a, mut blobs_a) = test_image(b"layer-a");
        layout.append_image(
            &mut blobs_a,
            &manifest_a,
            &raw_a,
            MediaType::ImageManifest,
            ref_name_annotations("registry.example.com/app:v1"),
        )?;

        let (manifest_b, raw_b, mut blobs_b) = test_image(b"layer-b");
        layout.append_image(
            &mut blobs_b,
            &manifest_b,
            &raw_b,
            MediaType::ImageManifest,
            ref_name_annotations("registry.example.com/app:v2"),
        )?;

        let index = layout.read_index()?;
        assert_eq!(index.manifests().len(), 2);
        let refs: Vec<_> = index
            .manifests()
            .iter()
            .map(|entry| {
                entry.annotations().as_ref().unwrap()[REF_NAME_ANNOTATION].clone()
            })
            .collect();
        assert_eq!(
            refs,
            vec![
                "registry.example.com/app:v1".to_string(),
                "registry.example.com/app:v2".to_string()
            ]
        );
        Ok(())
    }

    #[test]
    fn append_index_writes_child_manifests() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let layout = OciLayoutDir::open_or_create(tmp_dir.path())?;

        let (_manifest, raw_manifest, mut store) = test_image(b"layer-a");
        let child_digest = Digest::from_buf_sha256(&raw_manifest);
        store.insert(child_digest.clone(), raw_manifest.clone());

        let raw_index = serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": child_digest.to_string(),
                "size": raw_manifest.len(),
                "platform": { "architecture": "amd64", "os": "linux" }
            }]
        }))
        .unwrap();
        let index: ImageIndex = serde_json::from_slice(&raw_index).unwrap();

        layout.append_index(
            &mut store,
            &index,
            &raw_index,
            MediaType::ImageIndex,
            ref_name_annotations("registry.example.com/app:v1"),
        )?;

        let top = layout.read_index()?;
        assert_eq!(top.manifests().len(), 1);
        assert_eq!(top.manifests()[0].media_type(), &MediaType::ImageIndex);
        // Child manifest and the index itself are in the blob store
        assert!(tmp_dir.path().join(child_digest.as_path()).is_file());
        let index_digest = Digest::from_buf_sha256(&raw_index);
        assert!(tmp_dir.path().join(index_digest.as_path()).is_file());
        Ok(())
    }

    #[test]
    fn failed_append_leaves_index_unmodified() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let layout = OciLayoutDir::open_or_create(tmp_dir.path())?;

        let (manifest_a, raw_a, mut blobs_a) = test_image(b"layer-a");
        layout.append_image(
            &mut blobs_a,
            &manifest_a,
            &raw_a,
            MediaType::ImageManifest,
            ref_name_annotations("registry.example.com/app:v1"),
        )?;

        // Index whose child is neither an image nor an index
        let garbage = b"garbage".to_vec();
        let garbage_digest = Digest::from_buf_sha256(&garbage);
        let mut store = HashMap::from([(garbage_digest.clone(), garbage.clone())]);
        let raw_index = serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": garbage_digest.to_string(),
                "size": garbage.len()
            }]
        }))
        .unwrap();
        let index: ImageIndex = serde_json::from_slice(&raw_index).unwrap();

        let result = layout.append_index(
            &mut store,
            &index,
            &raw_index,
            MediaType::ImageIndex,
            ref_name_annotations("registry.example.com/bad:v1"),
        );
        assert!(matches!(result, Err(Error::NeitherImageNorIndex(_))));

        // The earlier entry is untouched
        let top = layout.read_index()?;
        assert_eq!(top.manifests().len(), 1);
        Ok(())
    }
}
