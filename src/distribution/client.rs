use crate::{distribution::*, error::*, Digest, ImageName, Name, Reference};
use oci_spec::image::{MediaType, ToDockerV2S2};
use std::{convert::TryFrom, io::Read};
use url::Url;

/// A client for pulling from the `/v2/<name>/` API endpoint
pub struct Client {
    agent: ureq::Agent,
    /// URL to registry server
    url: Url,
    /// Name of repository
    name: Name,
    /// Loaded authentication info from filesystem
    auth: StoredAuth,
    /// Cached token
    token: Option<String>,
}

impl Client {
    pub fn new(url: Url, name: Name) -> Result<Self> {
        let auth = StoredAuth::load_all()?;
        Ok(Client {
            agent: ureq::Agent::new(),
            url,
            name,
            auth,
            token: None,
        })
    }

    pub fn from_image_name(image: &ImageName) -> Result<Self> {
        Self::new(image.registry_url()?, image.name.clone())
    }

    pub fn add_basic_auth(&mut self, domain: &str, username: &str, password: &str) {
        self.auth.add(domain, username, password);
    }

    fn call(&mut self, req: ureq::Request) -> Result<ureq::Response> {
        if self.token.is_none() {
            // Try without token, and get one on a 401 challenge
            let try_req = req.clone();
            let challenge = match try_req.call() {
                Ok(res) => return Ok(res),
                Err(e) => AuthChallenge::try_from(e)?,
            };
            self.token = Some(self.auth.challenge(&challenge)?);
        }
        let token = self.token.as_ref().expect("Token is set just above");
        Ok(req
            .set("Authorization", &format!("Bearer {}", token))
            .call()?)
    }

    fn get(&self, url: &Url) -> ureq::Request {
        log::info!("GET {}", url);
        self.agent.get(url.as_str())
    }

    /// Get the raw manifest bytes for given reference, which may name either
    /// a single image or an index.
    ///
    /// ```text
    /// GET /v2/<name>/manifests/<reference>
    /// ```
    ///
    /// Returns the bytes exactly as served, with the media type declared in
    /// `Content-Type`, so that the content digest stays verifiable.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-manifests) for detail.
    pub fn get_manifest(&mut self, reference: &Reference) -> Result<(Vec<u8>, MediaType)> {
        let url = self
            .url
            .join(&format!("/v2/{}/manifests/{}", self.name, reference))?;
        let accept = format!(
            "{}, {}, {}, {}",
            MediaType::ImageIndex,
            MediaType::ImageManifest,
            MediaType::ImageIndex
                .to_docker_v2s2()
                .expect("Never fails since ImageIndex is supported"),
            MediaType::ImageManifest
                .to_docker_v2s2()
                .expect("Never fails since ImageManifest is supported"),
        );
        let res = self.call(self.get(&url).set("Accept", &accept))?;
        let media_type = res
            .header("Content-Type")
            .map(MediaType::from)
            .unwrap_or(MediaType::Other(String::new()));
        let mut bytes = Vec::new();
        res.into_reader().read_to_end(&mut bytes)?;
        Ok((bytes, media_type))
    }

    /// Get blob for given digest
    ///
    /// ```text
    /// GET /v2/<name>/blobs/<digest>
    /// ```
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-blobs) for detail.
    pub fn get_blob(&mut self, digest: &Digest) -> Result<Vec<u8>> {
        let url = self
            .url
            .join(&format!("/v2/{}/blobs/{}", self.name.as_str(), digest))?;
        let res = self.call(self.get(&url))?;
        let mut bytes = Vec::new();
        res.into_reader().read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    //
    // Following tests need a registry server on localhost:5000.
    // These tests are ignored by default.
    //

    fn test_url() -> Url {
        Url::parse("http://localhost:5000").unwrap()
    }
    fn test_name() -> Name {
        Name::new("test_repo").unwrap()
    }

    #[test]
    #[ignore]
    fn get_root_manifest() -> Result<()> {
        let mut client = Client::new(test_url(), test_name())?;
        let (raw, media_type) = client.get_manifest(&Reference::new("tag1")?)?;
        assert!(!raw.is_empty());
        dbg!(media_type);
        Ok(())
    }

    #[test]
    #[ignore]
    fn get_blobs() -> Result<()> {
        let mut client = Client::new(test_url(), test_name())?;
        let (raw, _media_type) = client.get_manifest(&Reference::new("tag1")?)?;
        let manifest = oci_spec::image::ImageManifest::from_reader(raw.as_slice())?;
        for layer in manifest.layers() {
            let buf = client.get_blob(&Digest::new(layer.digest())?)?;
            dbg!(buf.len());
        }
        Ok(())
    }
}
