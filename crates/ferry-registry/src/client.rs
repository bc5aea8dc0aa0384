//! OCI Distribution API client.
//!
//! [`RegistryClient`] implements [`Transport`] against a single registry
//! host. Manifests and configs it fetches are checked against the digest
//! they were requested by. Layers are never fetched up front: images carry a
//! `RemoteBlobs` source and `write_image` streams each layer from it into
//! the destination, skipping blobs the destination already holds and layers
//! registries do not distribute.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::{
    descriptor, media_types, Artifact, BlobSource, BlobStream, Descriptor, DescriptorEx, Digest,
    Image, ImageIndex, MediaType, MediaTypeEx, Reference, Registry, Repository, Target,
};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LINK, LOCATION,
};
use reqwest::{Body, Response};
use serde::Deserialize;
use url::Url;

use crate::config::{RegistryAuth, RegistryConfig};
use crate::error::RegistryError;
use crate::transport::Transport;

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Response body of `GET /v2/<name>/tags/list`.
#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// The few manifest fields needed to tell images and indexes apart.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestKind {
    #[serde(default)]
    media_type: Option<MediaType>,
    #[serde(default)]
    manifests: Option<serde_json::Value>,
}

/// Client for an OCI-compatible registry.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    base: String,
    registry: Registry,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Creates a new registry client with the given configuration.
    ///
    /// Any path component of the configured URL is ignored; repository
    /// prefixes are part of the references passed to the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the CA certificate cannot be
    /// loaded, or the HTTP client cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ferry_registry::{RegistryClient, RegistryConfig};
    ///
    /// let client = RegistryClient::new(RegistryConfig::new("http://localhost:5000"))?;
    /// assert_eq!(client.registry().host(), "localhost:5000");
    /// # Ok::<(), ferry_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let url = Url::parse(&config.url).map_err(|_| RegistryError::InvalidUrl {
            url: config.url.clone(),
        })?;
        let host = url.host_str().ok_or_else(|| RegistryError::InvalidUrl {
            url: config.url.clone(),
        })?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let base = format!("{}://{authority}", url.scheme());
        let http = Self::build_http_client(&config)?;

        Ok(Self {
            config,
            base,
            registry: Registry::new(authority),
            http,
        })
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the registry address references to this client should use.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    fn manifest_url(&self, reference: &Reference) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.base,
            reference.repository().name(),
            reference.target()
        )
    }

    fn blob_url(&self, repository: &Repository, digest: &Digest) -> String {
        format!("{}/v2/{}/blobs/{digest}", self.base, repository.name())
    }

    /// Resolves `location` (absolute, or relative to the registry root).
    fn resolve(&self, location: &str) -> Result<Url, RegistryError> {
        Url::parse(&self.base)
            .and_then(|base| base.join(location))
            .map_err(|_| RegistryError::InvalidUrl {
                url: location.to_string(),
            })
    }

    fn accept_header() -> String {
        media_types::manifest_types()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Fetches manifest bytes and the media type they declare.
    async fn fetch_manifest(&self, reference: &Reference) -> Result<(Bytes, MediaType), RegistryError> {
        let response = self
            .http
            .get(self.manifest_url(reference))
            .headers(self.auth_headers()?)
            .header(ACCEPT, Self::accept_header())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, &reference.to_string()).await);
        }

        let content_type = header_media_type(response.headers());
        let raw = response.bytes().await?;

        if let Target::Digest(expected) = reference.target() {
            verify(reference, expected, &raw)?;
        }

        let media_type = detect_media_type(&raw, content_type).map_err(|source| {
            RegistryError::InvalidContent {
                reference: reference.to_string(),
                source,
            }
        })?;
        tracing::debug!(%reference, %media_type, size = raw.len(), "Fetched manifest");
        Ok((raw, media_type))
    }

    /// Fetches a whole blob and checks it against its digest.
    async fn fetch_blob(&self, repository: &Repository, digest: &Digest) -> Result<Bytes, RegistryError> {
        let response = self.get_blob(repository, digest).await?;
        let data = response.bytes().await?;
        verify(&repository.digest(digest.clone()), digest, &data)?;
        Ok(data)
    }

    /// Opens a blob as a stream of chunks.
    async fn open_blob(&self, repository: &Repository, digest: &Digest) -> Result<BlobStream, RegistryError> {
        let response = self.get_blob(repository, digest).await?;
        Ok(response.bytes_stream().map_err(std::io::Error::other).boxed())
    }

    async fn get_blob(&self, repository: &Repository, digest: &Digest) -> Result<Response, RegistryError> {
        let response = self
            .http
            .get(self.blob_url(repository, digest))
            .headers(self.auth_headers()?)
            .send()
            .await?;

        if !response.status().is_success() {
            let reference = repository.digest(digest.clone());
            return Err(Self::status_error(response, &reference.to_string()).await);
        }
        Ok(response)
    }

    /// Returns true if the registry already holds the blob.
    async fn blob_exists(&self, repository: &Repository, digest: &Digest) -> Result<bool, RegistryError> {
        let response = self
            .http
            .head(self.blob_url(repository, digest))
            .headers(self.auth_headers()?)
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    /// Uploads a blob with a monolithic `POST` then `PUT ?digest=`. The
    /// registry checks the digest of what it receives.
    async fn upload_blob(
        &self,
        repository: &Repository,
        digest: &Digest,
        size: u64,
        body: Body,
    ) -> Result<(), RegistryError> {
        // Start upload session
        let start_url = format!("{}/v2/{}/blobs/uploads/", self.base, repository.name());
        let response = self
            .http
            .post(&start_url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RegistryError::UploadFailed {
                message: format!("Failed to start upload to {repository}: {}", response.status()),
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::UploadFailed {
                message: "No upload location returned".to_string(),
            })?;

        let mut upload_url = self.resolve(location)?;
        upload_url
            .query_pairs_mut()
            .append_pair("digest", &digest.to_string());

        let response = self
            .http
            .put(upload_url)
            .headers(self.auth_headers()?)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RegistryError::UploadFailed {
                message: format!(
                    "Failed to upload blob {digest} to {repository}: {}",
                    response.status()
                ),
            });
        }

        tracing::debug!(repository = %repository, digest = %digest, size, "Uploaded blob");
        Ok(())
    }

    /// Pushes manifest bytes under `reference` with their own content type.
    async fn put_manifest(
        &self,
        reference: &Reference,
        media_type: &MediaType,
        raw: &Bytes,
    ) -> Result<(), RegistryError> {
        let response = self
            .http
            .put(self.manifest_url(reference))
            .headers(self.auth_headers()?)
            .header(CONTENT_TYPE, media_type.to_string())
            .body(raw.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RegistryError::ManifestPushFailed {
                reference: reference.to_string(),
                message: format!("{status}: {}", response.text().await.unwrap_or_default()),
            });
        }

        tracing::debug!(%reference, %media_type, "Pushed manifest");
        Ok(())
    }

    /// Builds the HTTP client with proper configuration.
    fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        if let Some(ref tls) = config.tls {
            if tls.insecure_skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                    path: ca_cert.clone(),
                    source: e,
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::InvalidCertificate {
                        message: format!("{}: {e}", ca_cert.display()),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        builder.build().map_err(|e| RegistryError::ConnectionFailed {
            url: config.url.clone(),
            source: e,
        })
    }

    /// Creates authentication headers based on configuration.
    fn auth_headers(&self) -> Result<HeaderMap, RegistryError> {
        let mut headers = HeaderMap::new();

        match &self.config.auth {
            RegistryAuth::None => {}
            RegistryAuth::Basic { username, password } => {
                let credentials = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{username}:{password}"),
                );
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Basic {credentials}")).map_err(|_| {
                        RegistryError::AuthenticationFailed {
                            message: "Invalid credentials".to_string(),
                        }
                    })?,
                );
            }
            RegistryAuth::Bearer { token } => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                        RegistryError::AuthenticationFailed {
                            message: "Invalid token".to_string(),
                        }
                    })?,
                );
            }
        }

        Ok(headers)
    }

    async fn status_error(response: Response, reference: &str) -> RegistryError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        RegistryError::from_status(status, reference, body)
    }
}

#[async_trait]
impl Transport for RegistryClient {
    async fn list_tags(&self, repository: &Repository) -> Result<Vec<String>, RegistryError> {
        let mut url = self.resolve(&format!("/v2/{}/tags/list", repository.name()))?;
        let mut tags = Vec::new();

        loop {
            let response = self
                .http
                .get(url)
                .headers(self.auth_headers()?)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(Self::status_error(response, &repository.to_string()).await);
            }

            let next = next_page(response.headers());
            let page: TagList = response.json().await?;
            tags.extend(page.tags.unwrap_or_default());

            match next {
                Some(link) => url = self.resolve(&link)?,
                None => break,
            }
        }

        tracing::debug!(repository = %repository, count = tags.len(), "Listed tags");
        Ok(tags)
    }

    async fn fetch_descriptor(&self, reference: &Reference) -> Result<Descriptor, RegistryError> {
        let response = self
            .http
            .head(self.manifest_url(reference))
            .headers(self.auth_headers()?)
            .header(ACCEPT, Self::accept_header())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, &reference.to_string()).await);
        }

        let headers = response.headers();
        let digest = headers
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Digest::parse(v).ok());
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let media_type = header_media_type(headers).filter(|m| m.is_index() || m.is_image());

        let invalid = |source: ferry_core::Error| RegistryError::InvalidContent {
            reference: reference.to_string(),
            source,
        };
        if let (Some(digest), Some(size), Some(media_type)) = (digest, size, media_type) {
            return descriptor(media_type, &digest, size).map_err(invalid);
        }

        // Some registries omit headers on HEAD; fall back to the body.
        tracing::debug!(%reference, "HEAD lacked descriptor headers, fetching manifest");
        let (raw, media_type) = self.fetch_manifest(reference).await?;
        descriptor(media_type, &Digest::sha256(&raw), raw.len() as u64).map_err(invalid)
    }

    async fn fetch_image(&self, reference: &Reference) -> Result<Image, RegistryError> {
        let (raw, media_type) = self.fetch_manifest(reference).await?;
        if media_type.is_index() {
            return Err(RegistryError::UnexpectedMediaType {
                reference: reference.to_string(),
                media_type: media_type.to_string(),
            });
        }

        let invalid = |source: ferry_core::Error| RegistryError::InvalidContent {
            reference: reference.to_string(),
            source,
        };
        let manifest = Image::parse_manifest(&raw).map_err(invalid)?;
        let repository = reference.repository();

        let config_digest = manifest.config().content_digest().map_err(invalid)?;
        let config = self.fetch_blob(repository, &config_digest).await?;
        let layers = RemoteBlobs {
            client: self.clone(),
            repository: repository.clone(),
        };

        Image::from_raw(raw, Some(media_type), config, Arc::new(layers)).map_err(invalid)
    }

    async fn fetch_index(&self, reference: &Reference) -> Result<ImageIndex, RegistryError> {
        let (raw, media_type) = self.fetch_manifest(reference).await?;
        if !media_type.is_index() {
            return Err(RegistryError::UnexpectedMediaType {
                reference: reference.to_string(),
                media_type: media_type.to_string(),
            });
        }

        let invalid = |source: ferry_core::Error| RegistryError::InvalidContent {
            reference: reference.to_string(),
            source,
        };
        let manifest = ImageIndex::parse_manifest(&raw).map_err(invalid)?;

        let mut children = Vec::with_capacity(manifest.manifests().len());
        for child in manifest.manifests() {
            let child_ref = reference.with_digest(child.content_digest().map_err(invalid)?);
            let artifact = if child.media_type().is_index() {
                Artifact::Index(self.fetch_index(&child_ref).await?)
            } else {
                Artifact::Image(self.fetch_image(&child_ref).await?)
            };
            children.push(artifact);
        }

        ImageIndex::from_raw(raw, Some(media_type), children).map_err(invalid)
    }

    async fn write_image(&self, reference: &Reference, image: &Image) -> Result<(), RegistryError> {
        let repository = reference.repository();
        let invalid = |source: ferry_core::Error| RegistryError::InvalidContent {
            reference: reference.to_string(),
            source,
        };

        let config = image.manifest().config();
        let config_digest = config.content_digest().map_err(invalid)?;
        if self.blob_exists(repository, &config_digest).await? {
            tracing::debug!(repository = %repository, digest = %config_digest, "Config exists, skipping upload");
        } else {
            let blob = image.config_blob().clone();
            let size = blob.len() as u64;
            self.upload_blob(repository, &config_digest, size, Body::from(blob))
                .await?;
        }

        for layer in image.layers() {
            let digest = layer.content_digest().map_err(invalid)?;
            if !layer.is_distributable() {
                tracing::debug!(
                    repository = %repository,
                    digest = %digest,
                    media_type = %layer.media_type(),
                    "Skipping non-distributable layer"
                );
                continue;
            }
            if self.blob_exists(repository, &digest).await? {
                tracing::debug!(repository = %repository, digest = %digest, "Layer exists, skipping upload");
                continue;
            }
            let stream = image
                .open_layer(layer)
                .await
                .map_err(|source| RegistryError::BlobReadFailed {
                    digest: digest.to_string(),
                    source,
                })?;
            self.upload_blob(repository, &digest, layer.content_size(), Body::wrap_stream(stream))
                .await?;
        }

        self.put_manifest(reference, image.media_type(), image.raw_manifest())
            .await
    }

    async fn write_index(
        &self,
        reference: &Reference,
        index: &ImageIndex,
    ) -> Result<(), RegistryError> {
        for (_, child) in index.entries() {
            let child_ref = reference.with_digest(child.digest());
            match child {
                Artifact::Image(image) => self.write_image(&child_ref, image).await?,
                Artifact::Index(nested) => self.write_index(&child_ref, nested).await?,
            }
        }
        self.put_manifest(reference, index.media_type(), index.raw_manifest())
            .await
    }
}

/// Layers of an image fetched by a [`RegistryClient`], read from the
/// repository the image came from.
#[derive(Debug)]
struct RemoteBlobs {
    client: RegistryClient,
    repository: Repository,
}

#[async_trait]
impl BlobSource for RemoteBlobs {
    async fn open(&self, descriptor: &Descriptor) -> ferry_core::Result<BlobStream> {
        let digest = descriptor.content_digest()?;
        self.client
            .open_blob(&self.repository, &digest)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    ferry_core::Error::BlobNotFound {
                        digest: digest.to_string(),
                    }
                } else {
                    ferry_core::Error::BlobUnavailable {
                        digest: digest.to_string(),
                        source: Box::new(err),
                    }
                }
            })
    }
}

fn verify(reference: &Reference, expected: &Digest, data: &[u8]) -> Result<(), RegistryError> {
    let actual = expected
        .compute_like(data)
        .map_err(|source| RegistryError::InvalidContent {
            reference: reference.to_string(),
            source,
        })?;
    if &actual != expected {
        return Err(RegistryError::DigestMismatch {
            reference: reference.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Returns the `Content-Type` header without parameters.
fn header_media_type(headers: &HeaderMap) -> Option<MediaType> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim())
        .filter(|v| !v.is_empty())
        .map(MediaType::from)
}

/// Decides the manifest type: the document's own `mediaType` wins, then a
/// recognised `Content-Type`, then the document's shape.
fn detect_media_type(raw: &[u8], content_type: Option<MediaType>) -> ferry_core::Result<MediaType> {
    let kind: ManifestKind = serde_json::from_slice(raw)?;
    if let Some(media_type) = kind.media_type {
        return Ok(media_type);
    }
    if let Some(content_type) = content_type.filter(|m| m.is_index() || m.is_image()) {
        return Ok(content_type);
    }
    Ok(if kind.manifests.is_some() {
        MediaType::ImageIndex
    } else {
        MediaType::ImageManifest
    })
}

/// Extracts the next-page target from a `Link: <...>; rel="next"` header.
/// The target may be a path or an absolute URL.
fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains("rel=\"next\"") {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(target.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> RegistryClient {
        RegistryClient::new(RegistryConfig::new(url)).unwrap()
    }

    #[test]
    fn test_client_registry_from_url() {
        assert_eq!(client("http://localhost:5000").registry().host(), "localhost:5000");
        assert_eq!(
            client("https://registry.example.com/some/prefix").registry().host(),
            "registry.example.com"
        );
    }

    #[test]
    fn test_invalid_url() {
        let result = RegistryClient::new(RegistryConfig::new("not a url"));
        assert!(matches!(result, Err(RegistryError::InvalidUrl { .. })));
    }

    #[test]
    fn test_missing_ca_cert() {
        let config = RegistryConfig::new("https://example.com")
            .with_tls(crate::TlsConfig::new().with_ca_cert("/nonexistent/ca.pem"));
        assert!(matches!(
            RegistryClient::new(config),
            Err(RegistryError::IoError { .. })
        ));
    }

    #[test]
    fn test_manifest_url() {
        let client = client("https://registry.example.com");
        let reference = client
            .registry()
            .repository(["mirror", "app"])
            .tag("v1")
            .unwrap();
        assert_eq!(
            client.manifest_url(&reference),
            "https://registry.example.com/v2/mirror/app/manifests/v1"
        );
    }

    #[test]
    fn test_auth_headers_none() {
        let headers = client("https://example.com").auth_headers().unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_auth_headers_basic() {
        let config =
            RegistryConfig::new("https://example.com").with_auth(RegistryAuth::basic("user", "pass"));
        let client = RegistryClient::new(config).unwrap();
        let headers = client.auth_headers().unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_auth_headers_bearer() {
        let config =
            RegistryConfig::new("https://example.com").with_auth(RegistryAuth::bearer("my-token"));
        let client = RegistryClient::new(config).unwrap();
        let headers = client.auth_headers().unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, "Bearer my-token");
    }

    #[test]
    fn test_detect_media_type() {
        let explicit = format!(
            r#"{{"mediaType":"{}","manifests":[]}}"#,
            media_types::DOCKER_MANIFEST_LIST
        );
        assert_eq!(
            detect_media_type(explicit.as_bytes(), None).unwrap(),
            media_types::docker_manifest_list()
        );

        let bare_index = br#"{"schemaVersion":2,"manifests":[]}"#;
        assert!(detect_media_type(bare_index, None).unwrap().is_index());

        let bare_manifest = br#"{"schemaVersion":2,"config":{},"layers":[]}"#;
        assert_eq!(
            detect_media_type(bare_manifest, Some(MediaType::from("application/octet-stream")))
                .unwrap(),
            MediaType::ImageManifest
        );
    }

    #[test]
    fn test_accept_header_lists_every_manifest_type() {
        let accept = RegistryClient::accept_header();
        assert!(accept.starts_with("application/vnd.oci.image.index.v1+json, "));
        assert!(accept.contains(media_types::DOCKER_MANIFEST));
        assert_eq!(accept.split(", ").count(), 4);
    }

    #[test]
    fn test_resolve_relative_and_absolute_links() {
        let client = client("https://registry.example.com:5000");
        assert_eq!(
            client.resolve("/v2/app/tags/list?last=b").unwrap().as_str(),
            "https://registry.example.com:5000/v2/app/tags/list?last=b"
        );
        assert_eq!(
            client
                .resolve("https://cdn.example.com/v2/app/tags/list?last=b")
                .unwrap()
                .as_str(),
            "https://cdn.example.com/v2/app/tags/list?last=b"
        );
    }

    #[test]
    fn test_header_media_type_strips_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/vnd.oci.image.index.v1+json; charset=utf-8"),
        );
        assert!(header_media_type(&headers).unwrap().is_index());
    }

    #[test]
    fn test_next_page() {
        let mut headers = HeaderMap::new();
        assert!(next_page(&headers).is_none());
        headers.insert(
            LINK,
            HeaderValue::from_static(r#"</v2/app/tags/list?n=2&last=b>; rel="next""#),
        );
        assert_eq!(next_page(&headers).as_deref(), Some("/v2/app/tags/list?n=2&last=b"));
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let reference = client("http://localhost:5000")
            .registry()
            .repository(["app"])
            .digest(Digest::sha256(b"a"));
        assert!(verify(&reference, &Digest::sha256(b"a"), b"a").is_ok());
        assert!(matches!(
            verify(&reference, &Digest::sha256(b"a"), b"b"),
            Err(RegistryError::DigestMismatch { .. })
        ));
    }
}
