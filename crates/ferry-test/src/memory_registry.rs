//! An in-memory [`Transport`] for exercising replication without a network.
//!
//! [`MemoryRegistry`] stores images and indexes by `repository:tag` and
//! `repository@digest`, records every call it receives, and can be told to
//! fail specific operations or to slow every operation down. Writes copy
//! distributable layer blobs into the registry's own blob store, the way a
//! real push uploads them.
//!
//! # Examples
//!
//! ```rust
//! use ferry_core::Registry;
//! use ferry_registry::Transport;
//! use ferry_test::{ImageFixture, MemoryRegistry, Operation};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = MemoryRegistry::new();
//! let reference = Registry::new("dest").repository(["app"]).tag("v1")?;
//!
//! registry.put_image(&reference, ImageFixture::new("linux", "amd64").build()?);
//! let tags = registry.list_tags(reference.repository()).await?;
//!
//! assert_eq!(tags, ["v1"]);
//! assert_eq!(registry.calls(Operation::ListTags), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::{
    read_blob, Artifact, BlobSource, BlobStream, Descriptor, DescriptorEx, Digest, Image,
    ImageIndex, Reference, Repository, Target,
};
use futures::stream::{self, StreamExt};
use ferry_registry::{RegistryError, Transport};
use parking_lot::Mutex;

/// A transport operation, for call counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`Transport::list_tags`].
    ListTags,
    /// [`Transport::fetch_descriptor`].
    FetchDescriptor,
    /// [`Transport::fetch_image`].
    FetchImage,
    /// [`Transport::fetch_index`].
    FetchIndex,
    /// [`Transport::write_image`].
    WriteImage,
    /// [`Transport::write_index`].
    WriteIndex,
}

impl Operation {
    /// Returns true for operations that modify the registry.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::WriteImage | Self::WriteIndex)
    }
}

/// A recorded call: the operation and the reference or repository it
/// targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation invoked.
    pub operation: Operation,
    /// `Display` form of the reference or repository.
    pub target: String,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    matching: String,
    status: u16,
}

/// Layer blobs written to a [`MemoryRegistry`], keyed by digest.
#[derive(Debug, Default)]
struct BlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

#[async_trait]
impl BlobSource for BlobStore {
    async fn open(&self, descriptor: &Descriptor) -> ferry_core::Result<BlobStream> {
        let blob = self
            .blobs
            .lock()
            .get(descriptor.digest())
            .cloned()
            .ok_or_else(|| ferry_core::Error::BlobNotFound {
                digest: descriptor.digest().clone(),
            })?;
        Ok(stream::once(async move { Ok(blob) }).boxed())
    }
}

#[derive(Debug, Default)]
struct State {
    content: HashMap<String, Artifact>,
    tags: HashMap<String, Vec<String>>,
}

/// In-memory registry implementing [`Transport`].
///
/// Calls made by the registry to itself (writing an index's children) are
/// not recorded; only calls through the [`Transport`] interface are.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
    blobs: Arc<BlobStore>,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Vec<Fault>>,
    forbidden: Mutex<Vec<String>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes `operation` fail with HTTP 500 when its target contains
    /// `matching`. An empty string matches every call.
    pub fn fail_on(&self, operation: Operation, matching: impl Into<String>) {
        self.fail_with_status(operation, matching, 500);
    }

    /// Like [`fail_on`](Self::fail_on) with a chosen HTTP status, classified
    /// the way a real registry response would be.
    pub fn fail_with_status(&self, operation: Operation, matching: impl Into<String>, status: u16) {
        self.faults.lock().push(Fault {
            operation,
            matching: matching.into(),
            status,
        });
    }

    /// Answers every read of `repository` with 403.
    pub fn forbid(&self, repository: &Repository) {
        self.forbidden.lock().push(repository.to_string());
    }

    /// Stores an image under `reference` (and under its digest). Its layers
    /// stay readable from the image's own blob source.
    pub fn put_image(&self, reference: &Reference, image: Image) {
        self.store(reference, Artifact::Image(image));
    }

    /// Stores an index and all of its children.
    pub fn put_index(&self, reference: &Reference, index: ImageIndex) {
        self.store(reference, Artifact::Index(index));
    }

    /// Returns what is stored under `reference`.
    #[must_use]
    pub fn get(&self, reference: &Reference) -> Option<Artifact> {
        self.state.lock().content.get(&reference.to_string()).cloned()
    }

    /// Returns the index stored under `reference`, if it is an index.
    #[must_use]
    pub fn get_index(&self, reference: &Reference) -> Option<ImageIndex> {
        match self.get(reference)? {
            Artifact::Index(index) => Some(index),
            Artifact::Image(_) => None,
        }
    }

    /// Returns the image stored under `reference`, if it is an image.
    #[must_use]
    pub fn get_image(&self, reference: &Reference) -> Option<Image> {
        match self.get(reference)? {
            Artifact::Image(image) => Some(image),
            Artifact::Index(_) => None,
        }
    }

    /// Returns true if a write stored the blob `digest`.
    #[must_use]
    pub fn has_blob(&self, digest: &Digest) -> bool {
        self.blobs.blobs.lock().contains_key(&digest.to_string())
    }

    /// Number of distinct blobs written.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.blobs.blobs.lock().len()
    }

    /// Copies the distributable layers of every image in `artifact` that
    /// the store does not hold yet.
    async fn copy_blobs(&self, artifact: &Artifact) -> Result<(), RegistryError> {
        let mut pending = vec![artifact];
        while let Some(artifact) = pending.pop() {
            let image = match artifact {
                Artifact::Image(image) => image,
                Artifact::Index(index) => {
                    pending.extend(index.entries().map(|(_, child)| child));
                    continue;
                }
            };
            for layer in image.distributable_layers() {
                if self.blobs.blobs.lock().contains_key(layer.digest()) {
                    continue;
                }
                let blob = read_blob(image.blob_source().as_ref(), layer)
                    .await
                    .map_err(|source| RegistryError::BlobReadFailed {
                        digest: layer.digest().clone(),
                        source,
                    })?;
                self.blobs.blobs.lock().insert(layer.digest().clone(), blob);
            }
        }
        Ok(())
    }

    /// Returns the tags of `repository` in the order they were first written.
    #[must_use]
    pub fn tags(&self, repository: &Repository) -> Vec<String> {
        self.state
            .lock()
            .tags
            .get(&repository.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every recorded call, in order.
    #[must_use]
    pub fn call_log(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of calls to `operation`.
    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Number of calls to `operation` whose target contains `matching`.
    #[must_use]
    pub fn calls_matching(&self, operation: Operation, matching: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation && c.target.contains(matching))
            .count()
    }

    /// Number of write calls of any kind.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation.is_write())
            .count()
    }

    /// Highest number of operations that were in progress at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn store(&self, reference: &Reference, artifact: Artifact) {
        let mut state = self.state.lock();
        Self::store_locked(&mut state, reference, artifact);
    }

    fn store_locked(state: &mut State, reference: &Reference, artifact: Artifact) {
        if let Artifact::Index(index) = &artifact {
            for (_, child) in index.entries() {
                Self::store_locked(state, &reference.with_digest(child.digest()), child.clone());
            }
        }

        let by_digest = reference.with_digest(artifact.digest());
        if let Target::Tag(tag) = reference.target() {
            let tags = state
                .tags
                .entry(reference.repository().to_string())
                .or_default();
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
            state.content.insert(reference.to_string(), artifact.clone());
        }
        state.content.insert(by_digest.to_string(), artifact);
    }

    /// Records the call, applies latency and injected faults.
    async fn enter(&self, operation: Operation, target: String) -> Result<InFlight<'_>, RegistryError> {
        let guard = InFlight::new(self);
        self.calls.lock().push(Call {
            operation,
            target: target.clone(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let fault = self
            .faults
            .lock()
            .iter()
            .find(|f| f.operation == operation && target.contains(&f.matching))
            .cloned();
        if let Some(fault) = fault {
            tracing::debug!(?operation, reference = %target, status = fault.status, "injected failure");
            return Err(RegistryError::from_status(
                fault.status,
                target,
                "injected failure".to_string(),
            ));
        }

        if !operation.is_write()
            && self
                .forbidden
                .lock()
                .iter()
                .any(|repo| target.starts_with(repo.as_str()))
        {
            return Err(RegistryError::Forbidden { reference: target });
        }

        Ok(guard)
    }

    fn lookup(&self, reference: &Reference) -> Result<Artifact, RegistryError> {
        self.get(reference).ok_or_else(|| RegistryError::NotFound {
            reference: reference.to_string(),
        })
    }
}

/// Tracks concurrent operations for [`MemoryRegistry::max_in_flight`].
struct InFlight<'a> {
    registry: &'a MemoryRegistry,
}

impl<'a> InFlight<'a> {
    fn new(registry: &'a MemoryRegistry) -> Self {
        let now = registry.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        registry.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { registry }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryRegistry {
    async fn list_tags(&self, repository: &Repository) -> Result<Vec<String>, RegistryError> {
        let _guard = self.enter(Operation::ListTags, repository.to_string()).await?;
        self.state
            .lock()
            .tags
            .get(&repository.to_string())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                reference: repository.to_string(),
            })
    }

    async fn fetch_descriptor(&self, reference: &Reference) -> Result<Descriptor, RegistryError> {
        let _guard = self
            .enter(Operation::FetchDescriptor, reference.to_string())
            .await?;
        self.lookup(reference)?
            .descriptor()
            .map_err(|source| RegistryError::InvalidContent {
                reference: reference.to_string(),
                source,
            })
    }

    async fn fetch_image(&self, reference: &Reference) -> Result<Image, RegistryError> {
        let _guard = self.enter(Operation::FetchImage, reference.to_string()).await?;
        match self.lookup(reference)? {
            Artifact::Image(image) => Ok(image),
            Artifact::Index(index) => Err(RegistryError::UnexpectedMediaType {
                reference: reference.to_string(),
                media_type: index.media_type().to_string(),
            }),
        }
    }

    async fn fetch_index(&self, reference: &Reference) -> Result<ImageIndex, RegistryError> {
        let _guard = self.enter(Operation::FetchIndex, reference.to_string()).await?;
        match self.lookup(reference)? {
            Artifact::Index(index) => Ok(index),
            Artifact::Image(image) => Err(RegistryError::UnexpectedMediaType {
                reference: reference.to_string(),
                media_type: image.media_type().to_string(),
            }),
        }
    }

    async fn write_image(&self, reference: &Reference, image: &Image) -> Result<(), RegistryError> {
        let _guard = self.enter(Operation::WriteImage, reference.to_string()).await?;
        let artifact = Artifact::Image(image.clone());
        self.copy_blobs(&artifact).await?;
        let store: Arc<dyn BlobSource> = self.blobs.clone();
        let stored = image.clone().with_blob_source(store);
        self.put_image(reference, stored);
        Ok(())
    }

    async fn write_index(
        &self,
        reference: &Reference,
        index: &ImageIndex,
    ) -> Result<(), RegistryError> {
        let _guard = self.enter(Operation::WriteIndex, reference.to_string()).await?;
        self.copy_blobs(&Artifact::Index(index.clone())).await?;
        self.put_index(reference, index.clone());
        Ok(())
    }
}
