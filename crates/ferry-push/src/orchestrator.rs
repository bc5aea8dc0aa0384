//! Bounded-concurrency image push.
//!
//! Every `(image, tag)` pair becomes one task. Tasks for the same
//! destination repository share one preparation (hooks plus tag listing),
//! and the first failing task cancels the rest of the run.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::{
    Digest, Image, ImageIndex, MediaTypeEx, Reference, Registry, RegistryImageSet, Repository,
};
use ferry_registry::Transport;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::cancel::RunState;
use crate::error::{PushError, Result};
use crate::hooks::PrePushHook;
use crate::merge::{fetch_existing_index, merge};
use crate::normalize::{normalize, ArtifactSource, TransportSource};
use crate::options::PushOptions;
use crate::policy::{decide, ConflictPolicy, Decision};
use crate::prepare::{ExistingTags, PreparationBarrier};
use crate::progress::{ProgressGauge, ProgressSink};

/// A registry together with the transport used to reach it.
#[derive(Clone)]
pub struct Endpoint {
    transport: Arc<dyn Transport>,
    registry: Registry,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(transport: Arc<dyn Transport>, registry: Registry) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Returns the registry.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Counts reported by a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Tags or chart versions written to the destination.
    pub pushed: usize,
    /// Tags or chart versions left alone because they already existed.
    pub skipped: usize,
}

/// Pushes bundled images and charts from a source registry to a destination
/// registry.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use ferry_push::{Endpoint, PushOptions, Pusher};
///
/// let pusher = Pusher::new(source, destination, PushOptions::default())?
///     .with_progress(Arc::new(LogProgress::new("Pushing bundled images")));
/// let summary = pusher.push_images(&images).await?;
/// println!("pushed {} tags", summary.pushed);
/// ```
pub struct Pusher {
    pub(crate) source: Endpoint,
    pub(crate) destination: Endpoint,
    pub(crate) options: PushOptions,
    pub(crate) hooks: Vec<Arc<dyn PrePushHook>>,
    pub(crate) progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for Pusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pusher")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("options", &self.options)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl Pusher {
    /// Creates a pusher.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::InvalidConfig`] if the options are invalid.
    pub fn new(source: Endpoint, destination: Endpoint, options: PushOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            source,
            destination,
            options,
            hooks: Vec::new(),
            progress: Arc::new(ProgressGauge::new()),
        })
    }

    /// Adds a hook run before the first push to each destination repository.
    /// Hooks run in the order they were added.
    pub fn with_hook(mut self, hook: Arc<dyn PrePushHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Replaces the progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the run options.
    pub const fn options(&self) -> &PushOptions {
        &self.options
    }

    /// Pushes every tag in `images`.
    ///
    /// Registries and images are visited in sorted order and tags in the
    /// order given. At most `concurrency` tags are in flight at once. The
    /// first error cancels every task that has not yet reached its next
    /// network operation; the run waits for in-flight tasks and returns that
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::InvalidConfig`] before pushing anything if an
    /// image or tag name is invalid, otherwise the first task error.
    pub async fn push_images(&self, images: &RegistryImageSet) -> Result<PushSummary> {
        let plan = self.plan_images(images)?;
        let run_id = uuid::Uuid::now_v7();
        let span = tracing::info_span!("push_images", run_id = %run_id);
        self.run_plan(plan).instrument(span).await
    }

    fn plan_images(&self, images: &RegistryImageSet) -> Result<Vec<TagPush>> {
        let mut plan = Vec::with_capacity(images.total_images());
        for (_registry, image, tags) in images.iter() {
            let source = self.source.registry.repository([image]);
            let destination = Arc::new(
                self.destination
                    .registry
                    .repository([self.options.destination_path.as_str(), image]),
            );
            let tags: Arc<[String]> = tags.into();

            for tag in tags.iter() {
                plan.push(TagPush {
                    source: source.tag(tag).map_err(invalid_input)?,
                    destination: destination.tag(tag).map_err(invalid_input)?,
                    repository: Arc::clone(&destination),
                    tags: Arc::clone(&tags),
                });
            }
        }
        Ok(plan)
    }

    async fn run_plan(&self, plan: Vec<TagPush>) -> Result<PushSummary> {
        tracing::info!(
            tags = plan.len(),
            concurrency = self.options.concurrency,
            policy = %self.options.on_existing_tag,
            force_oci_media_types = self.options.force_oci_media_types,
            "starting image push"
        );

        let run = Arc::new(Run {
            source: self.source.clone(),
            destination: self.destination.clone(),
            options: self.options.clone(),
            hooks: self.hooks.clone(),
            progress: Arc::clone(&self.progress),
            state: RunState::new(),
            barrier: PreparationBarrier::new(),
            pushed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        });
        run.progress.set_capacity(plan.len());

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut tasks = JoinSet::new();

        for unit in plan {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            while let Some(joined) = tasks.try_join_next() {
                reap(&run.state, joined);
            }
            if run.state.is_cancelled() {
                break;
            }

            let run = Arc::clone(&run);
            tasks.spawn(
                async move {
                    let _permit = permit;
                    run.push_tag(unit).await;
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            reap(&run.state, joined);
        }

        if let Some(err) = run.state.take_error() {
            tracing::warn!(error = %err, "image push failed");
            return Err(err);
        }

        let summary = run.summary();
        tracing::info!(
            pushed = summary.pushed,
            skipped = summary.skipped,
            "image push complete"
        );
        Ok(summary)
    }
}

pub(crate) fn invalid_input(source: ferry_core::Error) -> PushError {
    PushError::InvalidConfig {
        reason: source.to_string(),
    }
}

fn reap(state: &RunState, joined: std::result::Result<(), JoinError>) {
    if let Err(err) = joined {
        state.fail(PushError::TaskAborted {
            reason: err.to_string(),
        });
    }
}

/// One tag to push.
#[derive(Debug)]
struct TagPush {
    source: Reference,
    destination: Reference,
    /// Destination repository, shared by every tag of the image.
    repository: Arc<Repository>,
    /// Every tag pushed to the repository from this image, for hooks.
    tags: Arc<[String]>,
}

impl TagPush {
    fn tag(&self) -> &str {
        self.destination.tag().unwrap_or_default()
    }
}

enum Outcome {
    Pushed,
    Skipped,
}

/// State shared by the tasks of one run.
struct Run {
    source: Endpoint,
    destination: Endpoint,
    options: PushOptions,
    hooks: Vec<Arc<dyn PrePushHook>>,
    progress: Arc<dyn ProgressSink>,
    state: RunState,
    barrier: PreparationBarrier,
    pushed: AtomicUsize,
    skipped: AtomicUsize,
}

impl Run {
    fn summary(&self) -> PushSummary {
        PushSummary {
            pushed: self.pushed.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
        }
    }

    async fn push_tag(&self, unit: TagPush) {
        match self.try_push_tag(&unit).await {
            Ok(Outcome::Pushed) => {
                self.pushed.fetch_add(1, Ordering::AcqRel);
                self.progress.advance();
            }
            Ok(Outcome::Skipped) => {
                self.skipped.fetch_add(1, Ordering::AcqRel);
                self.progress.advance();
            }
            Err(err) if err.is_cancelled() => {
                tracing::debug!(destination = %unit.destination, "push cancelled");
            }
            Err(err) => {
                tracing::debug!(destination = %unit.destination, error = %err, "push failed");
                self.state.fail(err);
            }
        }
    }

    async fn try_push_tag(&self, unit: &TagPush) -> Result<Outcome> {
        self.state.check()?;
        let existing = self.prepare(unit).await?;
        self.state.check()?;

        let policy = self.options.on_existing_tag;
        let exists = existing.contains(unit.tag());
        match decide(policy, exists) {
            Decision::Proceed => {}
            Decision::Skip => {
                tracing::debug!(destination = %unit.destination, "tag exists, skipping");
                return Ok(Outcome::Skipped);
            }
            Decision::Abort => {
                return Err(PushError::TagExists {
                    reference: unit.destination.to_string(),
                });
            }
        }

        self.copy(unit).await?;
        Ok(Outcome::Pushed)
    }

    async fn prepare(&self, unit: &TagPush) -> Result<ExistingTags> {
        let key = unit.repository.to_string();
        let prepared = self
            .barrier
            .get_or_prepare(&key, || self.prepare_repository(&unit.repository, &unit.tags))
            .await;
        prepared.map_err(|source| PushError::PreparationFailed {
            repository: key,
            source,
        })
    }

    async fn prepare_repository(
        &self,
        repository: &Repository,
        tags: &[String],
    ) -> Result<HashSet<String>> {
        tracing::debug!(repository = %repository, hooks = self.hooks.len(), "preparing repository");
        for hook in &self.hooks {
            self.state.check()?;
            hook.before_push(repository, tags)
                .await
                .map_err(|source| PushError::HookFailed {
                    repository: repository.to_string(),
                    source,
                })?;
        }

        if !self.options.on_existing_tag.needs_existing_tags() {
            return Ok(HashSet::new());
        }

        self.state.check()?;
        match self.destination.transport().list_tags(repository).await {
            Ok(tags) => Ok(tags.into_iter().collect()),
            Err(err) if err.is_absent() => {
                tracing::warn!(
                    repository = %repository,
                    error = %err,
                    "could not list existing tags, assuming repository is new"
                );
                Ok(HashSet::new())
            }
            Err(source) => Err(PushError::TagListingFailed {
                repository: repository.to_string(),
                source,
            }),
        }
    }

    async fn copy(&self, unit: &TagPush) -> Result<()> {
        let source = self.source.transport();
        let destination = self.destination.transport();

        self.state.check()?;
        let descriptor = source
            .fetch_descriptor(&unit.source)
            .await
            .map_err(PushError::transport("fetch descriptor of", &unit.source))?;

        if !descriptor.media_type().is_index() {
            self.state.check()?;
            let image = source
                .fetch_image(&unit.source)
                .await
                .map_err(PushError::transport("fetch image", &unit.source))?;
            self.state.check()?;
            destination
                .write_image(&unit.destination, &image)
                .await
                .map_err(PushError::transport("write image to", &unit.destination))?;

            tracing::info!(
                destination = %unit.destination,
                digest = %image.digest(),
                "pushed image"
            );
            return Ok(());
        }

        self.state.check()?;
        let mut index = source
            .fetch_index(&unit.source)
            .await
            .map_err(PushError::transport("fetch index", &unit.source))?;

        let policy = self.options.on_existing_tag;
        if policy.is_merge() {
            self.state.check()?;
            let existing = fetch_existing_index(destination, &unit.destination).await?;
            let (merge_from, merge_into) = match policy {
                ConflictPolicy::MergeRetainExisting => (&existing, &index),
                _ => (&index, &existing),
            };
            let merged = merge(merge_from, merge_into).map_err(|source| PushError::MergeFailed {
                reference: unit.destination.to_string(),
                source,
            })?;
            tracing::debug!(
                destination = %unit.destination,
                existing = existing.len(),
                merged = merged.len(),
                "merged with existing index"
            );
            index = merged;
        }

        if self.options.force_oci_media_types {
            let children = TransportSource::new(source, unit.source.repository())
                .with_fallback(destination, unit.destination.repository());
            let children = Cancellable {
                inner: &children,
                state: &self.state,
            };
            index = normalize(&index, &children)
                .await
                .map_err(|err| PushError::NormalizeFailed {
                    reference: unit.source.to_string(),
                    source: Box::new(err),
                })?;
        }

        self.state.check()?;
        destination
            .write_index(&unit.destination, &index)
            .await
            .map_err(PushError::transport("write index to", &unit.destination))?;

        tracing::info!(
            destination = %unit.destination,
            digest = %index.digest(),
            entries = index.len(),
            "pushed index"
        );
        Ok(())
    }
}

/// Checks for cancellation before every fetch the normalizer makes.
struct Cancellable<'a> {
    inner: &'a dyn ArtifactSource,
    state: &'a RunState,
}

#[async_trait]
impl ArtifactSource for Cancellable<'_> {
    async fn fetch_image(&self, digest: &Digest) -> Result<Image> {
        self.state.check()?;
        self.inner.fetch_image(digest).await
    }

    async fn fetch_index(&self, digest: &Digest) -> Result<ImageIndex> {
        self.state.check()?;
        self.inner.fetch_index(digest).await
    }
}

#[cfg(test)]
mod tests {
    use ferry_test::{ImageFixture, MemoryRegistry, Operation};

    use super::*;

    fn endpoints() -> (Arc<MemoryRegistry>, Arc<MemoryRegistry>, Endpoint, Endpoint) {
        let source = Arc::new(MemoryRegistry::new());
        let destination = Arc::new(MemoryRegistry::new());
        let source_endpoint = Endpoint::new(source.clone(), Registry::new("src"));
        let destination_endpoint = Endpoint::new(destination.clone(), Registry::new("dest"));
        (source, destination, source_endpoint, destination_endpoint)
    }

    fn image_set(yaml: &str) -> RegistryImageSet {
        RegistryImageSet::from_yaml(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let (_, _, source, destination) = endpoints();
        let options = PushOptions::builder().concurrency(0).build();
        assert!(matches!(
            Pusher::new(source, destination, options),
            Err(PushError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_tag_rejected_before_any_push() {
        let (source_registry, destination_registry, source, destination) = endpoints();
        let pusher = Pusher::new(source, destination, PushOptions::default()).unwrap();
        let images = image_set(
            "docker.io:\n  images:\n    app: [v1]\n    Bad_Name: [v1]\n",
        );

        let err = pusher.push_images(&images).await.unwrap_err();
        assert!(matches!(err, PushError::InvalidConfig { .. }));
        assert!(source_registry.call_log().is_empty());
        assert!(destination_registry.call_log().is_empty());
    }

    #[tokio::test]
    async fn test_destination_path_prefixes_repository() {
        let (source_registry, destination_registry, source, destination) = endpoints();
        let reference = Registry::new("src").repository(["library/nginx"]).tag("1.27").unwrap();
        source_registry.put_image(&reference, ImageFixture::new("linux", "amd64").build().unwrap());

        let options = PushOptions::builder().destination_path("/mirror").build();
        let pusher = Pusher::new(source, destination, options).unwrap();
        let images = image_set("docker.io:\n  images:\n    library/nginx: [\"1.27\"]\n");

        let summary = pusher.push_images(&images).await.unwrap();

        assert_eq!(summary, PushSummary { pushed: 1, skipped: 0 });
        let pushed = Registry::new("dest")
            .repository(["mirror", "library/nginx"])
            .tag("1.27")
            .unwrap();
        assert!(destination_registry.get_image(&pushed).is_some());
        assert_eq!(destination_registry.calls(Operation::WriteImage), 1);
    }
}
