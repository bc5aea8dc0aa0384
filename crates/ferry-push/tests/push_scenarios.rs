//! End-to-end push scenarios against in-memory registries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use ferry_core::{
    Artifact, ChartRepositorySet, DescriptorEx, ImageIndex, MediaType, Reference, Registry,
    RegistryImageSet, Repository,
};
use ferry_push::{
    ConflictPolicy, Endpoint, HookError, PrePushHook, ProgressGauge, PushError, PushOptions,
    PushSummary, Pusher,
};
use ferry_registry::RegistryError;
use ferry_test::{platforms, ImageFixture, IndexFixture, MemoryRegistry, Operation};

struct Harness {
    source: Arc<MemoryRegistry>,
    destination: Arc<MemoryRegistry>,
    progress: Arc<ProgressGauge>,
}

impl Harness {
    fn new() -> Self {
        Self::with_source(MemoryRegistry::new())
    }

    fn with_source(source: MemoryRegistry) -> Self {
        Self {
            source: Arc::new(source),
            destination: Arc::new(MemoryRegistry::new()),
            progress: Arc::new(ProgressGauge::new()),
        }
    }

    fn pusher(&self, options: PushOptions) -> Pusher {
        Pusher::new(
            Endpoint::new(self.source.clone(), Registry::new("src")),
            Endpoint::new(self.destination.clone(), Registry::new("dest")),
            options,
        )
        .unwrap()
        .with_progress(self.progress.clone())
    }

    fn src(image: &str, tag: &str) -> Reference {
        Registry::new("src").repository([image]).tag(tag).unwrap()
    }

    fn dest(image: &str, tag: &str) -> Reference {
        Registry::new("dest").repository([image]).tag(tag).unwrap()
    }
}

fn options(policy: ConflictPolicy) -> PushOptions {
    PushOptions::builder().on_existing_tag(policy).build()
}

fn images(yaml: &str) -> RegistryImageSet {
    RegistryImageSet::from_yaml(yaml).unwrap()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn two_platform_index(label: &str) -> ImageIndex {
    IndexFixture::oci()
        .image(ImageFixture::new("linux", "amd64").label(label).build().unwrap())
        .image(ImageFixture::new("linux", "arm64").label(label).build().unwrap())
        .build()
        .unwrap()
}

fn digest_for(index: &ImageIndex, platform: &str) -> Option<ferry_core::Digest> {
    index
        .entries()
        .find(|(d, _)| d.platform_name().as_deref() == Some(platform))
        .map(|(d, _)| d.content_digest().unwrap())
}

/// A hook that counts calls and remembers the tags it was given.
#[derive(Default)]
struct RecordingHook {
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait::async_trait]
impl PrePushHook for RecordingHook {
    async fn before_push(&self, repository: &Repository, tags: &[String]) -> Result<(), HookError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push((repository.to_string(), tags.to_vec()));
        Ok(())
    }
}

// =============================================================================
// Scheduling
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_tags_overwrite_concurrency_two() {
    let harness = Harness::new();
    for tag in ["v1", "v2"] {
        harness.source.put_image(
            &Harness::src("app", tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    let pusher = harness.pusher(PushOptions::builder().concurrency(2).build());

    let summary = pusher
        .push_images(&images("r1:\n  images:\n    app: [v1, v2]\n"))
        .await
        .unwrap();

    assert_eq!(summary, PushSummary { pushed: 2, skipped: 0 });
    let mut tags = harness.destination.tags(Harness::dest("app", "v1").repository());
    tags.sort();
    assert_eq!(tags, ["v1", "v2"]);
    assert_eq!(harness.progress.completed(), 2);
    assert_eq!(harness.progress.capacity(), 2);
    assert_eq!(harness.destination.calls(Operation::ListTags), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_is_respected() {
    let harness =
        Harness::with_source(MemoryRegistry::new().with_latency(Duration::from_millis(10)));
    let tags: Vec<String> = (0..8).map(|i| format!("v{i}")).collect();
    for tag in &tags {
        harness.source.put_image(
            &Harness::src("app", tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    let pusher = harness.pusher(PushOptions::builder().concurrency(3).build());
    let yaml = format!("r1:\n  images:\n    app: [{}]\n", tags.join(", "));

    pusher.push_images(&images(&yaml)).await.unwrap();

    let peak = harness.source.max_in_flight();
    assert!(peak <= 3, "peak in-flight source operations was {peak}");
    assert!(peak >= 2, "tags were not pushed concurrently");
    assert_eq!(harness.destination.calls(Operation::WriteImage), 8);
}

#[tokio::test]
async fn test_single_worker_runs_one_operation_at_a_time() {
    let harness =
        Harness::with_source(MemoryRegistry::new().with_latency(Duration::from_millis(1)));
    for tag in ["v1", "v2", "v3"] {
        harness.source.put_image(
            &Harness::src("app", tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    let pusher = harness.pusher(PushOptions::default());

    pusher
        .push_images(&images("r1:\n  images:\n    app: [v1, v2, v3]\n"))
        .await
        .unwrap();

    assert_eq!(harness.source.max_in_flight(), 1);
}

// =============================================================================
// Conflict policies
// =============================================================================

#[tokio::test]
async fn test_repeated_push_is_idempotent() {
    for policy in [
        ConflictPolicy::Overwrite,
        ConflictPolicy::MergeRetainExisting,
        ConflictPolicy::MergeOverwriteExisting,
    ] {
        let harness = Harness::new();
        harness
            .source
            .put_index(&Harness::src("app", "v1"), two_platform_index("new"));
        let pusher = harness.pusher(options(policy));
        let set = images("r1:\n  images:\n    app: [v1]\n");

        pusher.push_images(&set).await.unwrap();
        let first = harness.destination.get_index(&Harness::dest("app", "v1")).unwrap();
        pusher.push_images(&set).await.unwrap();
        let second = harness.destination.get_index(&Harness::dest("app", "v1")).unwrap();

        assert_eq!(first.digest(), second.digest(), "{policy}");
        assert_eq!(second.len(), 2, "{policy}");
    }
}

#[tokio::test]
async fn test_error_policy_aborts_before_any_write() {
    let harness = Harness::new();
    for tag in ["v1", "v2"] {
        harness.source.put_image(
            &Harness::src("app", tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    harness.destination.put_image(
        &Harness::dest("app", "v1"),
        ImageFixture::new("linux", "amd64").label("old").build().unwrap(),
    );
    let pusher = harness.pusher(options(ConflictPolicy::Error));

    let err = pusher
        .push_images(&images("r1:\n  images:\n    app: [v1, v2]\n"))
        .await
        .unwrap_err();

    match err {
        PushError::TagExists { reference } => assert_eq!(reference, "dest/app:v1"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.destination.writes(), 0);
    assert_eq!(harness.source.call_log().len(), 0);
}

#[tokio::test]
async fn test_skip_policy_leaves_existing_tag_untouched() {
    let harness = Harness::new();
    for tag in ["v1", "v2"] {
        harness.source.put_image(
            &Harness::src("app", tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    let old = ImageFixture::new("linux", "amd64").label("old").build().unwrap();
    harness.destination.put_image(&Harness::dest("app", "v1"), old.clone());
    let pusher = harness.pusher(options(ConflictPolicy::Skip));

    let summary = pusher
        .push_images(&images("r1:\n  images:\n    app: [v1, v2]\n"))
        .await
        .unwrap();

    assert_eq!(summary, PushSummary { pushed: 1, skipped: 1 });
    assert_eq!(harness.progress.completed(), 2);
    assert_eq!(harness.destination.get_image(&Harness::dest("app", "v1")), Some(old));
    for op in [Operation::FetchDescriptor, Operation::FetchImage, Operation::FetchIndex] {
        assert_eq!(harness.source.calls_matching(op, "app:v1"), 0);
    }
    for op in [Operation::WriteImage, Operation::WriteIndex] {
        assert_eq!(harness.destination.calls_matching(op, "app:v1"), 0);
    }
    assert_eq!(harness.destination.calls_matching(Operation::WriteImage, "app:v2"), 1);
}

#[tokio::test]
async fn test_forbidden_tag_listing_means_new_repository() {
    let harness = Harness::new();
    harness.source.put_image(
        &Harness::src("app", "v1"),
        ImageFixture::new("linux", "amd64").build().unwrap(),
    );
    harness.destination.forbid(Harness::dest("app", "v1").repository());
    let pusher = harness.pusher(options(ConflictPolicy::Error));

    let summary = pusher
        .push_images(&images("r1:\n  images:\n    app: [v1]\n"))
        .await
        .unwrap();

    assert_eq!(summary.pushed, 1);
    assert_eq!(harness.destination.calls(Operation::ListTags), 1);
}

#[tokio::test]
async fn test_tag_listing_failure_is_fatal() {
    let harness = Harness::new();
    harness.source.put_image(
        &Harness::src("app", "v1"),
        ImageFixture::new("linux", "amd64").build().unwrap(),
    );
    harness.destination.fail_on(Operation::ListTags, "");
    let pusher = harness.pusher(options(ConflictPolicy::Skip));

    let err = pusher
        .push_images(&images("r1:\n  images:\n    app: [v1]\n"))
        .await
        .unwrap_err();

    let PushError::PreparationFailed { source, .. } = err else {
        panic!("expected a preparation failure");
    };
    assert!(matches!(
        source.as_ref(),
        PushError::TagListingFailed {
            source: RegistryError::HttpError { status: 500, .. },
            ..
        }
    ));
    assert_eq!(harness.destination.writes(), 0);
}

// =============================================================================
// Preparation barrier
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_preparation_runs_once_per_repository() {
    let harness =
        Harness::with_source(MemoryRegistry::new().with_latency(Duration::from_millis(2)));
    for (image, tag) in [
        ("app", "v1"),
        ("app", "v2"),
        ("app", "v3"),
        ("app", "v4"),
        ("web", "v1"),
        ("web", "v2"),
    ] {
        harness.source.put_image(
            &Harness::src(image, tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    let hook = Arc::new(RecordingHook::default());
    let pusher = harness
        .pusher(PushOptions::builder().concurrency(4).on_existing_tag(ConflictPolicy::Skip).build())
        .with_hook(hook.clone());

    pusher
        .push_images(&images(
            "r1:\n  images:\n    app: [v1, v2, v3, v4]\n    web: [v1, v2]\n",
        ))
        .await
        .unwrap();

    assert_eq!(hook.calls.load(Ordering::SeqCst), 2);
    assert_eq!(harness.destination.calls(Operation::ListTags), 2);
    let mut seen = hook.seen.lock().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("dest/app".to_string(), strings(&["v1", "v2", "v3", "v4"])),
            ("dest/web".to_string(), strings(&["v1", "v2"])),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hook_failure_fails_every_tag_of_repository() {
    let harness = Harness::new();
    for tag in ["v1", "v2", "v3"] {
        harness.source.put_image(
            &Harness::src("app", tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let failing = move |_: &Repository, _: &[String]| -> Result<(), HookError> {
        counted.fetch_add(1, Ordering::SeqCst);
        Err("repository quota exceeded".into())
    };
    let never = Arc::new(RecordingHook::default());
    let pusher = harness
        .pusher(PushOptions::builder().concurrency(3).build())
        .with_hook(Arc::new(failing))
        .with_hook(never.clone());

    let err = pusher
        .push_images(&images("r1:\n  images:\n    app: [v1, v2, v3]\n"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("repository quota exceeded"), "{err}");
    assert!(matches!(err, PushError::PreparationFailed { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(never.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.destination.writes(), 0);
    assert_eq!(harness.progress.completed(), 0);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_first_error_cancels_remaining_tags() {
    let harness = Harness::new();
    let tags = ["v1", "v2", "v3", "v4"];
    for tag in tags {
        harness.source.put_image(
            &Harness::src("app", tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    harness.destination.fail_on(Operation::WriteImage, "app:v2");
    let pusher = harness.pusher(PushOptions::default());

    let err = pusher
        .push_images(&images("r1:\n  images:\n    app: [v1, v2, v3, v4]\n"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PushError::Transport {
            operation: "write image to",
            ..
        }
    ));
    assert_eq!(harness.destination.calls(Operation::WriteImage), 2);
    assert_eq!(harness.source.calls_matching(Operation::FetchDescriptor, "app:v3"), 0);
    assert_eq!(harness.source.calls_matching(Operation::FetchDescriptor, "app:v4"), 0);
    assert_eq!(harness.progress.completed(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failure_reports_single_error() {
    let harness =
        Harness::with_source(MemoryRegistry::new().with_latency(Duration::from_millis(5)));
    let tags: Vec<String> = (0..6).map(|i| format!("v{i}")).collect();
    for tag in &tags {
        harness.source.put_image(
            &Harness::src("app", tag),
            ImageFixture::new("linux", "amd64").label(tag).build().unwrap(),
        );
    }
    harness.source.fail_on(Operation::FetchImage, "");
    let pusher = harness.pusher(PushOptions::builder().concurrency(3).build());
    let yaml = format!("r1:\n  images:\n    app: [{}]\n", tags.join(", "));

    let err = pusher.push_images(&images(&yaml)).await.unwrap_err();

    assert!(!err.is_cancelled());
    assert!(matches!(err, PushError::Transport { operation: "fetch image", .. }));
    assert_eq!(harness.destination.writes(), 0);
    assert!(harness.source.calls(Operation::FetchImage) <= 3);
}

// =============================================================================
// Merge and normalization
// =============================================================================

#[tokio::test]
async fn test_merge_into_single_platform_destination() {
    let harness = Harness::new();
    let pushed = two_platform_index("new");
    harness.source.put_index(&Harness::src("app", "v1"), pushed.clone());
    harness.destination.put_image(
        &Harness::dest("app", "v1"),
        ImageFixture::new("linux", "amd64").label("old").build().unwrap(),
    );
    let pusher = harness.pusher(options(ConflictPolicy::MergeOverwriteExisting));

    pusher
        .push_images(&images("r1:\n  images:\n    app: [v1]\n"))
        .await
        .unwrap();

    let merged = harness.destination.get_index(&Harness::dest("app", "v1")).unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(digest_for(&merged, "linux/amd64"), digest_for(&pushed, "linux/amd64"));
}

#[tokio::test]
async fn test_merge_retain_keeps_existing_platforms() {
    let harness = Harness::new();
    harness
        .source
        .put_index(&Harness::src("app", "v1"), two_platform_index("new"));
    let existing = IndexFixture::oci()
        .image(ImageFixture::new("linux", "amd64").label("old").build().unwrap())
        .image(ImageFixture::new("linux", "s390x").label("old").build().unwrap())
        .build()
        .unwrap();
    harness.destination.put_index(&Harness::dest("app", "v1"), existing.clone());
    let pusher = harness.pusher(options(ConflictPolicy::MergeRetainExisting));

    pusher
        .push_images(&images("r1:\n  images:\n    app: [v1]\n"))
        .await
        .unwrap();

    let merged = harness.destination.get_index(&Harness::dest("app", "v1")).unwrap();
    let mut merged_platforms = platforms(&merged);
    merged_platforms.sort();
    assert_eq!(merged_platforms, ["linux/amd64", "linux/arm64", "linux/s390x"]);
    assert_eq!(digest_for(&merged, "linux/amd64"), digest_for(&existing, "linux/amd64"));
}

#[tokio::test]
async fn test_force_oci_converts_docker_index() {
    let harness = Harness::new();
    let docker = IndexFixture::docker()
        .image(ImageFixture::new("linux", "amd64").docker().build().unwrap())
        .image(ImageFixture::new("linux", "arm64").docker().build().unwrap())
        .build()
        .unwrap();
    harness.source.put_index(&Harness::src("app", "v1"), docker.clone());
    let pusher = harness.pusher(PushOptions::builder().force_oci_media_types(true).build());

    pusher
        .push_images(&images("r1:\n  images:\n    app: [v1]\n"))
        .await
        .unwrap();

    let pushed = harness.destination.get_index(&Harness::dest("app", "v1")).unwrap();
    assert_eq!(pushed.media_type(), &MediaType::ImageIndex);
    assert_eq!(platforms(&pushed), platforms(&docker));
    for (descriptor, artifact) in pushed.entries() {
        assert_eq!(descriptor.media_type(), &MediaType::ImageManifest);
        let Artifact::Image(image) = artifact else {
            panic!("expected image child");
        };
        assert_eq!(descriptor.content_digest().unwrap(), image.digest());
        assert!(docker.entries().all(|(d, _)| d.digest() != descriptor.digest()));
    }
}

#[tokio::test]
async fn test_force_oci_leaves_oci_index_alone() {
    let harness = Harness::new();
    let index = two_platform_index("oci");
    harness.source.put_index(&Harness::src("app", "v1"), index.clone());
    let pusher = harness.pusher(PushOptions::builder().force_oci_media_types(true).build());

    pusher
        .push_images(&images("r1:\n  images:\n    app: [v1]\n"))
        .await
        .unwrap();

    let pushed = harness.destination.get_index(&Harness::dest("app", "v1")).unwrap();
    assert_eq!(pushed.digest(), index.digest());
    assert_eq!(harness.source.calls(Operation::FetchImage), 0);
}

#[tokio::test]
async fn test_merge_then_normalize_reads_destination_children() {
    let harness = Harness::new();
    let pushed = IndexFixture::docker()
        .image(ImageFixture::new("linux", "arm64").docker().build().unwrap())
        .build()
        .unwrap();
    harness.source.put_index(&Harness::src("app", "v1"), pushed);
    let existing = IndexFixture::docker()
        .image(ImageFixture::new("linux", "amd64").docker().label("old").build().unwrap())
        .image(ImageFixture::new("linux", "s390x").docker().label("old").build().unwrap())
        .build()
        .unwrap();
    harness.destination.put_index(&Harness::dest("app", "v1"), existing);
    let pusher = harness.pusher(
        PushOptions::builder()
            .on_existing_tag(ConflictPolicy::MergeOverwriteExisting)
            .force_oci_media_types(true)
            .build(),
    );

    pusher
        .push_images(&images("r1:\n  images:\n    app: [v1]\n"))
        .await
        .unwrap();

    let result = harness.destination.get_index(&Harness::dest("app", "v1")).unwrap();
    assert_eq!(result.media_type(), &MediaType::ImageIndex);
    assert_eq!(platforms(&result), ["linux/amd64", "linux/s390x", "linux/arm64"]);
    assert_eq!(harness.destination.calls(Operation::FetchImage), 2);
}

#[tokio::test]
async fn test_foreign_layers_are_not_copied() {
    let harness = Harness::new();
    let windows = ImageFixture::new("windows", "amd64")
        .docker()
        .foreign_layers(2)
        .layers(1)
        .build()
        .unwrap();
    let index = IndexFixture::docker().image(windows.clone()).build().unwrap();
    harness.source.put_index(&Harness::src("app", "v1"), index);
    let pusher = harness.pusher(PushOptions::builder().force_oci_media_types(true).build());

    pusher
        .push_images(&images("r1:
  images:
    app: [v1]
"))
        .await
        .unwrap();

    for foreign in &windows.layers()[..2] {
        assert!(!harness.destination.has_blob(&foreign.content_digest().unwrap()));
    }
    assert!(harness
        .destination
        .has_blob(&windows.layers()[2].content_digest().unwrap()));
    assert_eq!(harness.destination.blob_count(), 1);

    let pushed = harness.destination.get_index(&Harness::dest("app", "v1")).unwrap();
    let (_, Artifact::Image(image)) = pushed.entries().next().unwrap() else {
        panic!("expected image child");
    };
    assert_eq!(image.layers().len(), 3);
    assert!(image.layers()[..2].iter().all(|l| !l.is_distributable()));
}

// =============================================================================
// Charts
// =============================================================================

fn chart_set() -> ChartRepositorySet {
    let mut charts = ChartRepositorySet::new();
    charts.insert("https://stefanprodan.github.io/podinfo", "podinfo", ["6.0.0", "6.1.0"]);
    charts
}

fn seed_charts(harness: &Harness) {
    for version in ["6.0.0", "6.1.0"] {
        let chart = Registry::new("src")
            .repository(["charts", "podinfo"])
            .tag(version)
            .unwrap();
        harness.source.put_image(
            &chart,
            ImageFixture::new("linux", "amd64").label(version).build().unwrap(),
        );
    }
}

#[tokio::test]
async fn test_chart_versions_copied_in_order() {
    let harness = Harness::new();
    seed_charts(&harness);
    let hook = Arc::new(RecordingHook::default());
    let pusher = harness
        .pusher(PushOptions::builder().destination_path("mirror").build())
        .with_hook(hook.clone());

    let summary = pusher.copy_charts(&chart_set()).await.unwrap();

    assert_eq!(summary, PushSummary { pushed: 2, skipped: 0 });
    let destination = Registry::new("dest").repository(["mirror", "podinfo"]);
    assert_eq!(harness.destination.tags(&destination), ["6.0.0", "6.1.0"]);
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        hook.seen.lock()[0],
        ("dest/mirror/podinfo".to_string(), strings(&["6.0.0", "6.1.0"]))
    );
    assert_eq!(harness.progress.completed(), 2);
}

#[tokio::test]
async fn test_chart_skip_policy_checks_destination() {
    let harness = Harness::new();
    seed_charts(&harness);
    let existing = Registry::new("dest").repository(["podinfo"]).tag("6.0.0").unwrap();
    harness.destination.put_image(
        &existing,
        ImageFixture::new("linux", "amd64").label("old").build().unwrap(),
    );
    let pusher = harness.pusher(options(ConflictPolicy::Skip));

    let summary = pusher.copy_charts(&chart_set()).await.unwrap();

    assert_eq!(summary, PushSummary { pushed: 1, skipped: 1 });
    assert_eq!(harness.destination.calls(Operation::FetchDescriptor), 2);
    assert_eq!(harness.source.calls_matching(Operation::FetchImage, "6.0.0"), 0);
}

#[tokio::test]
async fn test_chart_error_policy_stops_at_existing_version() {
    let harness = Harness::new();
    seed_charts(&harness);
    let existing = Registry::new("dest").repository(["podinfo"]).tag("6.0.0").unwrap();
    harness.destination.put_image(
        &existing,
        ImageFixture::new("linux", "amd64").label("old").build().unwrap(),
    );
    let pusher = harness.pusher(options(ConflictPolicy::Error));

    let err = pusher.copy_charts(&chart_set()).await.unwrap_err();

    assert!(matches!(err, PushError::TagExists { .. }));
    assert_eq!(harness.destination.writes(), 0);
}
