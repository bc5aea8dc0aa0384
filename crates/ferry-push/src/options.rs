//! Run options.

use crate::error::{PushError, Result};
use crate::policy::ConflictPolicy;

/// Options applied to every tag and chart in a run.
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Maximum number of tags pushed at once.
    pub concurrency: usize,

    /// What to do with tags that already exist in the destination.
    pub on_existing_tag: ConflictPolicy,

    /// Rewrite indexes and their children to OCI media types before writing.
    pub force_oci_media_types: bool,

    /// Path prefix under the destination registry, without leading slashes.
    pub destination_path: String,

    /// Path prefix under the source registry where charts live.
    pub chart_source_path: String,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            on_existing_tag: ConflictPolicy::Overwrite,
            force_oci_media_types: false,
            destination_path: String::new(),
            chart_source_path: "charts".to_string(),
        }
    }
}

impl PushOptions {
    /// Creates an options builder.
    #[must_use]
    pub fn builder() -> PushOptionsBuilder {
        PushOptionsBuilder::default()
    }

    /// Checks the options before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(PushError::InvalidConfig {
                reason: "image push concurrency must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`PushOptions`].
#[derive(Debug, Default)]
pub struct PushOptionsBuilder {
    concurrency: Option<usize>,
    on_existing_tag: Option<ConflictPolicy>,
    force_oci_media_types: Option<bool>,
    destination_path: Option<String>,
    chart_source_path: Option<String>,
}

impl PushOptionsBuilder {
    /// Sets the concurrency limit.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Sets the conflict policy.
    #[must_use]
    pub fn on_existing_tag(mut self, policy: ConflictPolicy) -> Self {
        self.on_existing_tag = Some(policy);
        self
    }

    /// Enables or disables conversion to OCI media types.
    #[must_use]
    pub fn force_oci_media_types(mut self, force: bool) -> Self {
        self.force_oci_media_types = Some(force);
        self
    }

    /// Sets the destination path prefix. Leading slashes are dropped.
    #[must_use]
    pub fn destination_path(mut self, path: impl Into<String>) -> Self {
        self.destination_path = Some(path.into().trim_start_matches('/').to_string());
        self
    }

    /// Sets the path prefix charts are read from in the source registry.
    #[must_use]
    pub fn chart_source_path(mut self, path: impl Into<String>) -> Self {
        self.chart_source_path = Some(path.into());
        self
    }

    /// Builds the options.
    #[must_use]
    pub fn build(self) -> PushOptions {
        let defaults = PushOptions::default();
        PushOptions {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            on_existing_tag: self.on_existing_tag.unwrap_or(defaults.on_existing_tag),
            force_oci_media_types: self
                .force_oci_media_types
                .unwrap_or(defaults.force_oci_media_types),
            destination_path: self.destination_path.unwrap_or(defaults.destination_path),
            chart_source_path: self.chart_source_path.unwrap_or(defaults.chart_source_path),
        }
    }
}
