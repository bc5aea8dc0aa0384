//! Sequential copy of chart artifacts.
//!
//! Charts are single OCI manifests, so they are copied verbatim: no merge and
//! no media-type conversion.

use ferry_core::{ChartRepositorySet, Reference, Repository};
use tracing::Instrument;

use crate::error::{PushError, Result};
use crate::orchestrator::{invalid_input, PushSummary, Pusher};
use crate::policy::{decide, ConflictPolicy, Decision};

struct ChartCopy {
    source: Repository,
    destination: Repository,
    versions: Vec<String>,
}

impl Pusher {
    /// Copies every chart version in `charts`, one at a time.
    ///
    /// Repositories and charts are visited in sorted order and versions in
    /// the order given. Charts are read from `<chart_source_path>/<chart>` in
    /// the source registry. Pre-push hooks run once per chart, before its
    /// versions. Under the `Error` and `Skip` policies each version is looked
    /// up in the destination first.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::InvalidConfig`] before copying anything if a
    /// chart or version name is invalid, otherwise the first error met.
    pub async fn copy_charts(&self, charts: &ChartRepositorySet) -> Result<PushSummary> {
        let plan = self.plan_charts(charts)?;
        let run_id = uuid::Uuid::now_v7();
        let span = tracing::info_span!("copy_charts", run_id = %run_id);
        self.copy_chart_plan(plan).instrument(span).await
    }

    fn plan_charts(&self, charts: &ChartRepositorySet) -> Result<Vec<ChartCopy>> {
        let mut plan = Vec::new();
        for (_repository, chart, versions) in charts.iter() {
            let copy = ChartCopy {
                source: self
                    .source
                    .registry()
                    .repository([self.options.chart_source_path.as_str(), chart]),
                destination: self
                    .destination
                    .registry()
                    .repository([self.options.destination_path.as_str(), chart]),
                versions: versions.to_vec(),
            };
            for version in &copy.versions {
                copy.source.tag(version).map_err(invalid_input)?;
                copy.destination.tag(version).map_err(invalid_input)?;
            }
            plan.push(copy);
        }
        Ok(plan)
    }

    async fn copy_chart_plan(&self, plan: Vec<ChartCopy>) -> Result<PushSummary> {
        let total: usize = plan.iter().map(|copy| copy.versions.len()).sum();
        tracing::info!(charts = plan.len(), versions = total, "starting chart copy");
        self.progress.set_capacity(total);

        let mut summary = PushSummary::default();
        for copy in &plan {
            for hook in &self.hooks {
                hook.before_push(&copy.destination, &copy.versions)
                    .await
                    .map_err(|source| PushError::HookFailed {
                        repository: copy.destination.to_string(),
                        source,
                    })?;
            }

            for version in &copy.versions {
                let source = copy.source.tag(version).map_err(invalid_input)?;
                let destination = copy.destination.tag(version).map_err(invalid_input)?;

                let exists = self.chart_exists(&destination).await?;
                match decide(self.options.on_existing_tag, exists) {
                    Decision::Proceed => {
                        self.copy_chart(&source, &destination).await?;
                        summary.pushed += 1;
                    }
                    Decision::Skip => {
                        tracing::debug!(destination = %destination, "chart version exists, skipping");
                        summary.skipped += 1;
                    }
                    Decision::Abort => {
                        return Err(PushError::TagExists {
                            reference: destination.to_string(),
                        });
                    }
                }
                self.progress.advance();
            }
        }

        tracing::info!(
            pushed = summary.pushed,
            skipped = summary.skipped,
            "chart copy complete"
        );
        Ok(summary)
    }

    async fn chart_exists(&self, destination: &Reference) -> Result<bool> {
        if !matches!(
            self.options.on_existing_tag,
            ConflictPolicy::Error | ConflictPolicy::Skip
        ) {
            return Ok(false);
        }
        match self.destination.transport().fetch_descriptor(destination).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_absent() => Ok(false),
            Err(err) => Err(PushError::transport("look up", destination)(err)),
        }
    }

    async fn copy_chart(&self, source: &Reference, destination: &Reference) -> Result<()> {
        let chart = self
            .source
            .transport()
            .fetch_image(source)
            .await
            .map_err(PushError::transport("fetch chart", source))?;
        self.destination
            .transport()
            .write_image(destination, &chart)
            .await
            .map_err(PushError::transport("write chart to", destination))?;

        tracing::info!(
            source = %source,
            destination = %destination,
            digest = %chart.digest(),
            "copied chart"
        );
        Ok(())
    }
}
