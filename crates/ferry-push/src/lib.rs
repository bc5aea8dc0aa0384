//! # Ferry Push
//!
//! Replicates bundled images and charts from a source registry into a
//! destination registry.
//!
//! # Overview
//!
//! - **Conflict policy**: what to do when a destination tag already exists
//!   ([`ConflictPolicy`], [`decide`])
//! - **Index merge**: platform-aware merge of a pushed index with the one
//!   already at the destination ([`merge`])
//! - **OCI normalization**: rebuilding Docker manifest lists and their
//!   children with OCI media types ([`normalize`])
//! - **Push orchestration**: bounded-concurrency push with once-per-repository
//!   preparation and cancel-on-first-error ([`Pusher::push_images`])
//! - **Chart copy**: sequential copy of chart artifacts
//!   ([`Pusher::copy_charts`])
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferry_core::{Registry, RegistryImageSet};
//! use ferry_push::{ConflictPolicy, Endpoint, LogProgress, PushOptions, Pusher};
//!
//! let options = PushOptions::builder()
//!     .concurrency(4)
//!     .on_existing_tag(ConflictPolicy::MergeOverwriteExisting)
//!     .build();
//! let pusher = Pusher::new(
//!     Endpoint::new(source_client, Registry::new("127.0.0.1:5000")),
//!     Endpoint::new(destination_client, Registry::new("registry.example.com")),
//!     options,
//! )?
//! .with_progress(Arc::new(LogProgress::new("Pushing bundled images")));
//!
//! let images = RegistryImageSet::from_yaml_file("images.yaml")?;
//! let summary = pusher.push_images(&images).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::significant_drop_tightening)]

mod cancel;
pub mod charts;
pub mod error;
pub mod hooks;
pub mod merge;
pub mod normalize;
pub mod options;
pub mod orchestrator;
pub mod policy;
mod prepare;
pub mod progress;


pub use error::{PushError, Result};
pub use hooks::{HookError, PrePushHook};
pub use merge::{fetch_existing_index, merge};
pub use normalize::{normalize, rebuild_as_oci, ArtifactSource, TransportSource};
pub use options::{PushOptions, PushOptionsBuilder};
pub use orchestrator::{Endpoint, PushSummary, Pusher};
pub use policy::{decide, ConflictPolicy, Decision};
pub use progress::{LogProgress, ProgressGauge, ProgressSink};
