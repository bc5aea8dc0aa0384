//! # Ferry Core
//!
//! Artifact reference model and OCI content types shared by every ferry crate.
//!
//! This crate provides:
//!
//! - **Addressing**: [`Registry`], [`Repository`] and [`Reference`] (tag or digest)
//! - **Content descriptors**: the [`oci_spec`] image types ([`Descriptor`],
//!   [`MediaType`], [`Platform`]) with ferry's [`DescriptorEx`],
//!   [`MediaTypeEx`] and [`PlatformEx`] extensions, and [`Digest`]
//! - **Content values**: [`Image`] and [`ImageIndex`], immutable once digested,
//!   with layers read lazily through a [`BlobSource`]
//! - **Run inputs**: [`RegistryImageSet`] and [`ChartRepositorySet`]
//!
//! ## Example
//!
//! ```rust
//! use ferry_core::{Digest, Registry};
//!
//! let registry = Registry::new("registry.example.com");
//! let repository = registry.repository(["mirror", "library/nginx"]);
//! let reference = repository.tag("1.27")?;
//!
//! assert_eq!(reference.to_string(), "registry.example.com/mirror/library/nginx:1.27");
//!
//! let digest = Digest::sha256(b"hello");
//! assert_eq!(digest.algorithm(), "sha256");
//! # Ok::<(), ferry_core::Error>(())
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod blob;
mod descriptor;
mod digest;
mod error;
mod image;
mod index;
pub mod media_types;
mod platform;
mod reference;
mod sets;

pub use blob::{read_blob, BlobSource, BlobStream, InlineBlobs};
pub use descriptor::{descriptor, DescriptorEx};
pub use digest::Digest;
pub use error::{Error, Result};
pub use image::{Image, ImageConfig};
pub use index::{Artifact, ImageIndex, IndexEntry};
pub use media_types::MediaTypeEx;
pub use oci_spec::image::{
    Descriptor, ImageIndex as IndexManifest, ImageIndexBuilder, ImageManifest,
    ImageManifestBuilder, MediaType, Platform,
};
pub use platform::PlatformEx;
pub use reference::{Reference, Registry, Repository, Target};
pub use sets::{ChartRepository, ChartRepositorySet, RegistryImageSet, RegistryImages};
