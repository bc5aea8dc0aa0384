//! Merging a pushed index with the index already behind a destination tag.
//!
//! Entries are matched by platform. Of two entries for the same platform,
//! the one from `merge_from` wins; entries without a platform (attestations,
//! signatures) are always kept.

use ferry_core::{
    Error, ImageIndex, IndexEntry, MediaType, MediaTypeEx, Platform, PlatformEx, Reference,
};
use ferry_registry::Transport;

use crate::error::{PushError, Result};

/// Merges two indexes, with `merge_from` winning platform conflicts.
///
/// The result keeps the entries of `merge_into` whose platform does not
/// satisfy any platform listed in `merge_from`, followed by every entry of
/// `merge_from` in its original order. It takes the media type, annotations
/// and subject of `merge_into`, or of `merge_from` when `merge_into` is
/// empty.
///
/// # Errors
///
/// Returns an error if `merge_from` has a child that is neither an image nor
/// an index.
pub fn merge(merge_from: &ImageIndex, merge_into: &ImageIndex) -> ferry_core::Result<ImageIndex> {
    let from_platforms: Vec<&Platform> = merge_from
        .entries()
        .filter_map(|(descriptor, _)| descriptor.platform().as_ref())
        .collect();

    for (descriptor, _) in merge_from.entries() {
        let media_type = descriptor.media_type();
        if !media_type.is_image() && !media_type.is_index() {
            return Err(Error::InvalidManifest {
                reason: format!(
                    "unexpected child {} with media type {media_type}",
                    descriptor.digest()
                ),
            });
        }
    }

    let retained = merge_into.entries().filter(|(descriptor, _)| {
        descriptor.platform().as_ref().map_or(true, |platform| {
            !from_platforms.iter().any(|from| platform.satisfies(from))
        })
    });

    let entries: Vec<IndexEntry> = retained
        .chain(merge_from.entries())
        .map(|(descriptor, artifact)| IndexEntry::new(descriptor.clone(), artifact.clone()))
        .collect();

    if merge_into.is_empty() {
        merge_from.with_entries(entries)
    } else {
        merge_into.with_entries(entries)
    }
}

/// Returns the index currently behind `reference` in the destination.
///
/// A missing tag yields an empty OCI index. A single-platform image is
/// wrapped in a one-entry index so it can take part in a merge. Only
/// manifests and configs are fetched; layers stay with the destination.
///
/// # Errors
///
/// Returns an error if the lookup fails for any reason other than the tag
/// not existing, or if the tag holds something that is neither an image nor
/// an index.
pub async fn fetch_existing_index(
    transport: &dyn Transport,
    reference: &Reference,
) -> Result<ImageIndex> {
    let descriptor = match transport.fetch_descriptor(reference).await {
        Ok(descriptor) => descriptor,
        Err(err) if err.is_not_found() => {
            tracing::debug!(reference = %reference, "no existing index, merging into empty index");
            return empty_index(reference);
        }
        Err(err) => {
            return Err(PushError::transport("fetch existing descriptor of", reference)(err));
        }
    };

    if descriptor.media_type().is_index() {
        return transport
            .fetch_index(reference)
            .await
            .map_err(PushError::transport("fetch existing index", reference));
    }

    if descriptor.media_type().is_image() {
        let image = transport
            .fetch_image(reference)
            .await
            .map_err(PushError::transport("fetch existing image", reference))?;
        return ImageIndex::for_single_platform_image(image).map_err(|source| {
            PushError::Content {
                reference: reference.to_string(),
                source,
            }
        });
    }

    Err(PushError::UnexpectedMediaType {
        reference: reference.to_string(),
        media_type: descriptor.media_type().to_string(),
    })
}

fn empty_index(reference: &Reference) -> Result<ImageIndex> {
    ImageIndex::empty(MediaType::ImageIndex).map_err(|source| PushError::Content {
        reference: reference.to_string(),
        source,
    })
}
