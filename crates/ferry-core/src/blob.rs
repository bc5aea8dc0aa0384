//! Lazy access to config and layer blobs.
//!
//! Images carry descriptors, not layer bytes. A [`BlobSource`] opens a
//! layer as a byte stream only when it is copied, so a push holds at most
//! the chunks in flight rather than whole images.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use oci_spec::image::Descriptor;

use crate::digest::Digest;
use crate::error::{Error, Result};

/// A blob's bytes as they arrive.
pub type BlobStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Somewhere an image's blobs can be read from.
#[async_trait]
pub trait BlobSource: Send + Sync + fmt::Debug {
    /// Opens the blob `descriptor` points at.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlobNotFound`] if the source does not have the blob,
    /// or [`Error::BlobUnavailable`] if it could not be read.
    async fn open(&self, descriptor: &Descriptor) -> Result<BlobStream>;
}

/// Reads a whole blob into memory.
///
/// # Errors
///
/// Returns the error of opening the blob, or [`Error::BlobUnavailable`] if
/// the stream fails part way.
pub async fn read_blob(source: &dyn BlobSource, descriptor: &Descriptor) -> Result<Bytes> {
    let mut stream = source.open(descriptor).await?;
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.try_next().await.map_err(|source| Error::BlobUnavailable {
        digest: descriptor.digest().clone(),
        source: Box::new(source),
    })? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Blobs held in memory, keyed by digest.
#[derive(Debug, Clone, Default)]
pub struct InlineBlobs {
    blobs: HashMap<String, Bytes>,
}

impl InlineBlobs {
    /// Stores every blob in `blobs` under its sha256 digest.
    pub fn new(blobs: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            blobs: blobs
                .into_iter()
                .map(|blob| (Digest::sha256(&blob).to_string(), blob))
                .collect(),
        }
    }

    /// Returns the number of distinct blobs held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns true if no blobs are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobSource for InlineBlobs {
    async fn open(&self, descriptor: &Descriptor) -> Result<BlobStream> {
        let blob = self
            .blobs
            .get(descriptor.digest())
            .cloned()
            .ok_or_else(|| Error::BlobNotFound {
                digest: descriptor.digest().clone(),
            })?;
        Ok(stream::once(async move { Ok(blob) }).boxed())
    }
}
