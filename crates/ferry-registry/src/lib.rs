//! # Ferry Registry
//!
//! Registry access for ferry replication runs.
//!
//! This crate provides:
//!
//! - **[`Transport`]**: the operations replication needs from a registry
//!   (list tags, resolve a descriptor, fetch and write images and indexes)
//! - **[`RegistryClient`]**: an implementation over the OCI Distribution API
//! - **[`RegistryError`]**: an error taxonomy that separates "no such
//!   content" from real failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferry_registry::{RegistryAuth, RegistryClient, RegistryConfig, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig::new("https://registry.example.com")
//!         .with_auth(RegistryAuth::basic("robot", "secret"));
//!     let client = RegistryClient::new(config)?;
//!
//!     let repository = client.registry().repository(["mirror", "library/nginx"]);
//!     let tags = client.list_tags(&repository).await?;
//!     println!("{} tags", tags.len());
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod config;
mod error;
mod transport;

pub use client::RegistryClient;
pub use config::{RegistryAuth, RegistryConfig, TlsConfig};
pub use error::RegistryError;
pub use transport::Transport;
