//! Registry, repository and reference addressing.

use std::fmt;

use crate::digest::Digest;
use crate::error::{Error, Result};

/// Maximum tag length accepted by registries.
const MAX_TAG_LEN: usize = 128;

/// A registry host, optionally with a port (`registry.example.com:5000`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Registry {
    host: String,
}

impl Registry {
    /// Creates a registry address from a host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Returns the host (and port, if any).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Builds a repository in this registry by joining path parts with `/`.
    ///
    /// Empty parts and leading or trailing slashes are dropped, so a missing
    /// destination path prefix simply disappears.
    ///
    /// ```
    /// use ferry_core::Registry;
    ///
    /// let repo = Registry::new("localhost:5000").repository(["", "/charts/", "podinfo"]);
    /// assert_eq!(repo.name(), "charts/podinfo");
    /// ```
    #[must_use]
    pub fn repository<I, S>(&self, parts: I) -> Repository
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = parts
            .into_iter()
            .map(|p| p.as_ref().trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Repository {
            registry: self.clone(),
            name,
        }
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

/// A repository within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Repository {
    registry: Registry,
    name: String,
}

impl Repository {
    /// Returns the registry this repository lives in.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the repository path, without the registry host.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to `tag` in this repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReference`] if the repository name or the tag
    /// is not valid.
    pub fn tag(&self, tag: impl Into<String>) -> Result<Reference> {
        let tag = tag.into();
        self.validate()?;
        validate_tag(&tag).map_err(|reason| Error::InvalidReference {
            reference: format!("{self}:{tag}"),
            reason,
        })?;
        Ok(Reference {
            repository: self.clone(),
            target: Target::Tag(tag),
        })
    }

    /// Returns a reference to content by digest in this repository.
    #[must_use]
    pub fn digest(&self, digest: Digest) -> Reference {
        Reference {
            repository: self.clone(),
            target: Target::Digest(digest),
        }
    }

    /// Checks the repository name against registry naming rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReference`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name).map_err(|reason| Error::InvalidReference {
            reference: self.to_string(),
            reason,
        })
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.name)
    }
}

/// What a reference points at inside its repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A mutable tag.
    Tag(String),
    /// Immutable content by digest.
    Digest(Digest),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => f.write_str(tag),
            Self::Digest(digest) => write!(f, "{digest}"),
        }
    }
}

/// A fully qualified reference: `registry/repository:tag` or
/// `registry/repository@digest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    repository: Repository,
    target: Target,
}

impl Reference {
    /// Returns the repository part.
    #[must_use]
    pub const fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Returns the tag or digest part.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the tag, if this is a tag reference.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.target {
            Target::Tag(tag) => Some(tag),
            Target::Digest(_) => None,
        }
    }

    /// Returns a reference to `digest` in the same repository.
    #[must_use]
    pub fn with_digest(&self, digest: Digest) -> Self {
        self.repository.digest(digest)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Tag(tag) => write!(f, "{}:{tag}", self.repository),
            Target::Digest(digest) => write!(f, "{}@{digest}", self.repository),
        }
    }
}

fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("repository name must not be empty".to_string());
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err("repository path components must not be empty".to_string());
        }
        if !component
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
        {
            return Err(format!(
                "component '{component}' must contain only lowercase letters, digits and separators"
            ));
        }
        let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        let bytes = component.as_bytes();
        if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
            return Err(format!(
                "component '{component}' must start and end with a letter or digit"
            ));
        }
    }
    Ok(())
}

fn validate_tag(tag: &str) -> std::result::Result<(), String> {
    let Some(first) = tag.bytes().next() else {
        return Err("tag must not be empty".to_string());
    };
    if tag.len() > MAX_TAG_LEN {
        return Err(format!("tag longer than {MAX_TAG_LEN} characters"));
    }
    if !(first.is_ascii_alphanumeric() || first == b'_') {
        return Err("tag must start with a letter, digit or underscore".to_string());
    }
    if !tag
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
    {
        return Err("tag contains invalid characters".to_string());
    }
    Ok(())
}
