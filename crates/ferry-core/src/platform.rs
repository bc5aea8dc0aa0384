//! Platform matching for multi-architecture content.

use oci_spec::image::{Arch, Os, Platform, PlatformBuilder};

use crate::error::{Error, Result};

/// Extension of [`Platform`]
pub trait PlatformEx: Sized {
    /// Creates a platform from an OS and architecture.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is empty.
    fn from_parts(os: &str, architecture: &str, variant: Option<&str>) -> Result<Self>;

    /// Parses `os/arch[/variant][:os.version]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPlatform`] if os or architecture is missing or
    /// there are more than three `/`-separated parts.
    fn parse(value: &str) -> Result<Self>;

    /// Renders the platform as `os/arch[/variant][:os.version]`.
    fn describe(&self) -> String;

    /// Returns true if this platform satisfies `wanted`.
    ///
    /// Every field `wanted` sets must match: os, architecture, variant and
    /// os.version by equality, features and os.features by inclusion. Fields
    /// it leaves empty match anything.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferry_core::{Platform, PlatformEx};
    ///
    /// let arm = Platform::parse("linux/arm64/v8")?;
    /// assert!(arm.satisfies(&Platform::parse("linux/arm64")?));
    /// assert!(!Platform::parse("linux/arm64")?.satisfies(&arm));
    /// # Ok::<(), ferry_core::Error>(())
    /// ```
    fn satisfies(&self, wanted: &Self) -> bool;
}

impl PlatformEx for Platform {
    fn from_parts(os: &str, architecture: &str, variant: Option<&str>) -> Result<Self> {
        if os.is_empty() || architecture.is_empty() {
            return Err(Error::InvalidPlatform {
                value: format!("{os}/{architecture}"),
            });
        }
        let mut builder = PlatformBuilder::default()
            .os(Os::from(os))
            .architecture(Arch::from(architecture));
        if let Some(variant) = variant.filter(|v| !v.is_empty()) {
            builder = builder.variant(variant);
        }
        Ok(builder.build()?)
    }

    fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidPlatform {
            value: value.to_string(),
        };

        let (parts, os_version) = match value.split_once(':') {
            Some((parts, version)) => (parts, Some(version)),
            None => (value, None),
        };

        let mut parts = parts.split('/');
        let os = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let arch = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let variant = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }

        let mut platform = Self::from_parts(os, arch, variant)?;
        if let Some(version) = os_version.filter(|v| !v.is_empty()) {
            platform.set_os_version(Some(version.to_string()));
        }
        Ok(platform)
    }

    fn describe(&self) -> String {
        let mut rendered = format!("{}/{}", self.os(), self.architecture());
        if let Some(variant) = self.variant() {
            rendered.push('/');
            rendered.push_str(variant);
        }
        if let Some(os_version) = self.os_version() {
            rendered.push(':');
            rendered.push_str(os_version);
        }
        rendered
    }

    fn satisfies(&self, wanted: &Self) -> bool {
        fn field_matches(have: &str, want: &str) -> bool {
            want.is_empty() || have == want
        }
        fn option_matches(have: Option<&String>, want: Option<&String>) -> bool {
            match want {
                None => true,
                Some(w) if w.is_empty() => true,
                Some(w) => have == Some(w),
            }
        }
        fn subset(have: Option<&Vec<String>>, want: Option<&Vec<String>>) -> bool {
            want.map_or(true, |want| {
                want.iter()
                    .all(|f| have.is_some_and(|have| have.contains(f)))
            })
        }

        field_matches(&self.os().to_string(), &wanted.os().to_string())
            && field_matches(
                &self.architecture().to_string(),
                &wanted.architecture().to_string(),
            )
            && option_matches(self.variant().as_ref(), wanted.variant().as_ref())
            && option_matches(self.os_version().as_ref(), wanted.os_version().as_ref())
            && subset(self.features().as_ref(), wanted.features().as_ref())
            && subset(self.os_features().as_ref(), wanted.os_features().as_ref())
    }
}
