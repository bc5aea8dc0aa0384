//! Pre-push hooks.
//!
//! Hooks run before anything is written to a destination repository, for
//! example to create the repository in registries that do not create
//! repositories on first push.

use async_trait::async_trait;
use ferry_core::Repository;

/// Error type returned by hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A callback invoked once per destination repository before pushing.
///
/// Closures with the signature
/// `Fn(&Repository, &[String]) -> Result<(), HookError>` implement this
/// trait.
///
/// # Examples
///
/// ```
/// use ferry_core::Repository;
/// use ferry_push::{HookError, PrePushHook};
///
/// fn assert_hook(_: &dyn PrePushHook) {}
///
/// let hook = |repository: &Repository, tags: &[String]| -> Result<(), HookError> {
///     println!("pushing {} tags to {repository}", tags.len());
///     Ok(())
/// };
/// assert_hook(&hook);
/// ```
#[async_trait]
pub trait PrePushHook: Send + Sync {
    /// Called with the destination repository and every tag about to be
    /// pushed to it.
    async fn before_push(&self, repository: &Repository, tags: &[String]) -> Result<(), HookError>;
}

#[async_trait]
impl<F> PrePushHook for F
where
    F: Fn(&Repository, &[String]) -> Result<(), HookError> + Send + Sync,
{
    async fn before_push(&self, repository: &Repository, tags: &[String]) -> Result<(), HookError> {
        self(repository, tags)
    }
}
