//! Authentication hook for resolving who is on the other end of an
//! upgraded connection.
//!
//! Huddle does not implement authentication itself. The server reads the
//! `token` query parameter from the upgrade request and hands it to an
//! [`Authenticator`]; whatever [`UserId`] comes back is stamped as the
//! sender of everything that connection submits. A rejected token closes
//! the connection before it ever reaches the hub.

use std::future::Future;

use huddle_protocol::UserId;

use crate::HuddleError;

/// Validates a client's token and returns its identity.
///
/// # Example
///
/// ```rust
/// use huddle::{Authenticator, HuddleError};
/// use huddle::protocol::UserId;
///
/// /// Treats any non-empty token as the user name. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<UserId, HuddleError> {
///         if token.is_empty() {
///             return Err(HuddleError::AuthFailed("missing token".into()));
///         }
///         Ok(UserId::new(token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Resolves `token` to a user.
    ///
    /// `token` is empty when the upgrade request carried none.
    /// Return [`HuddleError::AuthFailed`] to reject the connection.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<UserId, HuddleError>> + Send;
}
