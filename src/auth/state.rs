//! Authentication state traits and macro.

use super::AuthGateway;

/// Trait for state types that provide the gateway for authentication.
pub trait HasAuthBackend {
    fn gateway(&self) -> &AuthGateway;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have a `gateway: Arc<AuthGateway>` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub gateway: Arc<AuthGateway>,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn gateway(&self) -> &$crate::auth::AuthGateway {
                &self.gateway
            }
        }
    };
}
