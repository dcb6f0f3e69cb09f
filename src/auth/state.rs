//! Authentication state trait and macro.

use crate::session::SessionManager;

/// Trait for state types that provide the session manager used by the auth
/// extractors.
pub trait HasAuthState {
    fn sessions(&self) -> &SessionManager;
}

/// Macro to implement `HasAuthState` for state structs with a `sessions` field.
///
/// The field must be a `SessionManager`.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_state;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub sessions: SessionManager,
///     // ... other fields
/// }
///
/// impl_has_auth_state!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_state {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthState for $state_type {
            fn sessions(&self) -> &$crate::session::SessionManager {
                &self.sessions
            }
        }
    };
}
