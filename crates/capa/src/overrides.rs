//! Temporary replacement of an api function's behavior.
//!
//! An override occupies the highest-precedence slot: while installed it
//! handles every call, in or out of mock mode, with no delay floor.
//! [`override_api`] returns an [`OverrideHandle`] whose removal is
//! compare-and-clear: the handle only clears the slot if its own
//! override is still the one installed, so a stale handle can never tear
//! down a replacement installed after it.

use std::fmt;
use std::sync::Arc;

use crate::callable::{ApiCallable, CallFn};
use crate::function::{ApiFunction, ApiId};
use crate::result::{ApiError, ApiResult};

/// Install `override_fn` on `api`, displacing any active override.
///
/// Rejects callables that are themselves api functions; wrap those with
/// a direct-call adapter first so dispatch layers do not nest silently.
pub fn override_api<A, T, E>(
    api: &ApiFunction<A, T, E>,
    override_fn: impl Into<ApiCallable<A, T, E>>,
) -> ApiResult<OverrideHandle>
where
    A: 'static,
    T: 'static,
    E: 'static,
{
    let callable = override_fn.into();
    if let Some(id) = callable.wraps() {
        return Err(ApiError::InvalidArgument {
            message: format!(
                "{id} is an api function and cannot be installed as an override; wrap it with a direct-call adapter"
            ),
        });
    }

    let token: CallFn<A, T, E> = Arc::clone(&callable.func);
    let inner = Arc::clone(&api.inner);
    {
        let mut slots = inner.slots.lock().unwrap();
        if slots.override_slot.is_some() {
            tracing::debug!(api = %inner.id, "replacing an active override");
        } else {
            tracing::debug!(api = %inner.id, "override installed");
        }
        slots.override_slot = Some(callable);
    }

    let target = Arc::clone(&inner);
    let remove = Arc::new(move || {
        let mut slots = target.slots.lock().unwrap();
        let still_ours = slots
            .override_slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(&current.func, &token));
        if !still_ours {
            return false;
        }
        slots.override_slot = None;
        drop(slots);
        tracing::debug!(api = %target.id, "override removed");
        target.forward_clear();
        true
    });

    Ok(OverrideHandle {
        api_id: inner.id.clone(),
        remove,
    })
}

/// Removal token for one installed override.
pub struct OverrideHandle {
    api_id: ApiId,
    remove: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl OverrideHandle {
    /// Remove the override this handle installed, restoring the next
    /// slot in precedence and forwarding the function's cache clear.
    ///
    /// Returns `false` without touching anything when the override has
    /// already been replaced or removed.
    pub fn remove(&self) -> bool {
        (self.remove)()
    }

    /// Identity of the api function this handle points at.
    #[must_use]
    pub fn api_id(&self) -> &ApiId {
        &self.api_id
    }
}

impl fmt::Debug for OverrideHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OverrideHandle").field(&self.api_id).finish()
    }
}
