//! Bulk teardown for overrides.
//!
//! Scenario setup often installs a handful of overrides that must all
//! come down together. An [`OverrideGroup`] collects the handles as they
//! are created and removes every one with a single call, in insertion
//! order, relying on each handle's compare-and-clear removal so handles
//! that went stale in the meantime are skipped harmlessly.

use crate::callable::ApiCallable;
use crate::function::ApiFunction;
use crate::overrides::{override_api, OverrideHandle};
use crate::result::ApiResult;

/// An ordered collection of override handles torn down as one unit.
#[derive(Debug, Default)]
pub struct OverrideGroup {
    handles: Vec<OverrideHandle>,
}

impl OverrideGroup {
    /// New empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `override_fn` on `api` and keep the handle in this group.
    pub fn add<A, T, E>(
        &mut self,
        api: &ApiFunction<A, T, E>,
        override_fn: impl Into<ApiCallable<A, T, E>>,
    ) -> ApiResult<&mut Self>
    where
        A: 'static,
        T: 'static,
        E: 'static,
    {
        self.handles.push(override_api(api, override_fn)?);
        Ok(self)
    }

    /// Adopt a handle created elsewhere.
    pub fn add_handle(&mut self, handle: OverrideHandle) -> &mut Self {
        self.handles.push(handle);
        self
    }

    /// Absorb another group's handles, after this group's own, keeping
    /// their relative order.
    pub fn add_group(&mut self, group: OverrideGroup) -> &mut Self {
        self.handles.extend(group.handles);
        self
    }

    /// Remove every collected override in insertion order and empty the
    /// group. Stale handles are skipped by their own removal check.
    pub fn remove_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.remove();
        }
    }

    /// Number of handles currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the group holds no handles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
