//! The api function entity and its factories.
//!
//! [`create_get_api`] and [`create_set_api`] wrap a plain async callable
//! into an [`ApiFunction`]: a named, uniquely identified unit whose every
//! invocation runs through the dispatcher (override, then mock path, then
//! original). The entity owns its mock and override slots exclusively;
//! other components mutate them only through the methods here and the
//! controllers in [`overrides`](crate::overrides).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::callable::{ApiCallable, BoxCallFuture, ClearFn};
use crate::dispatch::{dispatch, DispatchOptions};
use crate::global::global_layer;
use crate::layer::{ApiLayer, LayerInner};
use crate::mock::{FixtureCodec, MockRef};
use crate::overrides::{override_api, OverrideHandle};
use crate::result::{ApiError, ApiResult};

static NEXT_API_SEQ: AtomicU64 = AtomicU64::new(0);

/// Name assigned when the caller supplies none.
const UNNAMED_API: &str = "unknown";

/// Process-unique identity of an api function.
///
/// Combines a monotonic counter with the human-readable name given at
/// creation; never reused, never colliding, even across repeated creation
/// under the same name. Renders as `api_{seq}_{name}`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiId {
    seq: u64,
    name: Arc<str>,
}

impl ApiId {
    fn next(name: &str) -> Self {
        let trimmed = name.trim();
        let name = if trimmed.is_empty() { UNNAMED_API } else { trimmed };
        Self {
            seq: NEXT_API_SEQ.fetch_add(1, Ordering::SeqCst) + 1,
            name: Arc::from(name),
        }
    }

    /// Human-readable name this id was created under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Monotonic sequence number; the collision-free part of the id.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api_{}_{}", self.seq, self.name)
    }
}

impl fmt::Debug for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiId({self})")
    }
}

/// Whether an api function reads or mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    /// Non-mutating, cacheable; a valid invalidation target
    Get,
    /// Mutating; a successful call invalidates declared dependents
    Set,
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// Which clear hooks a cache-clear signal reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearForwarding {
    /// Only the wrapped original's hook (the common case)
    #[default]
    OriginalOnly,
    /// The original's hook plus any hooks carried by the currently
    /// installed mock and override
    Aggregate,
}

/// Creation options for the api function factories.
#[derive(Debug, Clone, Default)]
pub struct ApiOptions {
    /// Human-readable name; `unknown` when absent
    pub api_name: Option<String>,
    /// Layer to install into; the global layer when absent
    pub layer: Option<ApiLayer>,
    /// Function-local mock delay, taking precedence over the layer's
    pub mock_delay_ms: Option<u64>,
    /// Clear-signal routing
    pub clear_forwarding: ClearForwarding,
}

impl ApiOptions {
    /// Set the human-readable name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.api_name = Some(name.into());
        self
    }

    /// Install into this layer instead of the global one.
    #[must_use]
    pub fn with_layer(mut self, layer: &ApiLayer) -> Self {
        self.layer = Some(layer.clone());
        self
    }

    /// Function-local mock delay in milliseconds.
    #[must_use]
    pub fn with_mock_delay_ms(mut self, delay_ms: u64) -> Self {
        self.mock_delay_ms = Some(delay_ms);
        self
    }

    /// Route clear signals to mock/override hooks as well.
    #[must_use]
    pub fn with_clear_forwarding(mut self, forwarding: ClearForwarding) -> Self {
        self.clear_forwarding = forwarding;
        self
    }
}

/// Mutable behavior slots of an api function.
pub(crate) struct Slots<A, T, E> {
    pub(crate) mock: Option<ApiCallable<A, T, E>>,
    pub(crate) mock_ref: Option<MockRef>,
    pub(crate) codec: Option<FixtureCodec<A, T>>,
    pub(crate) override_slot: Option<ApiCallable<A, T, E>>,
    pub(crate) mock_delay_ms: Option<u64>,
}

/// Shared state behind an [`ApiFunction`] handle.
pub(crate) struct ApiFnInner<A, T, E> {
    pub(crate) id: ApiId,
    pub(crate) kind: ApiKind,
    pub(crate) original: ApiCallable<A, T, E>,
    pub(crate) layer: Weak<LayerInner>,
    pub(crate) slots: Mutex<Slots<A, T, E>>,
    pub(crate) dependents: Vec<ApiHandle>,
    pub(crate) clear_forwarding: ClearForwarding,
    pub(crate) last_seen_epoch: AtomicU64,
}

impl<A, T, E> ApiFnInner<A, T, E> {
    /// Forward a cache-clear signal per the configured routing.
    ///
    /// Hooks run outside the slot lock so they may call back into the
    /// entity.
    pub(crate) fn forward_clear(&self) {
        let extra: Vec<ClearFn> = if self.clear_forwarding == ClearForwarding::Aggregate {
            let slots = self.slots.lock().unwrap();
            slots
                .mock
                .iter()
                .chain(slots.override_slot.iter())
                .filter_map(|callable| callable.clear.clone())
                .collect()
        } else {
            Vec::new()
        };
        tracing::debug!(api = %self.id, "forwarding cache clear");
        self.original.run_clear();
        for hook in extra {
            hook();
        }
    }
}

/// Type-erased view of an api function: what layers store and what a
/// set-kind function holds dependents as.
pub(crate) trait ErasedApi: Send + Sync {
    fn id(&self) -> &ApiId;
    fn kind(&self) -> ApiKind;
    fn clear_cache(&self);
    fn clear_override(&self);
    fn mock_capable(&self) -> bool;
    fn note_epoch(&self, epoch: u64);
}

impl<A, T, E> ErasedApi for ApiFnInner<A, T, E> {
    fn id(&self) -> &ApiId {
        &self.id
    }

    fn kind(&self) -> ApiKind {
        self.kind
    }

    fn clear_cache(&self) {
        self.forward_clear();
    }

    fn clear_override(&self) {
        self.slots.lock().unwrap().override_slot = None;
    }

    fn mock_capable(&self) -> bool {
        let slots = self.slots.lock().unwrap();
        slots.mock.is_some() || slots.mock_ref.is_some()
    }

    fn note_epoch(&self, epoch: u64) {
        self.last_seen_epoch.store(epoch, Ordering::SeqCst);
    }
}

/// Cloneable, type-erased handle to an api function.
///
/// Used as the layer's registry entry and as a set-kind function's
/// dependent declaration; obtained with [`ApiFunction::handle`].
#[derive(Clone)]
pub struct ApiHandle {
    pub(crate) inner: Arc<dyn ErasedApi>,
}

impl ApiHandle {
    /// Unique id of the referenced api function.
    #[must_use]
    pub fn id(&self) -> &ApiId {
        self.inner.id()
    }

    /// Kind of the referenced api function.
    #[must_use]
    pub fn kind(&self) -> ApiKind {
        self.inner.kind()
    }

    pub(crate) fn clear_cache(&self) {
        self.inner.clear_cache();
    }

    pub(crate) fn clear_override(&self) {
        self.inner.clear_override();
    }

    pub(crate) fn mock_capable(&self) -> bool {
        self.inner.mock_capable()
    }

    pub(crate) fn note_epoch(&self, epoch: u64) {
        self.inner.note_epoch(epoch);
    }
}

impl PartialEq for ApiHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ApiHandle {}

impl fmt::Debug for ApiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiHandle").field(self.id()).finish()
    }
}

/// A wrapped, controllable async function.
///
/// Cloneable handle; clones share identity and slots. Invoke with
/// [`call`](Self::call), control with the mutators below, and tear down by
/// dropping the owning [`ApiLayer`] (after which dispatch fails with
/// [`ApiError::NotFound`]).
pub struct ApiFunction<A, T, E = ApiError> {
    pub(crate) inner: Arc<ApiFnInner<A, T, E>>,
}

impl<A, T, E> Clone for ApiFunction<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T, E> fmt::Debug for ApiFunction<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiFunction")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

impl<A, T, E> ApiFunction<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    /// Invoke the function through the dispatcher.
    pub fn call(&self, args: A) -> BoxCallFuture<T, E> {
        dispatch(Arc::clone(&self.inner), args, DispatchOptions::default())
    }

    /// Signal the wrapped function's cache (if any) to discard its data.
    pub fn clear(&self) {
        self.inner.forward_clear();
    }

    /// Install the default canned behavior used on the mock path.
    ///
    /// Replaces any previously installed mock. An api function cannot be
    /// installed as a mock directly; wrap it with
    /// [`call_api_function`](crate::call_api_function) first.
    pub fn install_mock(&self, mock: impl Into<ApiCallable<A, T, E>>) -> ApiResult<()> {
        let mock = mock.into();
        if let Some(id) = mock.wraps() {
            return Err(ApiError::InvalidArgument {
                message: format!("{id} is an api function and cannot serve as a mock"),
            });
        }
        self.inner.slots.lock().unwrap().mock = Some(mock);
        Ok(())
    }

    /// Remove the installed mock, if any.
    pub fn clear_mock(&self) {
        self.inner.slots.lock().unwrap().mock = None;
    }

    /// Remove the symbolic mock reference, if any.
    ///
    /// The fixture codec attached alongside it is kept, so an alternate
    /// reference supplied through the direct-call adapter keeps working.
    pub fn clear_mock_ref(&self) {
        self.inner.slots.lock().unwrap().mock_ref = None;
    }

    /// Install an override; see [`override_api`](crate::override_api).
    pub fn install_override(
        &self,
        override_fn: impl Into<ApiCallable<A, T, E>>,
    ) -> ApiResult<OverrideHandle> {
        override_api(self, override_fn)
    }

    /// Remove the active override unconditionally.
    ///
    /// Prefer the compare-and-clear handle returned at installation when
    /// several overrides may be in play.
    pub fn clear_override(&self) {
        self.inner.slots.lock().unwrap().override_slot = None;
    }

    /// Function-local mock delay, taking precedence over the layer's.
    pub fn set_mock_delay_ms(&self, delay_ms: u64) {
        self.inner.slots.lock().unwrap().mock_delay_ms = Some(delay_ms);
    }

    /// Fall back to the layer's mock delay again.
    pub fn clear_mock_delay(&self) {
        self.inner.slots.lock().unwrap().mock_delay_ms = None;
    }

    /// Unique id assigned at creation.
    #[must_use]
    pub fn unique_id(&self) -> &ApiId {
        &self.inner.id
    }

    /// Human-readable name.
    #[must_use]
    pub fn api_name(&self) -> &str {
        self.inner.id.name()
    }

    /// Whether this function reads or mutates.
    #[must_use]
    pub fn kind(&self) -> ApiKind {
        self.inner.kind
    }

    /// Whether an override is currently active.
    #[must_use]
    pub fn has_override(&self) -> bool {
        self.inner.slots.lock().unwrap().override_slot.is_some()
    }

    /// Whether a callable mock is currently installed.
    #[must_use]
    pub fn has_mock(&self) -> bool {
        self.inner.slots.lock().unwrap().mock.is_some()
    }

    /// The symbolic mock reference, if one is attached.
    #[must_use]
    pub fn mock_ref(&self) -> Option<MockRef> {
        self.inner.slots.lock().unwrap().mock_ref.clone()
    }

    /// Whether the mock path has anything to work with.
    #[must_use]
    pub fn is_mock_capable(&self) -> bool {
        let slots = self.inner.slots.lock().unwrap();
        slots.mock.is_some() || slots.mock_ref.is_some()
    }

    /// Function-local mock delay, if set.
    #[must_use]
    pub fn mock_delay_ms(&self) -> Option<u64> {
        self.inner.slots.lock().unwrap().mock_delay_ms
    }

    /// Ids of the declared dependents (set kind only; empty otherwise).
    #[must_use]
    pub fn dependents(&self) -> Vec<ApiId> {
        self.inner.dependents.iter().map(|dep| dep.id().clone()).collect()
    }

    /// The owning layer, while it is still alive.
    #[must_use]
    pub fn layer(&self) -> Option<ApiLayer> {
        self.inner.layer.upgrade().map(ApiLayer::from_inner)
    }

    /// Type-erased handle for registry entries and dependent lists.
    #[must_use]
    pub fn handle(&self) -> ApiHandle {
        ApiHandle {
            inner: Arc::clone(&self.inner) as Arc<dyn ErasedApi>,
        }
    }
}

impl<A, T, E> ApiFunction<A, T, E>
where
    A: Serialize + Send + 'static,
    T: DeserializeOwned + Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    /// Attach (or replace) the symbolic mock reference, together with the
    /// JSON codec the resolver path decodes through.
    pub fn set_mock_ref(&self, mock_ref: impl Into<MockRef>) {
        let mut slots = self.inner.slots.lock().unwrap();
        slots.mock_ref = Some(mock_ref.into());
        if slots.codec.is_none() {
            slots.codec = Some(FixtureCodec::json());
        }
    }
}

impl<A, T, E> From<&ApiFunction<A, T, E>> for ApiCallable<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    fn from(api: &ApiFunction<A, T, E>) -> Self {
        let dispatch_inner = Arc::clone(&api.inner);
        let clear_inner = Arc::clone(&api.inner);
        Self {
            func: Arc::new(move |args| {
                dispatch(Arc::clone(&dispatch_inner), args, DispatchOptions::default())
            }),
            clear: Some(Arc::new(move || clear_inner.forward_clear())),
            wraps: Some(api.inner.id.clone()),
        }
    }
}

impl<A, T, E> From<ApiFunction<A, T, E>> for ApiCallable<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    fn from(api: ApiFunction<A, T, E>) -> Self {
        Self::from(&api)
    }
}

fn resolve_layer(options: &ApiOptions) -> ApiResult<ApiLayer> {
    match &options.layer {
        Some(layer) => Ok(layer.clone()),
        None => global_layer().ok_or_else(|| ApiError::Configuration {
            message: "no layer supplied and no global layer installed; create one with ApiLayer::create".to_string(),
        }),
    }
}

fn new_api<A, T, E>(
    func: ApiCallable<A, T, E>,
    kind: ApiKind,
    dependents: Vec<ApiHandle>,
    codec: Option<FixtureCodec<A, T>>,
    mock_ref: Option<MockRef>,
    options: ApiOptions,
) -> ApiResult<ApiFunction<A, T, E>>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    if let Some(id) = func.wraps() {
        return Err(ApiError::InvalidArgument {
            message: format!("{id} is already an api function and cannot be wrapped again"),
        });
    }

    let mut seen = BTreeSet::new();
    let mut deps = Vec::with_capacity(dependents.len());
    for dep in dependents {
        if dep.kind() != ApiKind::Get {
            return Err(ApiError::InvalidArgument {
                message: format!(
                    "dependent {} is {} kind; only get apis can be invalidated",
                    dep.id(),
                    dep.kind()
                ),
            });
        }
        if seen.insert(dep.id().seq()) {
            deps.push(dep);
        }
    }

    let layer = resolve_layer(&options)?;
    let id = ApiId::next(options.api_name.as_deref().unwrap_or(""));
    tracing::debug!(api = %id, kind = %kind, layer = %layer.layer_id(), "creating api function");
    let inner = Arc::new(ApiFnInner {
        id,
        kind,
        original: func,
        layer: layer.downgrade(),
        slots: Mutex::new(Slots {
            mock: None,
            mock_ref,
            codec,
            override_slot: None,
            mock_delay_ms: options.mock_delay_ms,
        }),
        dependents: deps,
        clear_forwarding: options.clear_forwarding,
        last_seen_epoch: AtomicU64::new(0),
    });
    let api = ApiFunction { inner };
    layer.install(api.handle());
    Ok(api)
}

/// Wrap a plain async function into a get-kind api function.
///
/// `func` must not already be an api function; that fails with
/// [`ApiError::InvalidArgument`]. The function is installed into the layer
/// named by `options` (the global layer when none is named).
pub fn create_get_api<A, T, E>(
    func: impl Into<ApiCallable<A, T, E>>,
    options: ApiOptions,
) -> ApiResult<ApiFunction<A, T, E>>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    new_api(func.into(), ApiKind::Get, Vec::new(), None, None, options)
}

/// [`create_get_api`] with a symbolic mock reference attached up front.
///
/// The serde bounds live here (and on
/// [`set_mock_ref`](ApiFunction::set_mock_ref)) only; plain api functions
/// carry none.
pub fn create_get_api_with_mock<A, T, E>(
    func: impl Into<ApiCallable<A, T, E>>,
    mock_ref: impl Into<MockRef>,
    options: ApiOptions,
) -> ApiResult<ApiFunction<A, T, E>>
where
    A: Serialize + Send + 'static,
    T: DeserializeOwned + Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    new_api(
        func.into(),
        ApiKind::Get,
        Vec::new(),
        Some(FixtureCodec::json()),
        Some(mock_ref.into()),
        options,
    )
}

/// Wrap a plain async function into a set-kind api function.
///
/// A successful call invalidates every dependent in declaration order.
/// Dependents must be get kind; duplicates (same id) are dropped.
pub fn create_set_api<A, T, E>(
    func: impl Into<ApiCallable<A, T, E>>,
    dependents: Vec<ApiHandle>,
    options: ApiOptions,
) -> ApiResult<ApiFunction<A, T, E>>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    new_api(func.into(), ApiKind::Set, dependents, None, None, options)
}

/// [`create_set_api`] with a symbolic mock reference attached up front.
pub fn create_set_api_with_mock<A, T, E>(
    func: impl Into<ApiCallable<A, T, E>>,
    mock_ref: impl Into<MockRef>,
    dependents: Vec<ApiHandle>,
    options: ApiOptions,
) -> ApiResult<ApiFunction<A, T, E>>
where
    A: Serialize + Send + 'static,
    T: DeserializeOwned + Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    new_api(
        func.into(),
        ApiKind::Set,
        dependents,
        Some(FixtureCodec::json()),
        Some(mock_ref.into()),
        options,
    )
}
