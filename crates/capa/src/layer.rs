//! The api layer: registry and configuration for api functions.
//!
//! A layer owns the functions installed into it, the mock-mode flag (fixed
//! at creation), the global mock delay, the injected mock resolver, and
//! the cache-epoch counter behind lazy layer-wide invalidation. Tests
//! typically create one explicit layer per scenario with
//! `LayerOptions::default().install_global(false)` so nothing leaks
//! between them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::function::{ApiHandle, ApiId};
use crate::global;
use crate::mock::MockResolver;
use crate::result::{ApiError, ApiResult};

static NEXT_LAYER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Shared state behind an [`ApiLayer`] handle.
pub(crate) struct LayerInner {
    pub(crate) layer_id: String,
    pub(crate) mock_mode: bool,
    pub(crate) mock_delay_ms: AtomicU64,
    pub(crate) resolver: Mutex<Option<Arc<dyn MockResolver>>>,
    pub(crate) installed: Mutex<BTreeMap<ApiId, ApiHandle>>,
    pub(crate) epoch: AtomicU64,
}

/// Options for [`ApiLayer::create`] and [`ApiLayer::set_options`].
///
/// Every field is unset by default. [`ApiLayer::set_options`] merges,
/// touching only the fields a caller actually set, so reconfiguring the
/// resolver leaves the mock delay alone and vice versa.
#[derive(Clone, Default)]
pub struct LayerOptions {
    mock_mode: Option<bool>,
    mock_delay_ms: Option<u64>,
    resolver: Option<Arc<dyn MockResolver>>,
    install_global: Option<bool>,
}

impl LayerOptions {
    /// Serve every call from the mock path (requires a resolver).
    ///
    /// The flag is fixed for the layer's whole lifetime; later
    /// [`ApiLayer::set_options`] calls cannot flip it.
    #[must_use]
    pub fn with_mock_mode(mut self, mock_mode: bool) -> Self {
        self.mock_mode = Some(mock_mode);
        self
    }

    /// Minimum apparent latency of mocked calls, in milliseconds.
    #[must_use]
    pub fn with_mock_delay_ms(mut self, delay_ms: u64) -> Self {
        self.mock_delay_ms = Some(delay_ms);
        self
    }

    /// Inject the capability that resolves symbolic mock references.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl MockResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Control installation as the process-wide global layer.
    ///
    /// `true` replaces any current global layer, `false` leaves the global
    /// slot alone. When unset, creation claims the empty slot or fails
    /// with a configuration error if another layer already holds it.
    #[must_use]
    pub fn install_global(mut self, install: bool) -> Self {
        self.install_global = Some(install);
        self
    }
}

impl fmt::Debug for LayerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerOptions")
            .field("mock_mode", &self.mock_mode)
            .field("mock_delay_ms", &self.mock_delay_ms)
            .field("has_resolver", &self.resolver.is_some())
            .field("install_global", &self.install_global)
            .finish()
    }
}

/// Registry and configuration context for api functions.
///
/// Cloneable handle; clones share state. Dropping the last handle tears
/// the layer down, after which dispatch through any function it owned
/// fails with [`ApiError::NotFound`].
#[derive(Clone)]
pub struct ApiLayer {
    inner: Arc<LayerInner>,
}

impl ApiLayer {
    /// Create a layer.
    ///
    /// Fails with [`ApiError::Configuration`] when mock mode is requested
    /// without a resolver, or when implicit global installation collides
    /// with an already-installed global layer.
    pub fn create(options: LayerOptions) -> ApiResult<Self> {
        let mock_mode = options.mock_mode.unwrap_or(false);
        if mock_mode && options.resolver.is_none() {
            return Err(ApiError::Configuration {
                message: "mock mode requires a mock resolver".to_string(),
            });
        }
        let seq = NEXT_LAYER_SEQ.fetch_add(1, Ordering::SeqCst) + 1;
        let layer = Self {
            inner: Arc::new(LayerInner {
                layer_id: format!("layer_{seq}"),
                mock_mode,
                mock_delay_ms: AtomicU64::new(options.mock_delay_ms.unwrap_or(0)),
                resolver: Mutex::new(options.resolver),
                installed: Mutex::new(BTreeMap::new()),
                epoch: AtomicU64::new(0),
            }),
        };
        match options.install_global {
            Some(true) => global::install_global(&layer),
            Some(false) => {}
            None => global::install_implicit(&layer)?,
        }
        tracing::debug!(layer = %layer.layer_id(), mock_mode = layer.inner.mock_mode, "created api layer");
        Ok(layer)
    }

    pub(crate) fn from_inner(inner: Arc<LayerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<LayerInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn resolver(&self) -> Option<Arc<dyn MockResolver>> {
        self.inner.resolver.lock().unwrap().clone()
    }

    /// Process-unique layer id.
    #[must_use]
    pub fn layer_id(&self) -> &str {
        &self.inner.layer_id
    }

    /// Whether this layer serves calls from the mock path.
    #[must_use]
    pub fn is_mock_mode(&self) -> bool {
        self.inner.mock_mode
    }

    /// The layer-global mock delay in milliseconds.
    #[must_use]
    pub fn mock_delay_ms(&self) -> u64 {
        self.inner.mock_delay_ms.load(Ordering::SeqCst)
    }

    /// Whether a mock resolver is currently injected.
    #[must_use]
    pub fn has_resolver(&self) -> bool {
        self.inner.resolver.lock().unwrap().is_some()
    }

    /// Number of installed api functions.
    #[must_use]
    pub fn api_count(&self) -> usize {
        self.inner.installed.lock().unwrap().len()
    }

    /// Look up an installed api function by id.
    #[must_use]
    pub fn get_api(&self, id: &ApiId) -> Option<ApiHandle> {
        self.inner.installed.lock().unwrap().get(id).cloned()
    }

    /// Install an api function (the factories do this automatically).
    ///
    /// The function starts caught up with the current cache epoch, so it
    /// does not replay invalidations that predate it.
    pub fn install(&self, handle: ApiHandle) {
        handle.note_epoch(self.inner.epoch.load(Ordering::SeqCst));
        self.inner
            .installed
            .lock()
            .unwrap()
            .insert(handle.id().clone(), handle);
    }

    /// Remove an api function from the registry.
    ///
    /// Subsequent dispatch through the removed function fails with
    /// [`ApiError::NotFound`].
    pub fn uninstall(&self, id: &ApiId) -> Option<ApiHandle> {
        self.inner.installed.lock().unwrap().remove(id)
    }

    /// Signal every installed function to drop cached data.
    ///
    /// Lazy: bumps the cache epoch, which each function consumes (by
    /// forwarding one clear) the next time it dispatches outside mock
    /// mode.
    pub fn clear_cache(&self) {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(layer = %self.layer_id(), epoch, "cache epoch bumped");
    }

    /// Drop every active override, optionally also clearing caches.
    pub fn clear_overrides(&self, clear_caches: bool) {
        let handles: Vec<ApiHandle> = self.inner.installed.lock().unwrap().values().cloned().collect();
        for handle in &handles {
            handle.clear_override();
        }
        if clear_caches {
            self.clear_cache();
        }
    }

    /// Reconfigure the layer, merging in the options the caller set.
    ///
    /// Unset fields keep their current values, so a resolver-only update
    /// does not disturb the mock delay. Mock mode is fixed at creation
    /// (an attempted flip is logged and ignored) and global installation
    /// only ever happens at creation.
    pub fn set_options(&self, options: &LayerOptions) {
        if options.mock_mode.is_some_and(|mode| mode != self.inner.mock_mode) {
            tracing::warn!(
                layer = %self.layer_id(),
                "mock mode is fixed at layer creation; ignoring attempt to change it"
            );
        }
        if let Some(delay_ms) = options.mock_delay_ms {
            self.inner.mock_delay_ms.store(delay_ms, Ordering::SeqCst);
        }
        if let Some(resolver) = &options.resolver {
            *self.inner.resolver.lock().unwrap() = Some(Arc::clone(resolver));
        }
    }

    /// Ids of installed functions the mock path cannot serve yet (no
    /// installed mock and no mock reference).
    ///
    /// A pre-flight check before running a suite against a mock-mode
    /// layer; an empty result means full coverage.
    #[must_use]
    pub fn mock_coverage(&self) -> Vec<ApiId> {
        self.inner
            .installed
            .lock()
            .unwrap()
            .values()
            .filter(|handle| !handle.mock_capable())
            .map(|handle| handle.id().clone())
            .collect()
    }
}

impl fmt::Debug for ApiLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiLayer")
            .field("layer_id", &self.inner.layer_id)
            .field("mock_mode", &self.inner.mock_mode)
            .field("api_count", &self.api_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::api_fn;
    use crate::function::{create_get_api, ApiOptions};
    use crate::mock::{ApiDescriptor, MockPayload};
    use crate::result::LoaderError;
    use async_trait::async_trait;

    struct NullResolver;

    #[async_trait]
    impl MockResolver for NullResolver {
        async fn resolve(&self, _descriptor: &ApiDescriptor) -> Result<MockPayload, LoaderError> {
            Ok(MockPayload::Value(serde_json::Value::Null))
        }
    }

    fn test_layer() -> ApiLayer {
        ApiLayer::create(LayerOptions::default().install_global(false)).unwrap()
    }

    mod creation {
        use super::*;

        #[test]
        fn defaults_are_quiet() {
            let layer = test_layer();
            assert!(!layer.is_mock_mode());
            assert_eq!(layer.mock_delay_ms(), 0);
            assert!(!layer.has_resolver());
            assert_eq!(layer.api_count(), 0);
        }

        #[test]
        fn mock_mode_without_resolver_is_refused() {
            let err = ApiLayer::create(
                LayerOptions::default().with_mock_mode(true).install_global(false),
            )
            .unwrap_err();
            assert!(matches!(err, ApiError::Configuration { .. }));
        }

        #[test]
        fn mock_mode_with_resolver_is_accepted() {
            let layer = ApiLayer::create(
                LayerOptions::default()
                    .with_mock_mode(true)
                    .with_resolver(NullResolver)
                    .install_global(false),
            )
            .unwrap();
            assert!(layer.is_mock_mode());
            assert!(layer.has_resolver());
        }

        #[test]
        fn layer_ids_are_distinct() {
            let a = test_layer();
            let b = test_layer();
            assert_ne!(a.layer_id(), b.layer_id());
        }
    }

    mod registry {
        use super::*;

        #[test]
        fn uninstall_forgets_the_function() {
            let layer = test_layer();
            let api = create_get_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(1u8) }),
                ApiOptions::default().with_name("getUser").with_layer(&layer),
            )
            .unwrap();

            assert_eq!(layer.api_count(), 1);
            let removed = layer.uninstall(api.unique_id()).unwrap();
            assert_eq!(removed.id(), api.unique_id());
            assert_eq!(layer.api_count(), 0);
            assert!(layer.get_api(api.unique_id()).is_none());
        }

        #[test]
        fn mock_coverage_names_functions_without_mocks() {
            let layer = test_layer();
            let bare = create_get_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(1u8) }),
                ApiOptions::default().with_name("bare").with_layer(&layer),
            )
            .unwrap();
            let covered = create_get_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(1u8) }),
                ApiOptions::default().with_name("covered").with_layer(&layer),
            )
            .unwrap();
            covered.install_mock(crate::mock::mock_fn(2u8)).unwrap();

            let missing = layer.mock_coverage();
            assert_eq!(missing, vec![bare.unique_id().clone()]);

            bare.set_mock_ref("bare.json");
            assert!(layer.mock_coverage().is_empty());
        }

        #[test]
        fn clear_overrides_sweeps_every_function() {
            let layer = test_layer();
            let a = create_get_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(1u8) }),
                ApiOptions::default().with_name("a").with_layer(&layer),
            )
            .unwrap();
            let b = create_get_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(2u8) }),
                ApiOptions::default().with_name("b").with_layer(&layer),
            )
            .unwrap();
            a.install_override(api_fn(|(): ()| async { Ok::<_, ApiError>(10u8) })).unwrap();
            b.install_override(api_fn(|(): ()| async { Ok::<_, ApiError>(20u8) })).unwrap();

            layer.clear_overrides(false);
            assert!(!a.has_override());
            assert!(!b.has_override());
        }
    }

    mod options {
        use super::*;

        /// Collects formatted tracing output for assertions.
        struct Sink(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        #[test]
        fn set_options_updates_the_delay() {
            let layer = test_layer();
            layer.set_options(&LayerOptions::default().with_mock_delay_ms(250));
            assert_eq!(layer.mock_delay_ms(), 250);
        }

        #[test]
        fn resolver_only_updates_keep_the_delay() {
            let layer = ApiLayer::create(
                LayerOptions::default().with_mock_delay_ms(70).install_global(false),
            )
            .unwrap();

            layer.set_options(&LayerOptions::default().with_resolver(NullResolver));
            assert_eq!(layer.mock_delay_ms(), 70);
            assert!(layer.has_resolver());
        }

        #[test]
        fn set_options_cannot_flip_mock_mode() {
            let layer = test_layer();
            layer.set_options(&LayerOptions::default().with_mock_mode(true));
            assert!(!layer.is_mock_mode());
        }

        #[test]
        fn an_ignored_mock_mode_flip_is_logged() {
            let buffer = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&buffer);
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || Sink(Arc::clone(&sink)))
                .with_max_level(tracing::Level::WARN)
                .with_ansi(false)
                .finish();

            let layer = test_layer();
            tracing::subscriber::with_default(subscriber, || {
                layer.set_options(&LayerOptions::default().with_mock_mode(true));
            });

            let logged = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
            assert!(logged.contains("mock mode is fixed at layer creation"));
            assert!(!layer.is_mock_mode());
        }

        #[test]
        fn untouched_options_log_nothing() {
            let buffer = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&buffer);
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || Sink(Arc::clone(&sink)))
                .with_max_level(tracing::Level::WARN)
                .with_ansi(false)
                .finish();

            let layer = test_layer();
            tracing::subscriber::with_default(subscriber, || {
                layer.set_options(&LayerOptions::default().with_mock_delay_ms(10));
            });

            assert!(buffer.lock().unwrap().is_empty());
        }

        #[test]
        fn set_options_keeps_the_resolver_unless_replaced() {
            let layer = ApiLayer::create(
                LayerOptions::default()
                    .with_mock_mode(true)
                    .with_resolver(NullResolver)
                    .install_global(false),
            )
            .unwrap();

            layer.set_options(&LayerOptions::default().with_mock_delay_ms(5));
            assert!(layer.has_resolver());
        }
    }
}
