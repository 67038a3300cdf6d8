//! The per-call dispatcher.
//!
//! Every invocation of an api function runs through [`dispatch`]: verify
//! the identity is still installed, consume a pending cache-epoch bump,
//! pick the callable by strict precedence (override, then the mock path
//! in mock mode, then the original), apply the delay floor on the mock
//! path, and invalidate a set-kind function's dependents after success.
//!
//! Cancellation is drop-based: dropping the returned future drops the
//! selected inner future. Invalidation runs inside the same future, so a
//! call dropped before its inner future completed never invalidates.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::callable::BoxCallFuture;
use crate::function::{ApiFnInner, ApiKind};
use crate::layer::LayerInner;
use crate::mock::{ApiDescriptor, MockPayload, MockRef};
use crate::result::{ApiError, LoaderError};

/// Per-call toggles, all off for a normal call; set by the direct-call
/// adapter.
#[derive(Debug, Clone, Default)]
pub(crate) struct DispatchOptions {
    pub(crate) no_mock: bool,
    pub(crate) no_override: bool,
    pub(crate) no_invalidation: bool,
    pub(crate) mock_ref: Option<MockRef>,
}

/// Hold `fut`'s output back until at least `delay_ms` have passed.
///
/// A floor, not an addition: the future and the timer run concurrently,
/// so a call that already outlasts the delay is returned untouched, and a
/// failure waits out the floor the same as a success.
pub(crate) async fn with_min_delay<F>(delay_ms: u64, fut: F) -> F::Output
where
    F: std::future::Future,
{
    if delay_ms == 0 {
        return fut.await;
    }
    let (out, ()) = tokio::join!(fut, tokio::time::sleep(Duration::from_millis(delay_ms)));
    out
}

fn not_found<A, T, E>(inner: &ApiFnInner<A, T, E>) -> ApiError {
    ApiError::NotFound {
        id: inner.id.to_string(),
    }
}

fn loader_err<A, T, E>(inner: &ApiFnInner<A, T, E>, source: LoaderError) -> ApiError {
    ApiError::Loader {
        api_name: inner.id.name().to_string(),
        source,
    }
}

/// Resolve one call against the function's slots and its layer.
pub(crate) fn dispatch<A, T, E>(
    inner: Arc<ApiFnInner<A, T, E>>,
    args: A,
    opts: DispatchOptions,
) -> BoxCallFuture<T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    Box::pin(async move {
        let Some(layer) = inner.layer.upgrade() else {
            return Err(E::from(not_found(&inner)));
        };
        if !layer.installed.lock().unwrap().contains_key(&inner.id) {
            return Err(E::from(not_found(&inner)));
        }

        // Consume a pending layer-wide invalidation. Mock mode leaves the
        // epoch untouched so real caches are not washed by mocked runs.
        if !layer.mock_mode {
            let current = layer.epoch.load(Ordering::SeqCst);
            let seen = inner.last_seen_epoch.swap(current, Ordering::SeqCst);
            if seen < current {
                tracing::debug!(api = %inner.id, epoch = current, "washing cache after epoch bump");
                if catch_unwind(AssertUnwindSafe(|| inner.forward_clear())).is_err() {
                    tracing::warn!(api = %inner.id, "clear hook panicked during epoch wash");
                }
            }
        }

        let override_callable = if opts.no_override {
            None
        } else {
            inner.slots.lock().unwrap().override_slot.clone()
        };

        let result = if let Some(callable) = override_callable {
            // Highest precedence, even in mock mode, and never delayed:
            // overrides exist to make dispatch deterministic under test.
            tracing::debug!(api = %inner.id, "dispatching via override");
            callable.call(args).await
        } else if layer.mock_mode && !opts.no_mock {
            let delay_ms = inner
                .slots
                .lock()
                .unwrap()
                .mock_delay_ms
                .unwrap_or_else(|| layer.mock_delay_ms.load(Ordering::SeqCst));
            with_min_delay(delay_ms, mock_call(&inner, &layer, args, opts.mock_ref.clone())).await
        } else {
            tracing::debug!(api = %inner.id, "dispatching via original");
            inner.original.call(args).await
        };

        if inner.kind == ApiKind::Set && !opts.no_invalidation && result.is_ok() {
            invalidate_dependents(&inner);
        }
        result
    })
}

/// The mock path: an installed mock, else the resolver.
///
/// An adapter-supplied alternate reference displaces both the installed
/// mock and the stored reference for this one call.
async fn mock_call<A, T, E>(
    inner: &ApiFnInner<A, T, E>,
    layer: &LayerInner,
    args: A,
    alt_ref: Option<MockRef>,
) -> Result<T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    let (installed, stored_ref, codec) = {
        let slots = inner.slots.lock().unwrap();
        (slots.mock.clone(), slots.mock_ref.clone(), slots.codec.clone())
    };

    if alt_ref.is_none() {
        if let Some(mock) = installed {
            tracing::debug!(api = %inner.id, "dispatching via installed mock");
            return mock.call(args).await;
        }
    }

    let Some(mock_ref) = alt_ref.or(stored_ref) else {
        return Err(E::from(loader_err(
            inner,
            LoaderError::MissingReference {
                api_name: inner.id.name().to_string(),
            },
        )));
    };
    let Some(resolver) = layer.resolver.lock().unwrap().clone() else {
        return Err(E::from(ApiError::Configuration {
            message: format!("layer has no mock resolver to resolve {mock_ref}"),
        }));
    };
    let Some(codec) = codec else {
        return Err(E::from(ApiError::Configuration {
            message: format!(
                "{} has no fixture codec; attach the reference with set_mock_ref or a _with_mock factory",
                inner.id
            ),
        }));
    };

    let descriptor = ApiDescriptor {
        mock_ref: mock_ref.clone(),
        api_name: inner.id.name().to_string(),
        unique_id: Some(inner.id.clone()),
        kind: inner.kind,
    };
    tracing::debug!(api = %inner.id, mock_ref = %mock_ref, "dispatching via mock resolver");
    let payload = resolver
        .resolve(&descriptor)
        .await
        .map_err(|source| E::from(loader_err(inner, source)))?;

    let value = match payload {
        MockPayload::Value(value) => value,
        MockPayload::Producer(producer) => {
            let encoded = (codec.encode)(&args)
                .map_err(|source| E::from(loader_err(inner, LoaderError::Encode { source })))?;
            producer(encoded)
                .await
                .map_err(|source| E::from(loader_err(inner, source)))?
        }
    };
    (codec.decode)(value).map_err(|source| E::from(loader_err(inner, LoaderError::Decode { source })))
}

/// Clear every declared dependent exactly once, containing panics so a
/// misbehaving hook cannot mask the primary result.
fn invalidate_dependents<A, T, E>(inner: &ApiFnInner<A, T, E>) {
    for dependent in &inner.dependents {
        tracing::debug!(api = %inner.id, dependent = %dependent.id(), "invalidating dependent");
        if catch_unwind(AssertUnwindSafe(|| dependent.clear_cache())).is_err() {
            tracing::warn!(
                api = %inner.id,
                dependent = %dependent.id(),
                "dependent clear hook panicked during invalidation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::api_fn;
    use crate::function::{create_get_api, create_set_api, ApiFunction, ApiOptions};
    use crate::layer::{ApiLayer, LayerOptions};
    use crate::mock::{mock_fn, MockResolver, MockSpec};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct User {
        id: String,
    }

    /// Serves fixtures from an in-memory table; `producer:echo` wraps the
    /// encoded arguments in `{"id": ...}`.
    struct TableResolver {
        fixtures: HashMap<String, serde_json::Value>,
    }

    impl TableResolver {
        fn with(path: &str, value: serde_json::Value) -> Self {
            let mut fixtures = HashMap::new();
            fixtures.insert(path.to_string(), value);
            Self { fixtures }
        }
    }

    #[async_trait]
    impl MockResolver for TableResolver {
        async fn resolve(&self, descriptor: &ApiDescriptor) -> Result<MockPayload, LoaderError> {
            match &descriptor.mock_ref {
                MockRef::Fixture(path) => self
                    .fixtures
                    .get(path)
                    .cloned()
                    .map(MockPayload::Value)
                    .ok_or_else(|| LoaderError::NotFound { path: path.clone() }),
                MockRef::Producer(name) if name == "echo" => {
                    Ok(MockPayload::producer(|args| async move {
                        Ok(serde_json::json!({ "id": args }))
                    }))
                }
                MockRef::Producer(name) => Err(LoaderError::NotFound { path: name.clone() }),
            }
        }
    }

    fn test_layer() -> ApiLayer {
        ApiLayer::create(LayerOptions::default().install_global(false)).unwrap()
    }

    fn mock_layer(resolver: impl MockResolver + 'static) -> ApiLayer {
        mock_layer_with_delay(resolver, 0)
    }

    fn mock_layer_with_delay(resolver: impl MockResolver + 'static, delay_ms: u64) -> ApiLayer {
        ApiLayer::create(
            LayerOptions::default()
                .with_mock_mode(true)
                .with_resolver(resolver)
                .with_mock_delay_ms(delay_ms)
                .install_global(false),
        )
        .unwrap()
    }

    fn get_user_api(layer: &ApiLayer) -> ApiFunction<String, User> {
        create_get_api(
            api_fn(|id: String| async move { Ok::<_, ApiError>(User { id }) }),
            ApiOptions::default().with_name("getUser").with_layer(layer),
        )
        .unwrap()
    }

    /// Get api whose wrapped function carries a counting clear hook.
    fn spy_get(layer: &ApiLayer, name: &str) -> (ApiFunction<(), u8>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        let api = create_get_api(
            api_fn(|(): ()| async { Ok::<_, ApiError>(0u8) }).with_clear(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
            ApiOptions::default().with_name(name).with_layer(layer),
        )
        .unwrap();
        (api, count)
    }

    mod plain_calls {
        use super::*;

        #[tokio::test]
        async fn get_resolves_the_original_value() {
            let layer = test_layer();
            let get_user = get_user_api(&layer);
            let user = get_user.call("1".to_string()).await.unwrap();
            assert_eq!(user, User { id: "1".to_string() });
        }

        #[tokio::test]
        async fn rejections_propagate_verbatim() {
            let layer = test_layer();
            let failing = create_get_api(
                api_fn(|(): ()| async { Err::<u8, _>(ApiError::upstream("backend down")) }),
                ApiOptions::default().with_name("getDown").with_layer(&layer),
            )
            .unwrap();
            let err = failing.call(()).await.unwrap_err();
            assert!(matches!(err, ApiError::Upstream { message } if message == "backend down"));
        }

        #[tokio::test]
        async fn custom_error_types_pass_through() {
            #[derive(Debug, PartialEq)]
            enum AuthError {
                LoggedOut,
                Infra(String),
            }
            impl From<ApiError> for AuthError {
                fn from(err: ApiError) -> Self {
                    Self::Infra(err.to_string())
                }
            }

            let layer = test_layer();
            let whoami = create_get_api(
                api_fn(|(): ()| async { Err::<User, AuthError>(AuthError::LoggedOut) }),
                ApiOptions::default().with_name("whoami").with_layer(&layer),
            )
            .unwrap();
            assert_eq!(whoami.call(()).await.unwrap_err(), AuthError::LoggedOut);

            // Infrastructure failures arrive through the From conversion.
            layer.uninstall(whoami.unique_id());
            match whoami.call(()).await.unwrap_err() {
                AuthError::Infra(message) => assert!(message.contains("not installed")),
                AuthError::LoggedOut => panic!("expected an infrastructure error"),
            }
        }

        #[tokio::test]
        async fn teardown_makes_calls_fail_not_found() {
            let layer = test_layer();
            let get_user = get_user_api(&layer);
            drop(layer);
            let err = get_user.call("1".to_string()).await.unwrap_err();
            assert!(matches!(err, ApiError::NotFound { .. }));
        }

        #[tokio::test]
        async fn uninstalled_functions_fail_not_found() {
            let layer = test_layer();
            let get_user = get_user_api(&layer);
            layer.uninstall(get_user.unique_id());
            let err = get_user.call("1".to_string()).await.unwrap_err();
            assert!(matches!(err, ApiError::NotFound { id } if id.contains("getUser")));
        }
    }

    mod precedence {
        use super::*;

        #[tokio::test]
        async fn override_wins_even_in_mock_mode() {
            let layer = mock_layer(TableResolver::with("user.json", serde_json::json!({ "id": "mocked" })));
            let get_user = get_user_api(&layer);
            get_user.install_mock(mock_fn(User { id: "installed".to_string() })).unwrap();
            get_user
                .install_override(api_fn(|_: String| async {
                    Ok::<_, ApiError>(User { id: "overridden".to_string() })
                }))
                .unwrap();

            let user = get_user.call("1".to_string()).await.unwrap();
            assert_eq!(user.id, "overridden");
        }

        #[tokio::test]
        async fn override_receives_the_original_arguments() {
            let layer = test_layer();
            let get_user = get_user_api(&layer);
            get_user
                .install_override(api_fn(|id: String| async move {
                    Ok::<_, ApiError>(User { id: format!("{id}-override") })
                }))
                .unwrap();

            let user = get_user.call("7".to_string()).await.unwrap();
            assert_eq!(user.id, "7-override");
        }

        #[tokio::test]
        async fn installed_mock_beats_the_resolver() {
            let layer = mock_layer(TableResolver::with("user.json", serde_json::json!({ "id": "fixture" })));
            let get_user = get_user_api(&layer);
            get_user.set_mock_ref("user.json");
            get_user.install_mock(mock_fn(User { id: "installed".to_string() })).unwrap();

            let user = get_user.call("1".to_string()).await.unwrap();
            assert_eq!(user.id, "installed");
        }

        #[tokio::test]
        async fn resolver_serves_fixture_values() {
            let layer = mock_layer(TableResolver::with("user.json", serde_json::json!({ "id": "fixture" })));
            let get_user = get_user_api(&layer);
            get_user.set_mock_ref("user.json");

            let user = get_user.call("ignored".to_string()).await.unwrap();
            assert_eq!(user.id, "fixture");
        }

        #[tokio::test]
        async fn resolver_producers_get_the_encoded_arguments() {
            let layer = mock_layer(TableResolver { fixtures: HashMap::new() });
            let get_user = get_user_api(&layer);
            get_user.set_mock_ref(MockRef::producer("echo"));

            let user = get_user.call("42".to_string()).await.unwrap();
            assert_eq!(user.id, "42");
        }

        #[tokio::test]
        async fn original_runs_outside_mock_mode_despite_installed_mock() {
            let layer = test_layer();
            let get_user = get_user_api(&layer);
            get_user.install_mock(mock_fn(User { id: "installed".to_string() })).unwrap();

            let user = get_user.call("real".to_string()).await.unwrap();
            assert_eq!(user.id, "real");
        }

        #[tokio::test]
        async fn missing_reference_surfaces_as_loader_error() {
            let layer = mock_layer(TableResolver { fixtures: HashMap::new() });
            let get_user = get_user_api(&layer);

            let err = get_user.call("1".to_string()).await.unwrap_err();
            match err {
                ApiError::Loader { api_name, source } => {
                    assert_eq!(api_name, "getUser");
                    assert!(matches!(source, LoaderError::MissingReference { .. }));
                }
                other => panic!("expected a loader error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn mismatched_fixture_shape_is_a_decode_error() {
            let layer = mock_layer(TableResolver::with("user.json", serde_json::json!({ "id": 5 })));
            let get_user = get_user_api(&layer);
            get_user.set_mock_ref("user.json");

            let err = get_user.call("1".to_string()).await.unwrap_err();
            match err {
                ApiError::Loader { source, .. } => {
                    assert!(matches!(source, LoaderError::Decode { .. }));
                }
                other => panic!("expected a loader error, got {other:?}"),
            }
        }
    }

    mod delays {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn floor_applies_to_mocked_resolutions() {
            let layer = mock_layer_with_delay(TableResolver { fixtures: HashMap::new() }, 3000);
            let get_user = get_user_api(&layer);
            get_user.install_mock(mock_fn(User { id: "m".to_string() })).unwrap();

            let start = tokio::time::Instant::now();
            get_user.call("1".to_string()).await.unwrap();
            assert!(start.elapsed() >= Duration::from_millis(3000));
        }

        #[tokio::test(start_paused = true)]
        async fn floor_applies_to_mocked_rejections() {
            let layer = mock_layer_with_delay(TableResolver { fixtures: HashMap::new() }, 3000);
            let get_user = get_user_api(&layer);
            get_user
                .install_mock(
                    MockSpec::failing(|| ApiError::upstream("mocked failure")).into_callable(),
                )
                .unwrap();

            let start = tokio::time::Instant::now();
            get_user.call("1".to_string()).await.unwrap_err();
            assert!(start.elapsed() >= Duration::from_millis(3000));
        }

        #[tokio::test(start_paused = true)]
        async fn slower_mocks_are_not_stretched_further() {
            let layer = mock_layer_with_delay(TableResolver { fixtures: HashMap::new() }, 3000);
            let get_user = get_user_api(&layer);
            get_user
                .install_mock(
                    MockSpec::new(User { id: "slow".to_string() }).with_delay_ms(8000).into_callable(),
                )
                .unwrap();

            let start = tokio::time::Instant::now();
            get_user.call("1".to_string()).await.unwrap();
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(8000));
            assert!(elapsed < Duration::from_millis(11000));
        }

        #[tokio::test(start_paused = true)]
        async fn function_local_delay_wins_over_the_layer() {
            let layer = mock_layer_with_delay(TableResolver { fixtures: HashMap::new() }, 1000);
            let get_user = get_user_api(&layer);
            get_user.set_mock_delay_ms(200);
            get_user.install_mock(mock_fn(User { id: "m".to_string() })).unwrap();

            let start = tokio::time::Instant::now();
            get_user.call("1".to_string()).await.unwrap();
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(200));
            assert!(elapsed < Duration::from_millis(1000));
        }

        #[tokio::test(start_paused = true)]
        async fn the_original_is_never_slowed_down() {
            let layer = test_layer();
            layer.set_options(&LayerOptions::default().with_mock_delay_ms(5000));
            let get_user = get_user_api(&layer);

            let start = tokio::time::Instant::now();
            get_user.call("1".to_string()).await.unwrap();
            assert!(start.elapsed() < Duration::from_millis(5000));
        }

        #[tokio::test(start_paused = true)]
        async fn overrides_are_never_slowed_down_even_in_mock_mode() {
            let layer = mock_layer_with_delay(TableResolver { fixtures: HashMap::new() }, 5000);
            let get_user = get_user_api(&layer);
            get_user
                .install_override(api_fn(|_: String| async {
                    Ok::<_, ApiError>(User { id: "o".to_string() })
                }))
                .unwrap();

            let start = tokio::time::Instant::now();
            get_user.call("1".to_string()).await.unwrap();
            assert!(start.elapsed() < Duration::from_millis(5000));
        }
    }

    mod invalidation {
        use super::*;

        fn set_api(
            layer: &ApiLayer,
            dependents: Vec<crate::function::ApiHandle>,
        ) -> ApiFunction<(), ()> {
            create_set_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(()) }),
                dependents,
                ApiOptions::default().with_name("setUser").with_layer(layer),
            )
            .unwrap()
        }

        #[tokio::test]
        async fn success_clears_each_dependent_exactly_once() {
            let layer = test_layer();
            let (dep_a, clears_a) = spy_get(&layer, "getUser");
            let (dep_b, clears_b) = spy_get(&layer, "getUserList");
            let set_user = set_api(&layer, vec![dep_a.handle(), dep_b.handle()]);

            set_user.call(()).await.unwrap();
            assert_eq!(clears_a.load(Ordering::SeqCst), 1);
            assert_eq!(clears_b.load(Ordering::SeqCst), 1);

            set_user.call(()).await.unwrap();
            assert_eq!(clears_a.load(Ordering::SeqCst), 2);
            assert_eq!(clears_b.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn failure_clears_nothing() {
            let layer = test_layer();
            let (dep, clears) = spy_get(&layer, "getUser");
            let set_user = create_set_api(
                api_fn(|(): ()| async { Err::<(), _>(ApiError::upstream("write failed")) }),
                vec![dep.handle()],
                ApiOptions::default().with_name("setUser").with_layer(&layer),
            )
            .unwrap();

            set_user.call(()).await.unwrap_err();
            assert_eq!(clears.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn invalidation_completes_before_the_call_resolves() {
            let layer = test_layer();
            let events: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));

            let log = Arc::clone(&events);
            let dep = create_get_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(0u8) })
                    .with_clear(move || log.lock().unwrap().push("clear")),
                ApiOptions::default().with_name("getUser").with_layer(&layer),
            )
            .unwrap();

            let log = Arc::clone(&events);
            let set_user = create_set_api(
                api_fn(move |(): ()| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().unwrap().push("original");
                        Ok::<_, ApiError>(())
                    }
                }),
                vec![dep.handle()],
                ApiOptions::default().with_name("setUser").with_layer(&layer),
            )
            .unwrap();

            set_user.call(()).await.unwrap();
            events.lock().unwrap().push("resolved");
            assert_eq!(*events.lock().unwrap(), vec!["original", "clear", "resolved"]);
        }

        #[tokio::test]
        async fn invalidation_runs_on_the_mock_path_too() {
            let layer = mock_layer(TableResolver { fixtures: HashMap::new() });
            let (dep, clears) = spy_get(&layer, "getUser");
            let set_user = set_api(&layer, vec![dep.handle()]);
            set_user.install_mock(mock_fn(())).unwrap();

            set_user.call(()).await.unwrap();
            assert_eq!(clears.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn panicking_dependent_does_not_mask_the_result() {
            let layer = test_layer();
            let exploding = create_get_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(0u8) })
                    .with_clear(|| panic!("cache exploded")),
                ApiOptions::default().with_name("getBroken").with_layer(&layer),
            )
            .unwrap();
            let (healthy, clears) = spy_get(&layer, "getUser");
            let set_user = set_api(&layer, vec![exploding.handle(), healthy.handle()]);

            set_user.call(()).await.unwrap();
            assert_eq!(clears.load(Ordering::SeqCst), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn dropped_calls_do_not_invalidate() {
            let layer = test_layer();
            let (dep, clears) = spy_get(&layer, "getUser");
            let set_user = create_set_api(
                api_fn(|(): ()| futures::future::pending::<Result<(), ApiError>>()),
                vec![dep.handle()],
                ApiOptions::default().with_name("setUser").with_layer(&layer),
            )
            .unwrap();

            let call = set_user.call(());
            assert!(tokio::time::timeout(Duration::from_millis(50), call).await.is_err());
            assert_eq!(clears.load(Ordering::SeqCst), 0);
        }
    }

    mod epochs {
        use super::*;

        #[tokio::test]
        async fn a_bump_washes_each_function_once() {
            let layer = test_layer();
            let (get_user, clears) = spy_get(&layer, "getUser");

            get_user.call(()).await.unwrap();
            assert_eq!(clears.load(Ordering::SeqCst), 0);

            layer.clear_cache();
            get_user.call(()).await.unwrap();
            assert_eq!(clears.load(Ordering::SeqCst), 1);

            get_user.call(()).await.unwrap();
            assert_eq!(clears.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn each_bump_is_consumed_separately() {
            let layer = test_layer();
            let (get_user, clears) = spy_get(&layer, "getUser");

            layer.clear_cache();
            get_user.call(()).await.unwrap();
            layer.clear_cache();
            layer.clear_cache();
            get_user.call(()).await.unwrap();
            assert_eq!(clears.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn mock_mode_leaves_epochs_alone() {
            let layer = mock_layer(TableResolver { fixtures: HashMap::new() });
            let count = Arc::new(AtomicUsize::new(0));
            let counted = Arc::clone(&count);
            let get_user = create_get_api(
                api_fn(|(): ()| async { Ok::<_, ApiError>(0u8) }).with_clear(move || {
                    counted.fetch_add(1, Ordering::SeqCst);
                }),
                ApiOptions::default().with_name("getUser").with_layer(&layer),
            )
            .unwrap();
            get_user.install_mock(mock_fn(1u8)).unwrap();

            layer.clear_cache();
            get_user.call(()).await.unwrap();
            assert_eq!(count.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn new_functions_skip_bumps_that_predate_them() {
            let layer = test_layer();
            layer.clear_cache();
            layer.clear_cache();

            let (get_user, clears) = spy_get(&layer, "getUser");
            get_user.call(()).await.unwrap();
            assert_eq!(clears.load(Ordering::SeqCst), 0);
        }
    }
}
