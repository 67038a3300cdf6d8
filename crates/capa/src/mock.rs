//! Mock references, payloads, resolvers, and canned-mock builders.
//!
//! A mock can enter the system two ways: as an installed callable (built
//! here with [`mock_fn`] or [`MockSpec`], or any [`ApiCallable`]), or as a
//! symbolic [`MockRef`] resolved at call time through the layer's injected
//! [`MockResolver`]. The resolver hands back a [`MockPayload`]: either a
//! structured value decoded into the api function's result type, or a
//! producer invoked with the encoded call arguments.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::callable::ApiCallable;
use crate::dispatch::with_min_delay;
use crate::function::{ApiId, ApiKind};
use crate::layer::ApiLayer;
use crate::result::{ApiError, ApiResult, LoaderError};

/// Symbolic reference to mock data, resolved by a [`MockResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MockRef {
    /// Reference to fixture data (for the bundled filesystem resolver:
    /// a path relative to the fixture root)
    Fixture(String),
    /// Reference to a registered producer invoked with the call arguments
    Producer(String),
}

impl MockRef {
    /// Fixture-data reference.
    #[must_use]
    pub fn fixture(path: impl Into<String>) -> Self {
        Self::Fixture(path.into())
    }

    /// Producer reference.
    #[must_use]
    pub fn producer(name: impl Into<String>) -> Self {
        Self::Producer(name.into())
    }
}

impl From<&str> for MockRef {
    fn from(path: &str) -> Self {
        Self::Fixture(path.to_string())
    }
}

impl From<String> for MockRef {
    fn from(path: String) -> Self {
        Self::Fixture(path)
    }
}

impl fmt::Display for MockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixture(path) => write!(f, "{path}"),
            Self::Producer(name) => write!(f, "producer:{name}"),
        }
    }
}

/// Async producer of a mock value from the encoded call arguments.
pub type MockProducer =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value, LoaderError>> + Send + Sync>;

/// What a [`MockResolver`] hands back for a reference.
pub enum MockPayload {
    /// A ready value, decoded into the api function's result type
    Value(serde_json::Value),
    /// A producer that must be invoked with the call arguments
    Producer(MockProducer),
}

impl MockPayload {
    /// Producer payload from a plain async function.
    pub fn producer<F, Fut>(f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, LoaderError>> + Send + 'static,
    {
        Self::Producer(Arc::new(move |args| Box::pin(f(args))))
    }

    /// Whether this payload is a ready value.
    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl fmt::Debug for MockPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Producer(_) => f.debug_tuple("Producer").field(&"..").finish(),
        }
    }
}

/// What a resolver gets to look at when resolving a mock reference.
#[derive(Debug, Clone)]
pub struct ApiDescriptor {
    /// The symbolic reference being resolved
    pub mock_ref: MockRef,
    /// Human-readable name of the api function
    pub api_name: String,
    /// Unique id of the api function, when resolving for a real dispatch
    /// (absent for one-shot lookups via [`get_mock_result`])
    pub unique_id: Option<ApiId>,
    /// Kind of the api function
    pub kind: ApiKind,
}

/// Injected capability that resolves a [`MockRef`] to a [`MockPayload`].
///
/// The core never loads fixture data itself; a resolver is supplied to the
/// layer at creation (required when mock mode is on). The bundled
/// [`FsMockResolver`](crate::FsMockResolver) reads JSON fixtures from a
/// directory; custom resolvers can fetch from anywhere.
#[async_trait]
pub trait MockResolver: Send + Sync {
    /// Resolve the descriptor's mock reference.
    ///
    /// Must fail with a descriptive [`LoaderError`] when the reference
    /// cannot be found or parsed, never silently hand back garbage.
    async fn resolve(&self, descriptor: &ApiDescriptor) -> Result<MockPayload, LoaderError>;
}

/// JSON codec between an api function's typed world and resolver payloads.
///
/// Captured only where serde bounds are actually available (the
/// `*_with_mock` factories and `set_mock_ref`), so plain api functions
/// carry no serde requirements at all.
pub(crate) struct FixtureCodec<A, T> {
    pub(crate) encode: Arc<dyn Fn(&A) -> Result<serde_json::Value, serde_json::Error> + Send + Sync>,
    pub(crate) decode: Arc<dyn Fn(serde_json::Value) -> Result<T, serde_json::Error> + Send + Sync>,
}

impl<A, T> FixtureCodec<A, T>
where
    A: Serialize,
    T: DeserializeOwned,
{
    pub(crate) fn json() -> Self {
        Self {
            encode: Arc::new(|args| serde_json::to_value(args)),
            decode: Arc::new(|value| serde_json::from_value(value)),
        }
    }
}

impl<A, T> Clone for FixtureCodec<A, T> {
    fn clone(&self) -> Self {
        Self {
            encode: Arc::clone(&self.encode),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<A, T> fmt::Debug for FixtureCodec<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureCodec").finish()
    }
}

/// Builder for a canned mock callable.
///
/// Resolves with a cloned result (or rejects with a built failure), after
/// an optional mock-local delay, optionally reporting each call's
/// arguments to an inspection callback.
///
/// ```
/// use capa::{ApiError, MockSpec};
///
/// let mock = MockSpec::<(), _, ApiError>::new(42u32)
///     .with_delay_ms(25)
///     .into_callable();
/// ```
pub struct MockSpec<A, T, E = ApiError> {
    result: Option<T>,
    failure: Option<Arc<dyn Fn() -> E + Send + Sync>>,
    callback: Option<Arc<dyn Fn(&A) + Send + Sync>>,
    delay_ms: u64,
}

impl<A, T, E> MockSpec<A, T, E> {
    /// Mock resolving with `result` on every call.
    #[must_use]
    pub fn new(result: T) -> Self {
        Self {
            result: Some(result),
            failure: None,
            callback: None,
            delay_ms: 0,
        }
    }

    /// Mock rejecting with a freshly built failure on every call.
    #[must_use]
    pub fn failing(failure: impl Fn() -> E + Send + Sync + 'static) -> Self {
        Self {
            result: None,
            failure: Some(Arc::new(failure)),
            callback: None,
            delay_ms: 0,
        }
    }

    /// Reject instead of resolving; wins over the canned result.
    #[must_use]
    pub fn with_failure(mut self, failure: impl Fn() -> E + Send + Sync + 'static) -> Self {
        self.failure = Some(Arc::new(failure));
        self
    }

    /// Inspect the arguments of every call (spy hook for tests).
    #[must_use]
    pub fn with_callback(mut self, callback: impl Fn(&A) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Mock-local latency, applied on every call before settling.
    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Finish the builder into an installable callable.
    #[must_use]
    pub fn into_callable(self) -> ApiCallable<A, T, E>
    where
        A: Send + 'static,
        T: Clone + Send + Sync + 'static,
        E: From<ApiError> + Send + 'static,
    {
        self.into()
    }
}

impl<A, T, E> From<MockSpec<A, T, E>> for ApiCallable<A, T, E>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: From<ApiError> + Send + 'static,
{
    fn from(spec: MockSpec<A, T, E>) -> Self {
        let MockSpec {
            result,
            failure,
            callback,
            delay_ms,
        } = spec;
        crate::callable::api_fn(move |args: A| {
            let result = result.clone();
            let failure = failure.clone();
            let callback = callback.clone();
            async move {
                if delay_ms > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
                if let Some(callback) = &callback {
                    callback(&args);
                }
                if let Some(failure) = &failure {
                    return Err(failure());
                }
                match result {
                    Some(value) => Ok(value),
                    None => Err(E::from(ApiError::InvalidArgument {
                        message: "mock spec has neither a result nor a failure".to_string(),
                    })),
                }
            }
        })
    }
}

/// Canned mock resolving with a clone of `result` on every call.
///
/// Shorthand for `MockSpec::new(result).into_callable()`.
pub fn mock_fn<A, T, E>(result: T) -> ApiCallable<A, T, E>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: From<ApiError> + Send + 'static,
{
    MockSpec::new(result).into_callable()
}

/// One-shot mock resolution through a layer's resolver, with the delay
/// floor applied.
///
/// Hands back the raw [`MockPayload`] without decoding or invoking it;
/// useful for tests that want to look at fixture data directly.
pub async fn get_mock_result(
    layer: &ApiLayer,
    mock_ref: impl Into<MockRef>,
    api_name: &str,
    delay_ms: u64,
) -> ApiResult<MockPayload> {
    let resolver = layer.resolver().ok_or_else(|| ApiError::Configuration {
        message: format!("layer {} has no mock resolver to look up fixtures with", layer.layer_id()),
    })?;
    let descriptor = ApiDescriptor {
        mock_ref: mock_ref.into(),
        api_name: api_name.to_string(),
        unique_id: None,
        kind: ApiKind::Get,
    };
    with_min_delay(delay_ms, async move { resolver.resolve(&descriptor).await })
        .await
        .map_err(|source| ApiError::Loader {
            api_name: api_name.to_string(),
            source,
        })
}
