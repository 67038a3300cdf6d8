//! Type-erased asynchronous callables.
//!
//! [`ApiCallable`] is the currency of the whole crate: wrapped originals,
//! installed mocks, and installed overrides are all stored in this shape.
//! Build one from a plain async function with [`api_fn`], or convert an
//! existing [`ApiFunction`](crate::ApiFunction) into one (the conversion
//! marks the callable so factories can refuse to wrap it twice).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::function::ApiId;
use crate::result::ApiError;

/// Boxed future produced by every callable in this crate.
pub type BoxCallFuture<T, E = ApiError> = BoxFuture<'static, Result<T, E>>;

/// Shared invocation function behind an [`ApiCallable`].
pub(crate) type CallFn<A, T, E> = Arc<dyn Fn(A) -> BoxCallFuture<T, E> + Send + Sync>;

/// Shared cache-clear hook.
pub(crate) type ClearFn = Arc<dyn Fn() + Send + Sync>;

/// A cloneable, type-erased async callable from `A` to `Result<T, E>`.
///
/// `A` is the argument type (use `()` for none, a tuple for several), `T`
/// the success value, and `E` the error type the caller sees.
///
/// Cloning is cheap and shares the underlying function; identity of that
/// shared function is what makes compare-and-clear removal handles work.
pub struct ApiCallable<A, T, E = ApiError> {
    pub(crate) func: CallFn<A, T, E>,
    pub(crate) clear: Option<ClearFn>,
    pub(crate) wraps: Option<ApiId>,
}

impl<A, T, E> ApiCallable<A, T, E> {
    /// Invoke the callable with the given arguments.
    pub fn call(&self, args: A) -> BoxCallFuture<T, E> {
        (self.func)(args)
    }

    /// Attach a cache-clear hook, forwarded when the owning api function
    /// is invalidated.
    #[must_use]
    pub fn with_clear(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.clear = Some(Arc::new(hook));
        self
    }

    /// Whether a cache-clear hook is attached.
    #[must_use]
    pub fn has_clear(&self) -> bool {
        self.clear.is_some()
    }

    /// Identity of the api function this callable was converted from, if
    /// any. Factories and installers reject marked callables.
    pub(crate) fn wraps(&self) -> Option<&ApiId> {
        self.wraps.as_ref()
    }

    /// Run the attached clear hook, if present.
    pub(crate) fn run_clear(&self) {
        if let Some(hook) = &self.clear {
            hook();
        }
    }
}

impl<A, T, E> Clone for ApiCallable<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            clear: self.clear.clone(),
            wraps: self.wraps.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for ApiCallable<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCallable")
            .field("has_clear", &self.clear.is_some())
            .field("wraps", &self.wraps)
            .finish()
    }
}

/// Wrap a plain async function into an [`ApiCallable`].
///
/// ```
/// use capa::{api_fn, ApiError};
///
/// let double = api_fn(|n: u32| async move { Ok::<_, ApiError>(n * 2) });
/// ```
pub fn api_fn<A, T, E, F, Fut>(f: F) -> ApiCallable<A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    ApiCallable {
        func: Arc::new(move |args| Box::pin(f(args))),
        clear: None,
        wraps: None,
    }
}
