//! Plain callables that bypass chosen dispatch behaviors.
//!
//! [`call_api_function`] turns an api function back into an ordinary
//! [`ApiCallable`] whose calls still run through the function's layer,
//! minus whatever the [`CallOptions`] switch off. The adapter's output
//! carries no wrapping marker, so it is legal everywhere a plain
//! callable is, including as an override on the very function it wraps.

use std::sync::Arc;

use crate::callable::ApiCallable;
use crate::dispatch::{dispatch, DispatchOptions};
use crate::function::ApiFunction;
use crate::mock::MockRef;
use crate::result::{ApiError, ApiResult};

/// Behavior toggles for a direct-call adapter, all off by default.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    no_mock: bool,
    no_override: bool,
    no_invalidation: bool,
    mock_ref: Option<MockRef>,
}

impl CallOptions {
    /// Options matching a normal call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the mock path: in mock mode, calls reach the original.
    #[must_use]
    pub fn with_no_mock(mut self) -> Self {
        self.no_mock = true;
        self
    }

    /// Skip any installed override.
    ///
    /// Required when the adapter's output is itself installed as an
    /// override on the same function; without it each call would hit
    /// the override slot again.
    #[must_use]
    pub fn with_no_override(mut self) -> Self {
        self.no_override = true;
        self
    }

    /// Do not invalidate dependents after a successful set call.
    #[must_use]
    pub fn with_no_invalidation(mut self) -> Self {
        self.no_invalidation = true;
        self
    }

    /// Resolve this reference instead of the function's stored one,
    /// displacing an installed mock as well. Mock mode only.
    #[must_use]
    pub fn with_mock_ref(mut self, mock_ref: impl Into<MockRef>) -> Self {
        self.mock_ref = Some(mock_ref.into());
        self
    }
}

/// Build a callable that dispatches through `api` with `options`
/// applied to every call.
pub fn call_api_function<A, T, E>(
    api: &ApiFunction<A, T, E>,
    options: CallOptions,
) -> ApiResult<ApiCallable<A, T, E>>
where
    A: Send + 'static,
    T: Send + 'static,
    E: From<ApiError> + Send + 'static,
{
    if options.mock_ref.is_some() && options.no_mock {
        return Err(ApiError::InvalidArgument {
            message: "an alternate mock reference cannot be combined with no_mock".to_string(),
        });
    }
    if let Some(mock_ref) = &options.mock_ref {
        if api.inner.slots.lock().unwrap().codec.is_none() {
            return Err(ApiError::InvalidArgument {
                message: format!(
                    "{} cannot resolve {mock_ref}: no fixture codec; attach one with set_mock_ref or a _with_mock factory",
                    api.inner.id
                ),
            });
        }
    }

    let inner = Arc::clone(&api.inner);
    Ok(ApiCallable {
        func: Arc::new(move |args| {
            dispatch(
                Arc::clone(&inner),
                args,
                DispatchOptions {
                    no_mock: options.no_mock,
                    no_override: options.no_override,
                    no_invalidation: options.no_invalidation,
                    mock_ref: options.mock_ref.clone(),
                },
            )
        }),
        clear: None,
        wraps: None,
    })
}
