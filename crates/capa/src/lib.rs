//! Capa: controllable layers for async api functions
//!
//! Capa (Spanish: "layer") wraps plain async get/set functions into api
//! functions whose behavior can be redirected at runtime: canned mocks
//! and fixture files in mock mode, overrides for scenario setup, and
//! cache invalidation wired from writes to the reads they stale.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                       CAPA Dispatch                            │
//! ├────────────────────────────────────────────────────────────────┤
//! │   call(args)                                                   │
//! │      │                                                         │
//! │      ▼                                                         │
//! │   ┌──────────┐   ┌───────────────────┐   ┌──────────┐          │
//! │   │ override │──►│ mock / resolver   │──►│ original │          │
//! │   │ (always) │   │ (mock mode, delay)│   │          │          │
//! │   └──────────┘   └───────────────────┘   └──────────┘          │
//! │      first match wins, then set-kind success invalidates       │
//! │      dependents                                                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Functions are wrapped once with [`create_get_api`] or
//! [`create_set_api`], installed into an [`ApiLayer`], and called like
//! the plain function they wrap. Everything else (mocks, overrides,
//! fixtures, delays) is layered on afterwards without touching call
//! sites.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Type-erased async callables, the currency every slot accepts.
pub mod callable;

/// Direct-call adapters that bypass chosen dispatch behaviors.
pub mod direct_call;

mod dispatch;

/// Filesystem-backed mock resolver serving JSON fixtures.
#[cfg(feature = "fs")]
pub mod fs_resolver;

/// Api function wrappers, identities, and creation options.
pub mod function;

/// The process-wide default layer slot.
pub mod global;

/// Bulk teardown of overrides.
pub mod group;

/// Layers: registries of installed functions plus mock-mode policy.
pub mod layer;

/// Mock references, payloads, canned mocks, and the resolver trait.
pub mod mock;

/// Override installation with compare-and-clear removal handles.
pub mod overrides;

/// Error taxonomy shared across the crate.
pub mod result;

pub use callable::{api_fn, ApiCallable, BoxCallFuture};
pub use direct_call::{call_api_function, CallOptions};
#[cfg(feature = "fs")]
pub use fs_resolver::FsMockResolver;
pub use function::{
    create_get_api, create_get_api_with_mock, create_set_api, create_set_api_with_mock, ApiFunction,
    ApiHandle, ApiId, ApiKind, ApiOptions, ClearForwarding,
};
pub use global::{global_layer, install_global, reset_global};
pub use group::OverrideGroup;
pub use layer::{ApiLayer, LayerOptions};
pub use mock::{
    get_mock_result, mock_fn, ApiDescriptor, MockPayload, MockProducer, MockRef, MockResolver,
    MockSpec,
};
pub use overrides::{override_api, OverrideHandle};
pub use result::{ApiError, ApiResult, LoaderError};

/// One-stop imports for test suites built on capa.
pub mod prelude {
    pub use super::callable::*;
    pub use super::direct_call::*;
    #[cfg(feature = "fs")]
    pub use super::fs_resolver::*;
    pub use super::function::*;
    pub use super::global::*;
    pub use super::group::*;
    pub use super::layer::*;
    pub use super::mock::*;
    pub use super::overrides::*;
    pub use super::result::*;
}
