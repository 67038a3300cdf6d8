//! The process-wide global layer slot.
//!
//! A convenience for application boundaries only: factories fall back to
//! the layer installed here when their options name none. The dispatcher
//! itself never consults this slot. Tests should prefer explicit layers
//! (`LayerOptions::default().install_global(false)`) and leave the global
//! slot alone.

use std::sync::RwLock;

use crate::layer::ApiLayer;
use crate::result::{ApiError, ApiResult};

static GLOBAL_LAYER: RwLock<Option<ApiLayer>> = RwLock::new(None);

/// Install `layer` as the process-wide global layer, replacing any
/// current one.
pub fn install_global(layer: &ApiLayer) {
    let mut slot = GLOBAL_LAYER.write().unwrap();
    if let Some(existing) = slot.as_ref() {
        tracing::debug!(
            old = %existing.layer_id(),
            new = %layer.layer_id(),
            "replacing global api layer"
        );
    }
    *slot = Some(layer.clone());
}

/// Claim the empty global slot; refuse when another layer holds it.
///
/// Backs implicit installation during [`ApiLayer::create`]: two layers
/// both assuming they are "the" global one is almost always a test
/// sharing state by accident.
pub(crate) fn install_implicit(layer: &ApiLayer) -> ApiResult<()> {
    let mut slot = GLOBAL_LAYER.write().unwrap();
    if let Some(existing) = slot.as_ref() {
        return Err(ApiError::Configuration {
            message: format!(
                "a global api layer ({}) is already installed; pass LayerOptions::install_global to choose explicitly",
                existing.layer_id()
            ),
        });
    }
    *slot = Some(layer.clone());
    Ok(())
}

/// The current global layer, if one is installed.
#[must_use]
pub fn global_layer() -> Option<ApiLayer> {
    GLOBAL_LAYER.read().unwrap().clone()
}

/// Empty the global slot.
pub fn reset_global() {
    *GLOBAL_LAYER.write().unwrap() = None;
}
