//! Application id resolution
//!
//! The id arrives asynchronously from outside the subsystem, so suppliers
//! may return an empty string until it is known.

use std::sync::{Arc, RwLock};

const CID_PREFIX: &str = "cid-v1:";

/// Source of the application id uploads are filed under
pub trait AppIdSupplier: Send + Sync {
    /// The id, or an empty string when it is not known yet
    fn app_id(&self) -> String;
}

/// Strip the `cid-v1:` prefix; `None` when nothing is left
pub fn normalize_app_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    let id = id.strip_prefix(CID_PREFIX).unwrap_or(id);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Fixed id known at startup
#[derive(Debug, Clone)]
pub struct StaticAppId(String);

impl StaticAppId {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self(app_id.into())
    }
}

impl AppIdSupplier for StaticAppId {
    fn app_id(&self) -> String {
        self.0.clone()
    }
}

/// Id filled in later, e.g. once a lookup against the ingestion service
/// completes. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SharedAppId {
    slot: Arc<RwLock<Option<String>>>,
}

impl SharedAppId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, app_id: impl Into<String>) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(app_id.into());
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl AppIdSupplier for SharedAppId {
    fn app_id(&self) -> String {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default()
    }
}
