//! Artifact upload
//!
//! - [`AppIdSupplier`] resolves the application id uploads are filed under
//! - [`UploadTransport`] ships one artifact; [`HttpUploadTransport`] is the
//!   production implementation with retry and backoff
//! - [`UploadPipeline`] ties them together and owns artifact disposal

mod app_id;
mod http;
mod pipeline;
mod transport;

pub use app_id::{normalize_app_id, AppIdSupplier, SharedAppId, StaticAppId};
pub use http::{HttpTransportConfig, HttpUploadTransport, HttpUploadTransportBuilder, DIGEST_HEADER};
pub use pipeline::UploadPipeline;
pub use transport::{UploadRequest, UploadTransport};
