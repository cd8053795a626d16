//! HTTP front door (feature-gated): decodes requests, applies CORS, calls the
//! orchestrator and encodes its result.

pub mod http;
pub mod logging;

pub use http::{RelayHttpState, router};
pub use logging::init_tracing;
