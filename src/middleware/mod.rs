//! Request-scoped middleware: per-request timing instrumentation and
//! request-ID correlation.

pub mod request_id;
pub mod timing;

pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use timing::TimingLayer;
