//! Conduit admission webhook: review decoding, ownership-backed decisions and the
//! HTTP(S) server around them.

#![forbid(unsafe_code)]

mod handler;
pub mod review;
mod server;

pub use handler::AdmissionHandler;
pub use review::{AdmissionOperation, AdmissionRequest, AdmissionResponse, AdmissionReview, UserInfo};
pub use server::{admission_kinds, load_tls, router, serve, ApiError, ServerConfig, TlsPaths};
