//! Proxy path: header translation, upstream forwarding, request ids.

pub mod correlation;
pub mod forward;
pub mod headers;
