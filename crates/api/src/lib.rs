//! Thin HTTP layer over the fulfillment pipeline.
//!
//! One route per external operation; all business rules live below the
//! service boundary. Actor identity arrives pre-verified via headers, and a
//! single allow/deny gate runs before every mutating call.

pub mod app;
pub mod authz;
pub mod context;
