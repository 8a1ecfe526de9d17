//! Shared Schemas for newsdesk
//!
//! These structs mirror the dashboard's JSON shapes.
//! All structs use `serde(rename_all = "camelCase")` for JSON compatibility.

pub mod article;
pub mod common;
pub mod filters;
pub mod payout;

pub use article::*;
pub use common::*;
pub use filters::*;
pub use payout::*;
