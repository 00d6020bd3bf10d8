//! Remote service client for vigil.
//!
//! This crate provides:
//! - The [`ServiceClient`] capability every account workflow consumes
//! - The two-kind failure taxonomy ([`ServiceError`])
//! - Wire types shared with the fleet ([`ResourceInfo`], [`Proxy`])
//! - A reqwest-backed [`HttpServiceClient`]

mod client;
mod error;
mod types;

pub use client::{HttpServiceClient, ServiceClient};
pub use error::ServiceError;
pub use types::{ACTIVITY_CHUNK, ActivityChunk, Proxy, ResourceInfo, activity_chunks};
