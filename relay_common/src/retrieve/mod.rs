//! # Data Retrieval Module
//!
//! HTTP-based collaborators: a generic retrying client, and the on-demand
//! code lookup built on it.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: a generic `ApiClient` on `reqwest` and `reqwest-middleware`
//!   with automatic retries and exponential backoff.
//! - **`code_api`**: per-game code listing plus expiry filtering.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Per-game code lookup.
pub mod code_api;
/// Generic HTTP API client with retry middleware.
pub mod ky_http;

pub use code_api::{valid_codes, CodeApi, CodeLookup, CodeRecord};
pub use ky_http::{ApiClient, ApiResponse};
