//! # Desktop Bridge Implementations
//!
//! Native implementations of the bridge traits for server and desktop hosts
//! (Linux, macOS, Windows).
//!
//! - `HttpClient` using `reqwest` with rustls
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::time::Duration;
//!
//! let http_client = ReqwestHttpClient::with_timeout(Duration::from_secs(10))?;
//! ```

mod http;

pub use http::ReqwestHttpClient;
