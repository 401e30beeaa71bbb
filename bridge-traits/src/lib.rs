//! # Host Bridge Traits
//!
//! Abstractions the sync core depends on but does not implement itself.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP with transport-level retry
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`PlaylistProvider`](playlist::PlaylistProvider) - Common contract for
//!   streaming-service playlist adapters
//!
//! ## Error Handling
//!
//! Transport failures use [`BridgeError`](error::BridgeError). Adapter
//! failures are normalised into [`ProviderError`](playlist::ProviderError),
//! whose [`class`](playlist::ProviderError::class) tells the scheduler
//! whether to retry, skip, or stop for the current tick.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so a single adapter instance can be
//! shared across scheduler tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod playlist;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use playlist::{
    collect_tracks, track_stream, ErrorClass, PlaylistProvider, PlaylistSummary, PlaylistTrack,
    ProviderError, ProviderKind, ProviderResult, QuotaStatus, TrackPage, TrackQuery, TrackRef,
};
pub use time::{Clock, ManualClock, SystemClock};
