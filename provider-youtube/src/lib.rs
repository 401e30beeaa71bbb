//! # YouTube Provider
//!
//! Destination-side adapter implementing
//! [`PlaylistProvider`](bridge_traits::playlist::PlaylistProvider) for the
//! YouTube Data API v3.
//!
//! ## Overview
//!
//! - Playlist and playlist-item listing, paginated by `pageToken`
//! - Video search to resolve tracks coming from another service
//! - Insert, delete (by playlist item id) and rename via `playlists.update`
//! - Daily quota-unit accounting through [`QuotaTracker`]; calls that would
//!   exceed the budget fail fast with a rate-limit error instead of being
//!   sent

pub mod connector;
pub mod error;
pub mod quota;
pub mod types;

pub use connector::{YouTubeConnector, YOUTUBE_API_BASE};
pub use error::{Result, YouTubeError};
pub use quota::{QuotaTracker, DEFAULT_DAILY_QUOTA};
