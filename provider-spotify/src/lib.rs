//! # Spotify Provider
//!
//! Source-side adapter implementing
//! [`PlaylistProvider`](bridge_traits::playlist::PlaylistProvider) for the
//! Spotify Web API.
//!
//! ## Overview
//!
//! - Playlist and track listing, paginated by `offset/limit` through the
//!   `next` URL Spotify returns
//! - Track search for resolving tracks from other services
//! - Add, remove (by track URI) and rename
//! - Bearer tokens from an [`AccessTokenSource`](core_auth::AccessTokenSource),
//!   refreshed once on 401

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{SpotifyConnector, SPOTIFY_API_BASE};
pub use error::{Result, SpotifyError};
