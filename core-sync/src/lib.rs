//! # Sync Engine
//!
//! Keeps destination playlists mirrored from their source playlists.
//!
//! ## Overview
//!
//! Two independent periodic jobs share the record store and nothing else:
//!
//! - **Analysis** (`analysis`): diffs each due mapping's playlists and
//!   queues `add_track`, `remove_track` and `rename_playlist` items.
//! - **Execution** (`executor`): claims queued items in bounded batches and
//!   applies them through the playlist adapters, retrying, skipping or
//!   blacklisting on failure.
//!
//! ## Components
//!
//! - **Matching** (`matching`): title normalisation and playlist diff
//! - **Blacklist Gate** (`blacklist`): per-mapping suppression of tracks
//! - **Activity Logger** (`activity`): audit trail for both jobs
//! - **Periodic Runner** (`scheduler`): non-overlapping tick loops
//! - **Engine** (`engine`): wiring, startup recovery and shutdown

pub mod activity;
pub mod analysis;
pub mod blacklist;
pub mod engine;
pub mod error;
pub mod executor;
pub mod matching;
pub mod registry;
pub mod scheduler;

pub use activity::{Activity, ActivityLogger, StoreActivityLogger};
pub use analysis::{AnalysisReport, AnalysisScheduler};
pub use blacklist::BlacklistGate;
pub use engine::{EngineHandle, Repositories, SyncEngine};
pub use error::{FailureKind, Result, SyncError};
pub use executor::{retry_delay_secs, ExecutionReport, ExecutorScheduler};
pub use matching::{diff_tracks, normalize_title, TrackDiff};
pub use registry::ProviderRegistry;
pub use scheduler::{spawn_periodic, PeriodicJob, TickGuard};
