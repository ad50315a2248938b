//! Recording engine for the walklog GPS session recorder.
//!
//! This crate turns a stream of position fixes into a persisted walking
//! session, attaches photos to it, and exports or restores whole sessions
//! through a remote document/blob store.
//!
//! # Features
//!
//! - **Sampling**: keep a fix only when enough time passed or the walker moved
//! - **Session state machine**: start (fresh, discard or append), record, stop
//! - **Durable progress**: every accepted waypoint is written to the local store
//! - **Photos**: capture stamped with position, heading and direction
//! - **Remote sync**: export with unique naming and per-photo failure isolation,
//!   import that replaces local data and re-downloads photos
//! - **Reference points**: landmarks published next to the exported sessions
//! - **Power**: wake lock held while recording, re-acquired on visibility
//! - **Events**: broadcast [`RecorderEvent`]s for any front end
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use time::OffsetDateTime;
//! use walklog_core::{
//!     ChannelSource, FixedPrompt, Recorder, RecorderConfig, UnsupportedWakeLock, persistence,
//! };
//! use walklog_store::Store;
//! use walklog_types::Fix;
//!
//! # async fn example() -> walklog_core::Result<()> {
//! let store = persistence::shared(Store::open_in_memory()?);
//! let source = ChannelSource::new();
//! let feed = source.feed();
//!
//! let mut recorder = Recorder::new(
//!     store,
//!     Arc::new(source),
//!     Arc::new(UnsupportedWakeLock),
//!     RecorderConfig::default(),
//! )?;
//! recorder.start(&mut FixedPrompt::default()).await?;
//!
//! feed.send_fix(Fix::new(34.85, 135.47, 5.0, OffsetDateTime::now_utc())).await;
//! recorder.pump().await;
//!
//! let summary = recorder.stop().await;
//! assert_eq!(summary.map(|s| s.total_points), Some(1));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod mock;
pub mod persistence;
pub mod position;
pub mod power;
pub mod prompt;
pub mod recorder;
pub mod reference;
pub mod remote;
pub mod retry;
pub mod sampler;
pub mod sync;

pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, RecorderEvent, StartMode, SyncPhase};
pub use persistence::SharedStore;
pub use position::{
    ChannelSource, PositionError, PositionEvent, PositionFeed, PositionSource,
    PositionSubscription, SubscribeOptions,
};
pub use power::{
    CompassReading, HeadingSource, HeadingTracker, PowerCoordinator, UnsupportedWakeLock,
    WakeLock, WakeLockError,
};
pub use prompt::{FixedPrompt, Prompt, StartDecision};
pub use recorder::{
    CapturedImage, FixOutcome, Phase, Recorder, RecorderConfig, RecorderState, StartOutcome,
    StopSummary, format_start_label,
};
pub use reference::ReferencePoint;
pub use remote::{BlobMetadata, DirectoryRemote, OrderBy, RemoteDocument, RemoteError, RemoteStore};
#[cfg(feature = "http-remote")]
pub use remote::HttpRemote;
pub use retry::{RetryConfig, with_retry};
pub use sampler::{AcceptReason, Decision, RejectReason, Sampler, SamplerConfig};
pub use sync::{
    ExportDocument, ExportOutcome, ExportReport, ImportOutcome, ImportReport, PhotoRef,
    RestoredView, SyncConfig, SyncEngine,
};

// Re-export the data model so front ends need only this crate.
pub use walklog_types::{Direction, Fix, GeoPoint, LastPosition, Photo, Track, Waypoint};
