//! syncroot Transfer - revision transfer engine
//!
//! Moves content bytes from a source revision to a destination revision
//! without buffering the whole file.
//!
//! # Strategies
//!
//! | Source          | Destination     | Strategy   |
//! |-----------------|-----------------|------------|
//! | stream-backed   | any             | Upload     |
//! | opaque remote   | stream-backed   | Download   |
//! | opaque remote   | opaque remote   | Relay      |
//!
//! A relay bridges the two endpoints through a bounded in-memory
//! [`pipe`](pipe::pipe) with a producer and a consumer task linked to one
//! cancellation scope.
//!
//! # Usage
//!
//! ```ignore
//! use syncroot_transfer::{LocalFileDestination, LocalFileRevision, TransferEngine};
//!
//! let engine = TransferEngine::from_config(&config.transfer);
//! let report = engine
//!     .transfer(
//!         SourceRevision::StreamBacked(Box::new(LocalFileRevision::new(src))),
//!         DestinationRevision::StreamBacked(Box::new(LocalFileDestination::new(dst))),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! ```

pub mod engine;
pub mod local;
pub mod pipe;

pub use engine::{TransferEngine, TransferReport, TransferStrategy};
pub use local::{LocalFileDestination, LocalFileRevision};
pub use pipe::{pipe, PipeReader, PipeWriter};
