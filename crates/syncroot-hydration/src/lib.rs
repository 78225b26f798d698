//! syncroot Hydration - on-demand placeholder hydration
//!
//! Services operating system requests to fill placeholder content and keeps
//! the advertised placeholder size honest.
//!
//! # Architecture
//!
//! - [`HydrationCoordinator`] resolves a [`HydrationDemand`] through the
//!   adapter tree, streams the requested range from a
//!   [`HydrationSource`] into the OS placeholder with the transfer engine,
//!   then corrects the size the placeholder advertises
//! - Demands run in parallel up to a semaphore limit; each carries its own
//!   cancellation token, so cancelling one never touches another
//!
//! # Usage
//!
//! ```ignore
//! use syncroot_hydration::HydrationCoordinator;
//!
//! let coordinator = HydrationCoordinator::new(tree, source, channel, engine, 8);
//! match coordinator.handle_hydration_demand(demand).await {
//!     Err(HydrationError::UnknownPlaceholder(_)) => { /* dropped, OS retries */ }
//!     other => { other?; }
//! }
//! ```
//!
//! [`HydrationDemand`]: syncroot_core::ports::HydrationDemand
//! [`HydrationSource`]: syncroot_core::ports::HydrationSource

pub mod coordinator;
pub mod error;

pub use coordinator::{ActiveDemand, HydrationCoordinator, HydrationOutcome};
pub use error::HydrationError;
