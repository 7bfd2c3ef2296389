//! # Banquet Runtime
//!
//! Services that implement the booking core on top of the traits in
//! `banquet-core`:
//!
//! - [`LeadDesk`]: lead capture, status updates, funnel statistics
//! - [`ChecklistEngine`]: milestone updates and the advance-payment gate
//! - [`BookingLifecycle`]: direct bookings, lead conversion, status and amount changes
//! - [`ConflictDetector`]: slot checks and occupancy calendars
//! - [`BanquetCore`]: one facade over all of the above
//!
//! plus an [`InMemoryRepository`] and a [`BroadcastNotifier`].
//!
//! ## Write path
//!
//! ```text
//! caller ──► service ──► validate ──► enter branch gate ──► repository (atomic) ──► notifier
//! ```
//!
//! Each write holds its branch's gate from commit to publish, so observers
//! of a branch see changes in commit order. Slot checks run inside the
//! repository's atomic section, so two concurrent requests for the same
//! slot cannot both succeed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod checklist;
pub mod config;
pub mod conflict;
pub mod environment;
pub mod fanout;
pub mod leads;
pub mod lifecycle;
pub mod memory;

pub use app::BanquetCore;
pub use checklist::{ChecklistEngine, MilestoneOutcome};
pub use config::{Config, ConfigError, StorageBackend};
pub use conflict::ConflictDetector;
pub use environment::{BanquetEnvironment, BranchGates};
pub use fanout::BroadcastNotifier;
pub use leads::LeadDesk;
pub use lifecycle::BookingLifecycle;
pub use memory::InMemoryRepository;

