//! TutorUG core primitives
//!
//! Types shared by the reputation, subscription and chat crates:
//! - [`UserId`] - validated stable user identifier
//! - [`Clock`] - injectable time source ([`SystemClock`], [`ManualClock`])
//! - [`Versioned`] and [`StoreError`] - optimistic concurrency for stores
//! - [`UserLocks`] and [`RetryPolicy`] - per-user serialization of updates

pub mod clock;
pub mod id;
pub mod lock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{InvalidUserId, UserId};
pub use lock::{RetryPolicy, UserLocks};
pub use store::{StoreError, Versioned};
