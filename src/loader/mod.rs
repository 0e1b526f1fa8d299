//! Package list loading
//!
//! The orchestrator serves a device's record list from the per-device
//! [`ResultCache`] or starts a new enumeration session. Sessions are tagged
//! with a monotonically increasing generation; only the outcome and progress
//! of the newest generation ever reach the cache or visible state.

pub mod cache;
pub mod orchestrator;
pub mod progress;
pub mod session;
pub mod view;

pub use cache::ResultCache;
pub use orchestrator::LoadOrchestrator;
pub use progress::{
    PROGRESS_TOPIC, ProgressChannel, ProgressEvent, ProgressRelay, ProgressSink, ProgressSubscription,
};
pub use session::{LoadSession, LoadTicket, SessionHandle, SessionStatus};
pub use view::LoadView;
