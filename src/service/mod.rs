//! Service layer: event fan-out, liveness monitoring, and the change feed.

pub mod change_feed;
pub mod dispatcher;
pub mod liveness_monitor;

pub use change_feed::ChangeFeed;
pub use dispatcher::{Dispatcher, PublishReport};
pub use liveness_monitor::{LivenessMonitor, SweepReport};
