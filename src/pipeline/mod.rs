//! Frame dispatch, concurrency control and result publication.

mod guard;
mod node;
mod sink;
mod worker;

pub use guard::{BusyFlag, BusyGuard};
pub use node::{FrameReceipt, NodeError, PerceptionNode};
pub use sink::{DetectionSink, LogSink, MemorySink};
pub use worker::{
    detect_obstacles, match_template, Dispatch, ObstacleWorker, Submission, WorkerCounts,
    WorkerStats,
};
