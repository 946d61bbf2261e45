mod memory_tracker;
mod workspace;

pub use memory_tracker::MemoryTracker;
pub use workspace::{BlobId, Workspace};
