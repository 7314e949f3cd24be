//! Run orchestration across sources

mod coordinator;

pub use coordinator::{Coordinator, RunOptions};
