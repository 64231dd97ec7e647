//! Engine logic and orchestration.
//!
//! - `order`: chapter ordering from titles
//! - `merge`: fold a fresh catalog into an archived book
//! - `plan`: status gate and manifest check
//! - `cycle`: per-book state machine and batch runs
//! - `report`: per-book and run-level results

pub mod cycle;
pub mod merge;
pub mod order;
pub mod plan;
pub mod report;

pub use cycle::{Orchestrator, Phase, Target};
pub use merge::{MergeStats, merge};
pub use order::{OrderingResolver, UNORDERED};
pub use plan::{SyncPlan, SyncPlanner};
pub use report::{BookReport, MarkReport, Outcome, RunReport};
