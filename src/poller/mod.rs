/*!
Fleet polling: per-device snapshots and the run that commits them.

This module defines:
- `SnapshotAggregator`: merges every supported MIB of one device into a `DeviceSnapshot`.
- `HostOrchestrator`: validates and queries each configured host, stages one file per host, then commits.
- `StagingArea`: the scratch directory and the rename-based swap behind the commit.
*/

pub mod aggregator;
pub mod orchestrator;
pub mod staging;

pub use aggregator::SnapshotAggregator;
pub use orchestrator::{HostOrchestrator, RunError, RunSummary};
