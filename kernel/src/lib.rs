// Tracklog Kernel
//
// Snapshot diffing, yearly event logs and history replay for tracked
// collections.

pub mod adapters;
pub mod config;
pub mod diff;
pub mod fsutil;
pub mod invariants;
pub mod log;
pub mod reconcile;
pub mod replay;
pub mod report;
pub mod snapshot;
pub mod source;
