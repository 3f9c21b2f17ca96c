//! Scan history log
//!
//! Completed scans (claim, verdict and the components detected in frame) in a
//! log bounded by a retention ceiling. The oldest scans are evicted in the same
//! transaction that inserts a new one.

mod entity;
mod repository;

pub use entity::{
    BoundingBox, Claim, HistoryStats, ScanComponent, ScanHistoryEntry, ScanSummary, ScanVerdict,
    VerdictKind,
};
pub use repository::ScanHistoryRepository;
