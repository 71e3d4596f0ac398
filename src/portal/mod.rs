//! Student portal collaborator.
//!
//! The bot never scrapes anything itself. It talks to a [`Portal`]: one call
//! to check a roll number / password pair, one to pull the attendance
//! register. [`SimulatedPortal`] ships for offline runs; a real scraper plugs
//! in through the same trait.

pub mod report;
pub mod simulated;

use async_trait::async_trait;

pub use report::{format_report, AttendanceReport, SubjectAttendance, TodayMark};
pub use simulated::SimulatedPortal;

/// Portal operations the bot depends on. Both calls may be slow.
#[async_trait]
pub trait Portal: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Check credentials against the portal. `Ok(false)` means rejected;
    /// `Err` means the portal could not be asked.
    async fn authenticate(&self, identifier: &str, secret: &str) -> anyhow::Result<bool>;

    /// Fetch the attendance register for a logged-in student.
    async fn fetch_attendance(&self, identifier: &str) -> anyhow::Result<AttendanceReport>;
}
