//! Offline stand-in for the ECAP portal.
//!
//! Accepts any credentials that clear the length checks and serves a fixed
//! sample register. Lets the bot run end to end without network access.

use async_trait::async_trait;
use std::time::Duration;

use super::report::{AttendanceReport, SubjectAttendance, TodayMark};
use super::Portal;

/// Test-mode portal with canned attendance data.
#[derive(Debug, Clone)]
pub struct SimulatedPortal {
    min_identifier_len: usize,
    min_secret_len: usize,
    latency: Duration,
}

impl SimulatedPortal {
    pub fn new(min_identifier_len: usize, min_secret_len: usize) -> Self {
        Self {
            min_identifier_len,
            min_secret_len,
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency` to mimic a slow portal.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for SimulatedPortal {
    fn default() -> Self {
        Self::new(8, 4)
    }
}

#[async_trait]
impl Portal for SimulatedPortal {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn authenticate(&self, identifier: &str, secret: &str) -> anyhow::Result<bool> {
        self.simulate_latency().await;
        let ok = identifier.chars().count() >= self.min_identifier_len
            && secret.chars().count() >= self.min_secret_len;
        tracing::debug!(portal = self.name(), accepted = ok, "Simulated login attempt");
        Ok(ok)
    }

    async fn fetch_attendance(&self, identifier: &str) -> anyhow::Result<AttendanceReport> {
        self.simulate_latency().await;

        let subjects = [
            ("MC-II (OV)", 14, 14),
            ("IP-I (PJK)", 18, 20),
            ("PCOL-II GV", 19, 19),
            ("PCOG DKD", 26, 31),
            ("PJ (KBR)", 20, 22),
            ("IP-I L", 44, 44),
            ("PCOL-II L", 28, 28),
            ("PCOP-II L", 40, 40),
            ("MC-II (PM)", 23, 25),
            ("IP-I (PHN)", 25, 25),
            ("PCOL SK", 21, 25),
            ("PCOG DAK", 23, 23),
            ("PJ (RM)", 28, 31),
        ]
        .into_iter()
        .map(|(name, present, total)| SubjectAttendance::new(name, present, total))
        .collect();

        let today = ["MC-II (OV)", "IP-I (PJK)", "PCOL-II GV"]
            .into_iter()
            .map(|subject| TodayMark {
                subject: subject.to_string(),
                mark: "P".to_string(),
            })
            .collect();

        Ok(AttendanceReport {
            roll_number: identifier.to_string(),
            today,
            subjects,
            last_updated: chrono::Local::now()
                .format("%d/%m/%Y, %I:%M:%S %p")
                .to_string(),
        })
    }
}
