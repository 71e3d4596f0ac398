//! Attendance register model and its chat rendering.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Minimum attendance percentage the institute requires.
pub const REQUIRED_PERCENTAGE: u32 = 75;

/// Attendance for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAttendance {
    pub name: String,
    pub present: u32,
    pub total: u32,
}

impl SubjectAttendance {
    pub fn new(name: impl Into<String>, present: u32, total: u32) -> Self {
        Self {
            name: name.into(),
            present,
            total,
        }
    }

    pub fn percentage(&self) -> f64 {
        percentage(self.present, self.total)
    }
}

/// One entry of today's register, e.g. `("MC-II (OV)", "P")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayMark {
    pub subject: String,
    pub mark: String,
}

/// Everything the portal reports for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub roll_number: String,
    #[serde(default)]
    pub today: Vec<TodayMark>,
    pub subjects: Vec<SubjectAttendance>,
    /// Portal-side timestamp, already formatted for display.
    pub last_updated: String,
}

impl AttendanceReport {
    pub fn total_present(&self) -> u32 {
        self.subjects.iter().map(|s| s.present).sum()
    }

    pub fn total_classes(&self) -> u32 {
        self.subjects.iter().map(|s| s.total).sum()
    }

    pub fn overall_percentage(&self) -> f64 {
        percentage(self.total_present(), self.total_classes())
    }

    /// How many further classes can be missed while staying at or above
    /// `required` percent.
    pub fn skippable_hours(&self, required: u32) -> u32 {
        if required == 0 {
            return u32::MAX;
        }
        let present = u64::from(self.total_present());
        let total = u64::from(self.total_classes());
        let reachable = present * 100 / u64::from(required);
        reachable.saturating_sub(total).min(u64::from(u32::MAX)) as u32
    }
}

fn percentage(present: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(present) * 100.0 / f64::from(total)
}

/// Render a report as a plain-text chat message.
pub fn format_report(report: &AttendanceReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Hi, Roll Number: {}", report.roll_number);
    let _ = writeln!(
        out,
        "Total: {}/{} ({:.2}%)",
        report.total_present(),
        report.total_classes(),
        report.overall_percentage()
    );
    out.push('\n');

    let skip = report.skippable_hours(REQUIRED_PERCENTAGE);
    if skip > 0 {
        let _ = writeln!(
            out,
            "You can skip {skip} hours and still maintain above {REQUIRED_PERCENTAGE}%."
        );
    } else {
        let _ = writeln!(
            out,
            "Warning: your attendance is at or below {REQUIRED_PERCENTAGE}%! Attend all classes."
        );
    }
    out.push('\n');

    if !report.today.is_empty() {
        out.push_str("Today's Attendance:\n");
        for entry in &report.today {
            let _ = writeln!(out, "{}: {}", entry.subject, entry.mark);
        }
        out.push('\n');
    }

    out.push_str("Subject-wise Attendance:\n");
    for subject in &report.subjects {
        let _ = writeln!(
            out,
            "{}: {}/{} ({:.2}%)",
            subject.name,
            subject.present,
            subject.total,
            subject.percentage()
        );
    }

    let _ = write!(out, "\nLast Updated: {}", report.last_updated);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(subjects: Vec<SubjectAttendance>) -> AttendanceReport {
        AttendanceReport {
            roll_number: "21A81R0001".into(),
            today: vec![TodayMark {
                subject: "MC-II (OV)".into(),
                mark: "P".into(),
            }],
            subjects,
            last_updated: "01/02/2026, 10:00:00 AM".into(),
        }
    }

    #[test]
    fn totals_sum_subjects() {
        let r = report(vec![
            SubjectAttendance::new("A", 14, 14),
            SubjectAttendance::new("B", 18, 20),
        ]);
        assert_eq!(r.total_present(), 32);
        assert_eq!(r.total_classes(), 34);
        assert!((r.overall_percentage() - 94.117).abs() < 0.01);
    }

    #[test]
    fn skippable_hours_at_75_percent() {
        // 329 / (347 + 91) = 75.11%, 329 / (347 + 92) = 74.94%
        let r = report(vec![SubjectAttendance::new("All", 329, 347)]);
        assert_eq!(r.skippable_hours(75), 91);
    }

    #[test]
    fn skippable_hours_below_threshold_is_zero() {
        let r = report(vec![SubjectAttendance::new("All", 10, 20)]);
        assert_eq!(r.skippable_hours(75), 0);
    }

    #[test]
    fn empty_report_has_zero_percentage() {
        let r = report(Vec::new());
        assert_eq!(r.overall_percentage(), 0.0);
        assert_eq!(r.skippable_hours(75), 0);
    }

    #[test]
    fn format_contains_sections() {
        let text = format_report(&report(vec![
            SubjectAttendance::new("MC-II (OV)", 14, 14),
            SubjectAttendance::new("IP-I (PJK)", 18, 20),
        ]));

        assert!(text.starts_with("Hi, Roll Number: 21A81R0001\n"));
        assert!(text.contains("Total: 32/34 (94.12%)"));
        assert!(text.contains("You can skip 8 hours"));
        assert!(text.contains("Today's Attendance:\nMC-II (OV): P\n"));
        assert!(text.contains("IP-I (PJK): 18/20 (90.00%)"));
        assert!(text.ends_with("Last Updated: 01/02/2026, 10:00:00 AM"));
    }

    #[test]
    fn format_warns_when_nothing_to_skip() {
        let mut r = report(vec![SubjectAttendance::new("PJ", 3, 10)]);
        r.today.clear();
        let text = format_report(&r);
        assert!(text.contains("Warning: your attendance is at or below 75%"));
        assert!(!text.contains("Today's Attendance"));
    }
}
