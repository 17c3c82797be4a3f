use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use dropmart_core::DomainError;

/// Inclusive date window `[start, end]`.
///
/// Both bounds are required; "today" defaulting happens at the boundary
/// before the aggregator is called.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::validation(format!(
                "invalid date window: start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn bounds_are_inclusive() {
        let w = DateWindow::new(d("2025-03-01"), d("2025-03-31")).unwrap();
        assert!(w.contains(d("2025-03-01")));
        assert!(w.contains(d("2025-03-31")));
        assert!(!w.contains(d("2025-02-28")));
        assert!(!w.contains(d("2025-04-01")));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = DateWindow::new(d("2025-03-31"), d("2025-03-01")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
