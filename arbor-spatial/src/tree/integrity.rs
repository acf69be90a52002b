//! Structural checks of a tree.

use std::fmt;

use crate::persistent::PageId;

/// Result of a structural check.
///
/// Trees fill this while walking every node; a report without errors means
/// the bounding invariants, fill limits and level structure all hold.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    /// Nodes visited
    pub nodes_checked: u64,
    /// Objects found in leaves
    pub entries_found: u64,
    /// Pages with at least one violation
    pub invalid_pages: Vec<PageId>,
    /// One message per violation
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records a violation found on `page`.
    pub fn violation(&mut self, page: PageId, message: impl Into<String>) {
        if self.invalid_pages.last() != Some(&page) {
            self.invalid_pages.push(page);
        }
        self.errors.push(format!("page {}: {}", page, message.into()));
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(
                f,
                "valid ({} nodes, {} entries)",
                self.nodes_checked, self.entries_found
            )
        } else {
            write!(f, "{} violations: {}", self.errors.len(), self.errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_valid() {
        let report = IntegrityReport::new();
        assert!(report.is_valid());
        assert!(report.to_string().starts_with("valid"));
    }

    #[test]
    fn test_violations_accumulate() {
        let mut report = IntegrityReport::new();
        report.violation(3, "underfull");
        report.violation(3, "bad bounds");
        report.violation(5, "bad level");
        assert!(!report.is_valid());
        assert_eq!(report.invalid_pages, vec![3, 5]);
        assert_eq!(report.errors.len(), 3);
        assert!(report.to_string().contains("page 3: underfull"));
    }
}
