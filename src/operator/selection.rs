//! Comparison selection

/// Most products that can be compared side by side
pub const MAX_COMPARISON: usize = 3;

/// Result of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// Selection already full; nothing changed
    Full,
}

impl ToggleOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, ToggleOutcome::Full)
    }
}

/// Ordered set of selected product ids, at most [`MAX_COMPARISON`] long
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComparisonSelection {
    ids: Vec<String>,
}

impl ComparisonSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add if absent and there is room, remove if present
    pub fn toggle(&mut self, product_id: &str) -> ToggleOutcome {
        if let Some(index) = self.ids.iter().position(|id| id == product_id) {
            self.ids.remove(index);
            return ToggleOutcome::Removed;
        }

        if self.ids.len() >= MAX_COMPARISON {
            return ToggleOutcome::Full;
        }

        self.ids.push(product_id.to_string());
        ToggleOutcome::Added
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.ids.iter().any(|id| id == product_id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourth_product_is_rejected() {
        let mut selection = ComparisonSelection::new();

        assert_eq!(selection.toggle("A"), ToggleOutcome::Added);
        assert_eq!(selection.ids(), ["A"]);
        assert_eq!(selection.toggle("B"), ToggleOutcome::Added);
        assert_eq!(selection.ids(), ["A", "B"]);
        assert_eq!(selection.toggle("C"), ToggleOutcome::Added);
        assert_eq!(selection.ids(), ["A", "B", "C"]);

        assert_eq!(selection.toggle("D"), ToggleOutcome::Full);
        assert_eq!(selection.ids(), ["A", "B", "C"]);
    }

    #[test]
    fn test_double_toggle_restores_membership() {
        let mut selection = ComparisonSelection::new();
        selection.toggle("A");
        selection.toggle("B");

        for id in ["A", "C", "Z"] {
            let before = selection.contains(id);
            selection.toggle(id);
            selection.toggle(id);
            assert_eq!(selection.contains(id), before, "membership of {}", id);
        }
    }

    #[test]
    fn test_size_never_exceeds_limit() {
        let mut selection = ComparisonSelection::new();
        let sequence = ["A", "B", "C", "D", "A", "E", "F", "B", "G", "C", "H", "E"];

        for id in sequence {
            selection.toggle(id);
            assert!(selection.len() <= MAX_COMPARISON);
        }
    }
}
