//! Case-insensitive substring filter shared by `stack` and `heap`.

/// Optional search phrase; no phrase lets everything through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Stored lowercased
    needle: Option<String>,
}

impl SearchFilter {
    /// Build a filter; an empty phrase behaves like no phrase.
    #[must_use]
    pub fn new(phrase: Option<&str>) -> Self {
        Self { needle: phrase.filter(|p| !p.is_empty()).map(str::to_lowercase) }
    }

    /// A filter that lets everything through.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.needle.is_some()
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        match &self.needle {
            Some(needle) => text.to_lowercase().contains(needle.as_str()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filter_matches_everything() {
        assert!(SearchFilter::none().matches(""));
        assert!(SearchFilter::new(Some("")).matches("anything"));
        assert!(!SearchFilter::new(Some("")).is_active());
    }

    #[test]
    fn test_match_ignores_case() {
        let filter = SearchFilter::new(Some("DICTIONARY"));
        assert!(filter.matches("System.Collections.Generic.Dictionary<String, Int32>"));
        assert!(!filter.matches("System.String"));
    }

    #[test]
    fn test_phrase_with_spaces() {
        let filter = SearchFilter::new(Some("string, int32"));
        assert!(filter.matches("Dictionary<String, Int32>"));
    }
}
