/// Decides whether a message text must be hidden from other users.
pub trait ContentFilter: Send + Sync {
    fn should_hide(&self, text: &str) -> bool;
}

/// Case-insensitive substring match against an operator-supplied list.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Parse a comma-separated list, e.g. from `MUTUAL_BANNED_KEYWORDS`.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl ContentFilter for KeywordFilter {
    fn should_hide(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_allows_everything() {
        let filter = KeywordFilter::from_csv("");
        assert!(filter.keywords().is_empty());
        assert!(!filter.should_hide("anything at all"));
    }

    #[test]
    fn matches_substrings_case_insensitively() {
        let filter = KeywordFilter::from_csv(" Spam , scam,,");
        assert_eq!(filter.keywords(), ["spam", "scam"]);
        assert!(filter.should_hide("Free SPAMMING here"));
        assert!(filter.should_hide("not a scam"));
        assert!(!filter.should_hide("hello there"));
    }
}
