//! Line scanning over unstructured tool output.
//!
//! Both progress inference and failure classification are driven by ordered
//! rule tables: each rule is a set of case-insensitive substrings and an
//! outcome, evaluated top to bottom, first match wins. Keeping the tables as
//! data means rules can be tested and extended without touching the code
//! that walks them.

pub mod classify;
pub mod phase;

pub use classify::ErrorClassifier;
pub use phase::{PhaseProgressTracker, PhaseRule, PhaseState, PhaseUpdate};

/// One rule: any of `patterns` matching selects `outcome`.
#[derive(Debug, Clone)]
pub struct Rule<T> {
    /// Lowercased substrings
    patterns: Vec<String>,
    outcome: T,
}

impl<T> Rule<T> {
    pub fn outcome(&self) -> &T {
        &self.outcome
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn matches_lower(&self, haystack: &str) -> bool {
        self.patterns.iter().any(|p| haystack.contains(p.as_str()))
    }
}

/// Ordered, first-match-wins substring rules.
#[derive(Debug, Clone)]
pub struct RuleTable<T> {
    rules: Vec<Rule<T>>,
}

impl<T> RuleTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        RuleTable { rules: Vec::new() }
    }

    /// Append a rule. Rules added earlier take priority.
    pub fn rule<I, S>(mut self, patterns: I, outcome: T) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push(patterns, outcome);
        self
    }

    /// Append a rule in place.
    pub fn push<I, S>(&mut self, patterns: I, outcome: T)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self.rules.push(Rule { patterns, outcome });
    }

    /// Outcome of the first rule matching `text`, ignoring case.
    pub fn first_match(&self, text: &str) -> Option<&T> {
        self.first_match_lower(&text.to_lowercase())
    }

    /// Like [`first_match`](Self::first_match) for text that is already lowercase.
    pub fn first_match_lower(&self, lower: &str) -> Option<&T> {
        self.rules
            .iter()
            .find(|r| r.matches_lower(lower))
            .map(|r| &r.outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule<T>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<T> Default for RuleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let table = RuleTable::new()
            .rule(["cook"], "first")
            .rule(["cooking"], "second");

        assert_eq!(table.first_match("Cooking maps"), Some(&"first"));
    }

    #[test]
    fn test_match_ignores_case() {
        let table = RuleTable::new().rule(["Error C"], 1);
        assert_eq!(table.first_match("module.cpp(12): ERROR c2065"), Some(&1));
        assert_eq!(table.first_match("all good"), None);
    }

    #[test]
    fn test_empty_patterns_are_dropped() {
        let table = RuleTable::new().rule(["", "x"], ());
        assert_eq!(table.iter().next().unwrap().patterns(), ["x".to_string()]);
        assert!(table.first_match("abc").is_none());
    }
}
