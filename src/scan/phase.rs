//! Phase and progress inference from tool output.
//!
//! The engine tools do not report machine-readable progress, so progress is
//! an approximation: a rule table maps recognizable lines to a phase label
//! and a suggested percentage, and a bare `NN%` token anywhere on a line can
//! push the percentage further. The emitted percentage never goes down within
//! a run, even when a later phase reuses words from an earlier one.

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;

use super::RuleTable;

/// Label shown before any phase has been recognized.
pub const INITIAL_PHASE: &str = "Starting…";

/// Bare percentage token, e.g. `50%`, `[ 7%]`, `12.5 %`.
static PERCENT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.])(\d{1,3})(?:\.\d+)?\s?%").expect("percent token pattern is valid")
});

/// Outcome of a phase rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRule {
    pub label: String,
    pub percent: u8,
}

impl PhaseRule {
    pub fn new(label: impl Into<String>, percent: u8) -> Self {
        PhaseRule {
            label: label.into(),
            percent: percent.min(100),
        }
    }
}

/// Emitted whenever the phase label or percentage changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseUpdate {
    pub phase: String,
    pub percent: u8,
    pub timestamp: DateTime<Local>,
}

/// Current best-effort progress view of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseState {
    pub phase: String,
    pub percent: u8,
    pub updated_at: DateTime<Local>,
}

impl PhaseState {
    fn initial() -> Self {
        PhaseState {
            phase: INITIAL_PHASE.to_string(),
            percent: 0,
            updated_at: Local::now(),
        }
    }
}

impl Default for PhaseState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Default rules for the engine's build, cook and automation tools.
///
/// Later phases come first so that a line mentioning several phases picks
/// the most advanced one.
pub fn default_rules() -> RuleTable<PhaseRule> {
    RuleTable::new()
        .rule(
            ["build successful", "exitcode=0 (success)", "result: succeeded"],
            PhaseRule::new("Finished…", 100),
        )
        .rule(["archiving", "archive command"], PhaseRule::new("Archiving build…", 95))
        .rule(
            ["creating pak", "unrealpak", "package command"],
            PhaseRule::new("Packaging content…", 85),
        )
        .rule(
            ["staging files", "stage command", "copying to staging"],
            PhaseRule::new("Staging files…", 75),
        )
        .rule(["cooking", "cook command"], PhaseRule::new("Cooking content…", 40))
        .rule(
            ["writing project files", "writing solution"],
            PhaseRule::new("Writing project files…", 80),
        )
        .rule(
            ["generating project files", "discovering modules", "generating data for project"],
            PhaseRule::new("Generating project files…", 20),
        )
        .rule(["] link", "linking"], PhaseRule::new("Linking…", 30))
        .rule(["] compile", "compiling"], PhaseRule::new("Compiling…", 15))
        .rule(
            ["parsing headers", "unrealheadertool", "running uht"],
            PhaseRule::new("Parsing headers…", 10),
        )
        .rule(
            ["building ", "determining max actions", "build command"],
            PhaseRule::new("Preparing build…", 5),
        )
}

/// Maps output lines to phases and a monotonic percentage.
///
/// A run is opened by [`reset`](Self::reset) and closed by
/// [`finish`](Self::finish). Lines observed while no run is open are ignored,
/// so a caller that forgets to reset cannot carry a stale percentage into the
/// next job.
#[derive(Debug, Clone)]
pub struct PhaseProgressTracker {
    rules: RuleTable<PhaseRule>,
    state: PhaseState,
    open: bool,
}

impl PhaseProgressTracker {
    /// Create a tracker with the default rule table, with a run open.
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Create a tracker with custom rules, with a run open.
    pub fn with_rules(rules: RuleTable<PhaseRule>) -> Self {
        PhaseProgressTracker {
            rules,
            state: PhaseState::initial(),
            open: true,
        }
    }

    /// Start a new run: percentage back to 0, label back to the initial one.
    pub fn reset(&mut self) {
        self.state = PhaseState::initial();
        self.open = true;
    }

    /// Close the current run.
    pub fn finish(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Current phase view.
    pub fn state(&self) -> &PhaseState {
        &self.state
    }

    /// Feed one output line.
    pub fn observe(&mut self, line: &str) -> Option<PhaseUpdate> {
        if !self.open {
            tracing::warn!("phase tracker observed output without a reset; ignoring");
            return None;
        }

        let rule = self.rules.first_match_lower(&line.to_lowercase());
        let last = self.state.percent;

        // A numeric token only counts when it moves progress forward, and
        // then it beats the rule's suggestion.
        let numeric = parse_percent(line).filter(|n| *n > last);
        let candidate = numeric.or(rule.map(|r| r.percent));
        let percent = candidate.map_or(last, |c| c.max(last)).min(100);

        let label_changed = rule.is_some_and(|r| r.label != self.state.phase);
        if !label_changed && percent == last {
            return None;
        }

        if let Some(rule) = rule {
            self.state.phase.clone_from(&rule.label);
        }
        self.state.percent = percent;
        self.state.updated_at = Local::now();

        Some(PhaseUpdate {
            phase: self.state.phase.clone(),
            percent,
            timestamp: self.state.updated_at,
        })
    }
}

impl Default for PhaseProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest bare percentage token on the line, if any is in 0..=100.
fn parse_percent(line: &str) -> Option<u8> {
    PERCENT_TOKEN
        .captures_iter(line)
        .filter_map(|c| c.get(1)?.as_str().parse::<u16>().ok())
        .filter(|n| *n <= 100)
        .max()
        .map(|n| n as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn trajectory(tracker: &mut PhaseProgressTracker, lines: &[String]) -> Vec<(String, u8)> {
        lines
            .iter()
            .filter_map(|l| tracker.observe(l))
            .map(|u| (u.phase, u.percent))
            .collect()
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("50%"), Some(50));
        assert_eq!(parse_percent("[ 7%] Building"), Some(7));
        assert_eq!(parse_percent("progress 12.5 %"), Some(12));
        assert_eq!(parse_percent("10% then 30%"), Some(30));
        assert_eq!(parse_percent("450%"), None);
        assert_eq!(parse_percent("no percent here"), None);
    }

    #[test]
    fn test_cook_then_stage_scenario() {
        let mut tracker = PhaseProgressTracker::new();
        tracker.reset();

        let first = tracker.observe("Cooking…").unwrap();
        assert_eq!(first.phase, "Cooking content…");
        assert_eq!(first.percent, 40);

        let second = tracker.observe("50%").unwrap();
        assert_eq!(second.phase, "Cooking content…");
        assert_eq!(second.percent, 50);

        let third = tracker.observe("Staging files").unwrap();
        assert_eq!(third.phase, "Staging files…");
        assert!(third.percent >= 50);

        assert_eq!(tracker.state().phase, "Staging files…");
    }

    #[test]
    fn test_numeric_beats_rule_when_higher() {
        let mut tracker = PhaseProgressTracker::new();
        let update = tracker.observe("[62%] Compiling Module.cpp").unwrap();
        assert_eq!(update.phase, "Compiling…");
        assert_eq!(update.percent, 62);
    }

    #[test]
    fn test_earlier_phase_does_not_rewind() {
        let mut tracker = PhaseProgressTracker::new();
        tracker.observe("Staging files");
        let update = tracker.observe("[3/4] Compile Shader.cpp").unwrap();
        assert_eq!(update.phase, "Compiling…");
        assert_eq!(update.percent, 75);
    }

    #[test]
    fn test_unchanged_line_emits_nothing() {
        let mut tracker = PhaseProgressTracker::new();
        assert!(tracker.observe("LogInit: Display: hello").is_none());
        tracker.observe("Cooking maps");
        assert!(tracker.observe("Cooking more maps").is_none());
        assert!(tracker.observe("20%").is_none());
    }

    #[test]
    fn test_finished_tracker_ignores_output_until_reset() {
        let mut tracker = PhaseProgressTracker::new();
        tracker.observe("80%");
        tracker.finish();

        assert!(tracker.observe("90%").is_none());
        assert_eq!(tracker.state().percent, 80);

        tracker.reset();
        assert_eq!(tracker.state().percent, 0);
        assert_eq!(tracker.state().phase, INITIAL_PHASE);
        assert_eq!(tracker.observe("10%").unwrap().percent, 10);
    }

    #[test]
    fn test_custom_rules() {
        let rules = RuleTable::new().rule(["step one"], PhaseRule::new("One", 10));
        let mut tracker = PhaseProgressTracker::with_rules(rules);
        assert_eq!(tracker.observe("STEP ONE").unwrap().phase, "One");
        assert!(tracker.observe("Cooking").is_none());
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Cooking…".to_string()),
            Just("Staging files".to_string()),
            Just("[1/9] Compile A.cpp".to_string()),
            Just("Linking libGame.so".to_string()),
            Just("BUILD SUCCESSFUL".to_string()),
            (0u16..=120).prop_map(|n| format!("{}%", n)),
            "[a-z ]{0,20}",
        ]
    }

    proptest! {
        #[test]
        fn prop_percent_never_decreases(lines in prop::collection::vec(line_strategy(), 0..60)) {
            let mut tracker = PhaseProgressTracker::new();
            tracker.reset();
            let mut last = 0u8;
            for line in &lines {
                if let Some(update) = tracker.observe(line) {
                    prop_assert!(update.percent >= last);
                    prop_assert!(update.percent <= 100);
                    last = update.percent;
                }
            }
        }

        #[test]
        fn prop_reset_reproduces_trajectory(
            history in prop::collection::vec(line_strategy(), 0..40),
            lines in prop::collection::vec(line_strategy(), 0..40),
        ) {
            let mut fresh = PhaseProgressTracker::new();
            fresh.reset();
            let expected = trajectory(&mut fresh, &lines);

            let mut reused = PhaseProgressTracker::new();
            trajectory(&mut reused, &history);
            reused.finish();
            reused.reset();
            prop_assert_eq!(trajectory(&mut reused, &lines), expected);
        }
    }
}
