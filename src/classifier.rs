//! Pattern classifier.
//!
//! A [`PatternClassifier`] reads from one immutable [`PatternSnapshot`]. The
//! snapshot owns the compiled regexes for its pattern set, so reloading the
//! configuration builds a fresh snapshot and nothing compiled for the old set
//! can be observed through the new one.

use crate::normalize::{normalize, strip_marks};
use crate::patterns::{builtin_patterns, merge_patterns};
use crate::schema::{
    ClassificationPattern, MatchType, PatternGroup, PatternSource, StatementSection,
};
use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

pub const EXACT_CONFIDENCE: f64 = 1.0;
pub const ANCHORED_CONFIDENCE: f64 = 0.85;
pub const CONTAINS_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_REGEX_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub pattern_id: String,
    pub pattern_name: String,
    pub group: PatternGroup,
    pub match_type: MatchType,
    pub confidence: f64,
    pub source: PatternSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub best_match: Option<PatternMatch>,
    pub confidence: f64,
    pub matches: Vec<PatternMatch>,
}

impl Classification {
    pub fn is_match(&self) -> bool {
        self.best_match.is_some()
    }
}

#[derive(Debug)]
struct CompiledPattern {
    pattern: ClassificationPattern,
    needle: String,
    regex: Option<Regex>,
}

impl CompiledPattern {
    fn compile(pattern: ClassificationPattern) -> Self {
        let regex = if pattern.match_type == MatchType::Regex {
            // Names are matched after normalization, so the source must lose
            // its diacritics too. Lowercasing would change escapes like \S.
            match RegexBuilder::new(&strip_marks(&pattern.value))
                .case_insensitive(true)
                .build()
            {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(
                        "Pattern '{}' has an invalid regex and will never match: {}",
                        pattern.id, e
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            needle: normalize(&pattern.value),
            pattern,
            regex,
        }
    }

    fn confidence_for(&self, normalized_name: &str) -> Option<f64> {
        if self.needle.is_empty() && self.pattern.match_type != MatchType::Regex {
            return None;
        }

        let matched = match self.pattern.match_type {
            MatchType::Contains => normalized_name.contains(&self.needle),
            MatchType::StartsWith => normalized_name.starts_with(&self.needle),
            MatchType::EndsWith => normalized_name.ends_with(&self.needle),
            MatchType::Exact => normalized_name == self.needle,
            MatchType::Regex => self
                .regex
                .as_ref()
                .map(|re| re.is_match(normalized_name))
                .unwrap_or(false),
        };

        if !matched {
            return None;
        }

        Some(match self.pattern.match_type {
            MatchType::Exact => EXACT_CONFIDENCE,
            MatchType::StartsWith | MatchType::EndsWith => ANCHORED_CONFIDENCE,
            MatchType::Contains => CONTAINS_CONFIDENCE,
            MatchType::Regex => self
                .pattern
                .base_confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(DEFAULT_REGEX_CONFIDENCE),
        })
    }
}

/// An immutable, versioned pattern set with its compiled regexes.
#[derive(Debug)]
pub struct PatternSnapshot {
    version: u64,
    definitions: Vec<ClassificationPattern>,
    patterns: Vec<CompiledPattern>,
}

impl PatternSnapshot {
    fn build(version: u64, patterns: Vec<ClassificationPattern>) -> Self {
        // User patterns are evaluated first so they win ties against the
        // built-in catalog.
        let definitions = patterns.clone();
        let (user, builtin): (Vec<_>, Vec<_>) = patterns
            .into_iter()
            .filter(|p| p.enabled)
            .partition(|p| p.source == PatternSource::User);

        let patterns: Vec<CompiledPattern> = user
            .into_iter()
            .chain(builtin)
            .map(CompiledPattern::compile)
            .collect();

        debug!(
            "Built pattern snapshot v{} with {} active patterns",
            version,
            patterns.len()
        );

        Self {
            version,
            definitions,
            patterns,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Every pattern the snapshot was built from, disabled ones included.
    pub fn definitions(&self) -> &[ClassificationPattern] {
        &self.definitions
    }

    /// Number of active patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PatternClassifier {
    snapshot: Arc<PatternSnapshot>,
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::with_builtin_defaults()
    }
}

impl PatternClassifier {
    pub fn new(patterns: Vec<ClassificationPattern>) -> Self {
        Self {
            snapshot: Arc::new(PatternSnapshot::build(1, patterns)),
        }
    }

    pub fn with_builtin_defaults() -> Self {
        Self::new(builtin_patterns())
    }

    /// Built-in catalog plus tenant patterns, see [`merge_patterns`].
    pub fn with_user_patterns(user: &[ClassificationPattern]) -> Self {
        Self::new(merge_patterns(&builtin_patterns(), user))
    }

    /// Publishes a new snapshot for `patterns`. `self` keeps reading the old
    /// one, so in-flight classifications are unaffected.
    pub fn reload(&self, patterns: Vec<ClassificationPattern>) -> Self {
        Self {
            snapshot: Arc::new(PatternSnapshot::build(self.snapshot.version + 1, patterns)),
        }
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    pub fn snapshot(&self) -> &PatternSnapshot {
        &self.snapshot
    }

    pub fn classify(&self, account_name: &str, group: PatternGroup) -> Classification {
        let normalized = normalize(account_name);
        self.classify_normalized(&normalized, group)
    }

    fn classify_normalized(&self, normalized: &str, group: PatternGroup) -> Classification {
        let mut matches: Vec<PatternMatch> = self
            .snapshot
            .patterns
            .iter()
            .filter(|c| c.pattern.group == group)
            .filter_map(|c| {
                c.confidence_for(normalized).map(|confidence| PatternMatch {
                    pattern_id: c.pattern.id.clone(),
                    pattern_name: c.pattern.name.clone(),
                    group,
                    match_type: c.pattern.match_type,
                    confidence,
                    source: c.pattern.source,
                })
            })
            .collect();

        matches.sort_by(compare_matches);

        let best_match = matches.first().cloned();
        let confidence = best_match.as_ref().map(|m| m.confidence).unwrap_or(0.0);

        Classification {
            best_match,
            confidence,
            matches,
        }
    }

    /// The subset of `groups` that `account_name` matches.
    pub fn matched_groups(&self, account_name: &str, groups: &[PatternGroup]) -> Vec<PatternGroup> {
        let normalized = normalize(account_name);
        groups
            .iter()
            .copied()
            .filter(|group| self.classify_normalized(&normalized, *group).is_match())
            .collect()
    }

    /// Resolves a statement section from the section groups. Ties go to cost
    /// of sales, then operating expense, then revenue.
    pub fn classify_section(&self, account_name: &str) -> Option<(StatementSection, f64)> {
        let normalized = normalize(account_name);
        let candidates = [
            (PatternGroup::CostOfSales, StatementSection::CostOfSales),
            (PatternGroup::OperatingExpense, StatementSection::OperatingExpense),
            (PatternGroup::Revenue, StatementSection::Revenue),
        ];

        let mut best: Option<(StatementSection, f64)> = None;
        for (group, section) in candidates {
            let confidence = self.classify_normalized(&normalized, group).confidence;
            if confidence > 0.0 && best.map_or(true, |(_, c)| confidence > c) {
                best = Some((section, confidence));
            }
        }
        best
    }
}

fn compare_matches(a: &PatternMatch, b: &PatternMatch) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| source_rank(a.source).cmp(&source_rank(b.source)))
}

fn source_rank(source: PatternSource) -> u8 {
    match source {
        PatternSource::User => 0,
        PatternSource::Builtin => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: &str, group: PatternGroup, match_type: MatchType, value: &str, source: PatternSource) -> ClassificationPattern {
        ClassificationPattern::new(id, group, match_type, value, source)
    }

    #[test]
    fn test_confidence_by_match_type() {
        let classifier = PatternClassifier::new(vec![
            pattern("c", PatternGroup::Depreciation, MatchType::Contains, "deprec", PatternSource::Builtin),
            pattern("s", PatternGroup::Depreciation, MatchType::StartsWith, "depreciacion", PatternSource::Builtin),
            pattern("e", PatternGroup::Depreciation, MatchType::Exact, "depreciacion de equipos", PatternSource::Builtin),
            pattern("r", PatternGroup::Depreciation, MatchType::Regex, r"equipos$", PatternSource::Builtin),
        ]);

        let result = classifier.classify("Depreciación de Equipos", PatternGroup::Depreciation);

        let scores: Vec<(String, f64)> = result
            .matches
            .iter()
            .map(|m| (m.pattern_id.clone(), m.confidence))
            .collect();
        assert_eq!(
            scores,
            vec![
                ("e".to_string(), 1.0),
                ("s".to_string(), 0.85),
                ("c".to_string(), 0.7),
                ("r".to_string(), 0.6),
            ]
        );
        assert_eq!(result.best_match.unwrap().pattern_id, "e");
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_unmatched_is_not_an_error() {
        let classifier = PatternClassifier::with_builtin_defaults();
        let result = classifier.classify("Arrendamientos", PatternGroup::Depreciation);
        assert!(result.best_match.is_none());
        assert_eq!(result.confidence, 0.0);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_user_pattern_wins_tie() {
        let classifier = PatternClassifier::new(vec![
            pattern("builtin", PatternGroup::Interest, MatchType::Contains, "financ", PatternSource::Builtin),
            pattern("user", PatternGroup::Interest, MatchType::Contains, "financ", PatternSource::User),
        ]);

        let result = classifier.classify("Gastos financieros", PatternGroup::Interest);
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.best_match.unwrap().source, PatternSource::User);
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let classifier = PatternClassifier::new(vec![pattern(
            "broken",
            PatternGroup::Interest,
            MatchType::Regex,
            "(intereses",
            PatternSource::User,
        )]);

        let result = classifier.classify("(intereses bancarios", PatternGroup::Interest);
        assert!(!result.is_match());
    }

    #[test]
    fn test_regex_uses_declared_confidence() {
        let classifier = PatternClassifier::new(vec![pattern(
            "re",
            PatternGroup::Interest,
            MatchType::Regex,
            r"^interes",
            PatternSource::User,
        )
        .with_confidence(0.9)]);

        let result = classifier.classify("Interés corriente", PatternGroup::Interest);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_accented_regex_matches_like_contains() {
        let classifier = PatternClassifier::new(vec![
            pattern("re", PatternGroup::Interest, MatchType::Regex, "interés", PatternSource::User),
            pattern("c", PatternGroup::Interest, MatchType::Contains, "interés", PatternSource::User),
        ]);

        let result = classifier.classify("Interés corriente", PatternGroup::Interest);
        let ids: Vec<&str> = result.matches.iter().map(|m| m.pattern_id.as_str()).collect();
        assert!(ids.contains(&"re"));
        assert!(ids.contains(&"c"));
        assert!(classifier.classify("Comisión", PatternGroup::Interest).matches.is_empty());
    }

    #[test]
    fn test_regex_escapes_survive_mark_stripping() {
        let classifier = PatternClassifier::new(vec![pattern(
            "re",
            PatternGroup::Depreciation,
            MatchType::Regex,
            r"^depreciación\s\D+$",
            PatternSource::User,
        )]);
        assert!(classifier.classify("Depreciación equipos", PatternGroup::Depreciation).is_match());
        assert!(!classifier.classify("Depreciación 2024", PatternGroup::Depreciation).is_match());
    }

    #[test]
    fn test_disabled_patterns_are_skipped() {
        let mut disabled = pattern("d", PatternGroup::Depreciation, MatchType::Contains, "deprec", PatternSource::User);
        disabled.enabled = false;
        let classifier = PatternClassifier::new(vec![disabled]);
        assert!(!classifier.classify("Depreciación", PatternGroup::Depreciation).is_match());
        assert!(classifier.snapshot().is_empty());
        assert_eq!(classifier.snapshot().definitions().len(), 1);
    }

    #[test]
    fn test_reload_publishes_new_snapshot() {
        let original = PatternClassifier::new(vec![pattern(
            "re",
            PatternGroup::Interest,
            MatchType::Regex,
            "prestamo",
            PatternSource::User,
        )]);
        let reloaded = original.reload(vec![pattern(
            "re",
            PatternGroup::Interest,
            MatchType::Regex,
            "leasing",
            PatternSource::User,
        )]);

        assert_eq!(original.version(), 1);
        assert_eq!(reloaded.version(), 2);
        assert!(original.classify("Intereses préstamo", PatternGroup::Interest).is_match());
        assert!(!reloaded.classify("Intereses préstamo", PatternGroup::Interest).is_match());
        assert!(reloaded.classify("Leasing financiero", PatternGroup::Interest).is_match());
    }

    #[test]
    fn test_builtin_sections() {
        let classifier = PatternClassifier::with_builtin_defaults();
        assert_eq!(classifier.classify_section("Ingresos").map(|s| s.0), Some(StatementSection::Revenue));
        assert_eq!(classifier.classify_section("Otros Costos").map(|s| s.0), Some(StatementSection::CostOfSales));
        assert_eq!(classifier.classify_section("Costo de ventas").map(|s| s.0), Some(StatementSection::CostOfSales));
        assert_eq!(
            classifier.classify_section("Gastos de administración").map(|s| s.0),
            Some(StatementSection::OperatingExpense)
        );
        assert_eq!(classifier.classify_section("Depreciación de equipos"), None);
    }

    #[test]
    fn test_matched_groups() {
        let classifier = PatternClassifier::with_builtin_defaults();
        let groups = classifier.matched_groups("Intereses y amortización de préstamos", &PatternGroup::EXCLUSION_GROUPS);
        assert_eq!(groups, vec![PatternGroup::Depreciation, PatternGroup::Interest]);
    }
}
