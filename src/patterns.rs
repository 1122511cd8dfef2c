use crate::error::{Result, StatementEngineError};
use crate::schema::{ClassificationPattern, MatchType, PatternGroup, PatternSource};
use regex::RegexBuilder;
use std::collections::HashSet;

/// Default catalog shipped with the engine. Ids are stable so tenants can
/// override or disable individual entries.
pub fn builtin_patterns() -> Vec<ClassificationPattern> {
    use MatchType::*;
    use PatternGroup::*;

    let entries: &[(&str, PatternGroup, MatchType, &str, Option<f64>)] = &[
        ("builtin-dep-depreciacion", Depreciation, Contains, "depreciacion", None),
        ("builtin-dep-amortizacion", Depreciation, Contains, "amortizacion", None),
        ("builtin-dep-agotamiento", Depreciation, Contains, "agotamiento", None),
        ("builtin-dep-depreciation", Depreciation, Contains, "depreciation", None),
        ("builtin-dep-amortization", Depreciation, Contains, "amortization", None),
        ("builtin-dep-d-and-a", Depreciation, Regex, r"\bd\s*&\s*a\b", Some(0.65)),
        ("builtin-int-intereses", Interest, Contains, "intereses", None),
        ("builtin-int-interes-word", Interest, Regex, r"\binteres(es)?\b", Some(0.75)),
        ("builtin-int-gastos-financieros", Interest, Contains, "gastos financieros", None),
        ("builtin-int-costos-financieros", Interest, Contains, "costos financieros", None),
        ("builtin-int-interest-expense", Interest, Contains, "interest expense", None),
        ("builtin-int-financial-expense", Interest, Contains, "financial expense", None),
        ("builtin-rev-ingresos-exact", Revenue, Exact, "ingresos", None),
        ("builtin-rev-ingreso", Revenue, StartsWith, "ingreso", None),
        ("builtin-rev-venta", Revenue, StartsWith, "venta", None),
        ("builtin-rev-sales", Revenue, StartsWith, "sales", None),
        ("builtin-rev-revenue", Revenue, Contains, "revenue", None),
        ("builtin-cos-costo", CostOfSales, Contains, "costo", None),
        ("builtin-cos-cost-of", CostOfSales, Contains, "cost of", None),
        ("builtin-cos-cogs", CostOfSales, Regex, r"\bcogs\b", Some(0.8)),
        ("builtin-opex-gasto", OperatingExpense, StartsWith, "gasto", None),
        ("builtin-opex-gastos-de", OperatingExpense, Contains, "gastos de", None),
        ("builtin-opex-operating-expense", OperatingExpense, Contains, "operating expense", None),
        ("builtin-opex-expenses", OperatingExpense, EndsWith, "expenses", None),
    ];

    entries
        .iter()
        .map(|(id, group, match_type, value, confidence)| ClassificationPattern {
            id: id.to_string(),
            group: *group,
            match_type: *match_type,
            value: value.to_string(),
            name: value.to_string(),
            source: PatternSource::Builtin,
            base_confidence: *confidence,
            enabled: true,
        })
        .collect()
}

/// Combines the built-in catalog with tenant patterns. A user pattern whose
/// id matches a built-in one replaces it in place; the rest are appended.
pub fn merge_patterns(
    builtin: &[ClassificationPattern],
    user: &[ClassificationPattern],
) -> Vec<ClassificationPattern> {
    let mut merged: Vec<ClassificationPattern> = builtin.to_vec();

    for pattern in user {
        match merged.iter_mut().find(|p| p.id == pattern.id) {
            Some(existing) => *existing = pattern.clone(),
            None => merged.push(pattern.clone()),
        }
    }

    merged
}

pub fn validate_pattern(pattern: &ClassificationPattern) -> Result<()> {
    if pattern.id.trim().is_empty() {
        return Err(StatementEngineError::InvalidPattern {
            id: pattern.id.clone(),
            details: "id must not be empty".to_string(),
        });
    }

    if pattern.value.trim().is_empty() {
        return Err(StatementEngineError::InvalidPattern {
            id: pattern.id.clone(),
            details: "value must not be empty".to_string(),
        });
    }

    if let Some(confidence) = pattern.base_confidence {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(StatementEngineError::InvalidPattern {
                id: pattern.id.clone(),
                details: format!("base confidence {} must be between 0.0 and 1.0", confidence),
            });
        }
    }

    Ok(())
}

pub fn validate_patterns(patterns: &[ClassificationPattern]) -> Result<()> {
    let mut seen = HashSet::new();
    for pattern in patterns {
        validate_pattern(pattern)?;
        if !seen.insert(pattern.id.as_str()) {
            return Err(StatementEngineError::InvalidPattern {
                id: pattern.id.clone(),
                details: "duplicate pattern id".to_string(),
            });
        }
    }
    Ok(())
}

/// Regex patterns that fail to compile, with the compiler's message. These
/// never match during classification; this is for configuration previews.
pub fn regex_diagnostics(patterns: &[ClassificationPattern]) -> Vec<(String, String)> {
    patterns
        .iter()
        .filter(|p| p.match_type == MatchType::Regex)
        .filter_map(|p| {
            RegexBuilder::new(&p.value)
                .case_insensitive(true)
                .build()
                .err()
                .map(|e| (p.id.clone(), e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let patterns = builtin_patterns();
        assert!(validate_patterns(&patterns).is_ok());
        assert!(regex_diagnostics(&patterns).is_empty());
        assert!(patterns.iter().all(|p| p.source == PatternSource::Builtin));
        assert!(patterns.iter().any(|p| p.group == PatternGroup::Depreciation));
        assert!(patterns.iter().any(|p| p.group == PatternGroup::Interest));
    }

    #[test]
    fn test_merge_replaces_builtin_by_id() {
        let builtin = builtin_patterns();
        let mut replacement = ClassificationPattern::user(
            "builtin-dep-agotamiento",
            PatternGroup::Depreciation,
            MatchType::Contains,
            "desgaste",
        );
        replacement.enabled = false;
        let extra = ClassificationPattern::user(
            "tenant-dep-1",
            PatternGroup::Depreciation,
            MatchType::Exact,
            "deterioro de cartera",
        );

        let merged = merge_patterns(&builtin, &[replacement, extra]);

        assert_eq!(merged.len(), builtin.len() + 1);
        let replaced = merged.iter().find(|p| p.id == "builtin-dep-agotamiento").unwrap();
        assert_eq!(replaced.value, "desgaste");
        assert!(!replaced.enabled);
        assert_eq!(merged.last().unwrap().id, "tenant-dep-1");
    }

    #[test]
    fn test_validation_rejects_bad_patterns() {
        let empty = ClassificationPattern::user("x", PatternGroup::Interest, MatchType::Contains, "  ");
        assert!(validate_pattern(&empty).is_err());

        let confident = ClassificationPattern::user("y", PatternGroup::Interest, MatchType::Regex, "int")
            .with_confidence(1.5);
        assert!(validate_pattern(&confident).is_err());

        let a = ClassificationPattern::user("dup", PatternGroup::Interest, MatchType::Contains, "a");
        let b = ClassificationPattern::user("dup", PatternGroup::Interest, MatchType::Contains, "b");
        assert!(validate_patterns(&[a, b]).is_err());
    }

    #[test]
    fn test_regex_diagnostics_reports_invalid_regex() {
        let broken = ClassificationPattern::user("bad", PatternGroup::Interest, MatchType::Regex, "(unclosed");
        let diagnostics = regex_diagnostics(&[broken]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].0, "bad");
    }
}
