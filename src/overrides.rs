use crate::schema::{ClassificationPattern, MatchType, PatternSource};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tenant edits to a pattern list, as produced by the configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatternOverrides {
    #[schemars(description = "Patterns to add. They can be targeted by the modifications below.")]
    #[serde(default)]
    pub new_patterns: Vec<ClassificationPattern>,

    #[schemars(description = "Ordered list of edits, applied after new patterns are added.")]
    #[serde(default)]
    pub modifications: Vec<PatternModification>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PatternModification {
    /// Change the display name of a pattern.
    Rename {
        #[schemars(description = "The id of the pattern.")]
        target: String,
        new_name: String,
    },

    /// Replace the text (and optionally the match type) of a pattern.
    UpdateValue {
        target: String,
        value: String,
        match_type: Option<MatchType>,
    },

    /// Set the confidence reported for regex matches.
    SetConfidence { target: String, confidence: f64 },

    /// Keep the pattern but stop matching with it.
    Disable { target: String },

    Enable { target: String },

    /// Remove the pattern entirely.
    Delete { target: String },
}

impl PatternOverrides {
    /// Applies the overrides to `base`, returning a new list. Edited patterns
    /// become user patterns so they take priority over the built-in catalog.
    pub fn apply(&self, base: &[ClassificationPattern]) -> Vec<ClassificationPattern> {
        let mut patterns = base.to_vec();
        patterns.extend(self.new_patterns.iter().cloned());

        for modification in &self.modifications {
            apply_single_modification(&mut patterns, modification);
        }

        patterns
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn apply_single_modification(
    patterns: &mut Vec<ClassificationPattern>,
    modification: &PatternModification,
) {
    match modification {
        PatternModification::Rename { target, new_name } => {
            if let Some(p) = find_mut(patterns, target) {
                p.name = new_name.clone();
            }
        }

        PatternModification::UpdateValue {
            target,
            value,
            match_type,
        } => {
            if let Some(p) = find_mut(patterns, target) {
                p.value = value.clone();
                if let Some(t) = match_type {
                    p.match_type = *t;
                }
                p.source = PatternSource::User;
            }
        }

        PatternModification::SetConfidence { target, confidence } => {
            if let Some(p) = find_mut(patterns, target) {
                p.base_confidence = Some(*confidence);
                p.source = PatternSource::User;
            }
        }

        PatternModification::Disable { target } => {
            if let Some(p) = find_mut(patterns, target) {
                p.enabled = false;
            }
        }

        PatternModification::Enable { target } => {
            if let Some(p) = find_mut(patterns, target) {
                p.enabled = true;
            }
        }

        PatternModification::Delete { target } => {
            patterns.retain(|p| &p.id != target);
        }
    }
}

fn find_mut<'a>(
    patterns: &'a mut [ClassificationPattern],
    id: &str,
) -> Option<&'a mut ClassificationPattern> {
    let found = patterns.iter_mut().find(|p| p.id == id);
    if found.is_none() {
        debug!("Pattern override targets unknown id '{}'", id);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::builtin_patterns;
    use crate::schema::PatternGroup;

    #[test]
    fn test_apply_leaves_base_untouched() {
        let base = builtin_patterns();
        let overrides = PatternOverrides {
            new_patterns: vec![ClassificationPattern::user(
                "tenant-int-leasing",
                PatternGroup::Interest,
                MatchType::Contains,
                "leasing",
            )],
            modifications: vec![
                PatternModification::Disable {
                    target: "builtin-dep-agotamiento".to_string(),
                },
                PatternModification::Delete {
                    target: "builtin-dep-d-and-a".to_string(),
                },
                PatternModification::UpdateValue {
                    target: "tenant-int-leasing".to_string(),
                    value: "leasing financiero".to_string(),
                    match_type: Some(MatchType::StartsWith),
                },
            ],
        };

        let patterns = overrides.apply(&base);

        assert_eq!(patterns.len(), base.len());
        assert!(base.iter().all(|p| p.enabled));
        assert!(!patterns.iter().find(|p| p.id == "builtin-dep-agotamiento").unwrap().enabled);
        assert!(patterns.iter().all(|p| p.id != "builtin-dep-d-and-a"));

        let leasing = patterns.iter().find(|p| p.id == "tenant-int-leasing").unwrap();
        assert_eq!(leasing.value, "leasing financiero");
        assert_eq!(leasing.match_type, MatchType::StartsWith);
    }

    #[test]
    fn test_edits_promote_builtin_to_user() {
        let overrides = PatternOverrides {
            new_patterns: vec![],
            modifications: vec![PatternModification::SetConfidence {
                target: "builtin-int-interes-word".to_string(),
                confidence: 0.95,
            }],
        };

        let patterns = overrides.apply(&builtin_patterns());
        let edited = patterns.iter().find(|p| p.id == "builtin-int-interes-word").unwrap();
        assert_eq!(edited.base_confidence, Some(0.95));
        assert_eq!(edited.source, PatternSource::User);
    }

    #[test]
    fn test_from_json() {
        let overrides = PatternOverrides::from_json(
            r#"{"modifications": [{"action": "rename", "target": "builtin-rev-venta", "new_name": "Ventas"}]}"#,
        )
        .unwrap();

        let patterns = overrides.apply(&builtin_patterns());
        assert_eq!(
            patterns.iter().find(|p| p.id == "builtin-rev-venta").unwrap().name,
            "Ventas"
        );
    }
}
