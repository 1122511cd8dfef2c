use crate::schema::AccountNode;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A user-facing annotation on a node. Recomputed on every call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub severity: Severity,
    pub target_code: String,
    pub message: String,
}

/// Flags nodes whose period-over-period change is unusually large.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsightScanner {
    pub threshold: f64,
    pub critical_threshold: Option<f64>,
}

impl Default for InsightScanner {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD_PERCENT,
            critical_threshold: None,
        }
    }
}

impl InsightScanner {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            critical_threshold: None,
        }
    }

    pub fn with_critical_threshold(mut self, critical_threshold: f64) -> Self {
        self.critical_threshold = Some(critical_threshold);
        self
    }

    /// Pre-order scan. Nodes without a horizontal change are skipped, so a
    /// tree that never went through horizontal analysis yields nothing.
    pub fn scan(&self, tree: &[AccountNode]) -> Vec<Insight> {
        let insights: Vec<Insight> = tree
            .iter()
            .flat_map(|root| root.walk())
            .filter_map(|node| self.inspect(node))
            .collect();

        debug!(
            "Insight scan over {} roots produced {} insights",
            tree.len(),
            insights.len()
        );
        insights
    }

    fn inspect(&self, node: &AccountNode) -> Option<Insight> {
        let change = node.horizontal_change?;
        let magnitude = change.percentage.abs();
        if magnitude <= self.threshold {
            return None;
        }

        let severity = match self.critical_threshold {
            Some(critical) if magnitude > critical => Severity::Critical,
            _ => Severity::Warning,
        };
        let direction = if change.percentage >= 0.0 {
            "aumentó"
        } else {
            "disminuyó"
        };

        Some(Insight {
            id: format!("horizontal-change-{}", node.code),
            severity,
            target_code: node.code.clone(),
            message: format!(
                "{} ({}) {} {:.1}% respecto al periodo anterior ({:+.2})",
                node.name, node.code, direction, magnitude, change.absolute
            ),
        })
    }
}

/// Scans with a plain warning threshold, in percent.
pub fn scan(tree: &[AccountNode], threshold_percent: f64) -> Vec<Insight> {
    InsightScanner::new(threshold_percent).scan(tree)
}
