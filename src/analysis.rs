//! Vertical and horizontal analysis.
//!
//! Both overlays clone their input and annotate the copy, so one base
//! [`PnlResult`] can be annotated several ways.
//!
//! Horizontal analysis assumes both results come from the same view
//! configuration. Comparing, say, a Cash tree against a Standard tree yields
//! valid numbers with a misleading meaning; this is not detected.

use crate::schema::{AccountNode, HorizontalChange, PnlResult};
use crate::utils::{finite_or_zero, safe_divide};
use std::collections::HashMap;

/// Sets `vertical_percentage = 100 * value / ingresos` on every node, or 0
/// for every node when revenue is zero.
pub fn annotate_vertical(result: &PnlResult) -> PnlResult {
    let mut annotated = result.clone();
    let denominator = result.summary_kpis.ingresos;

    for root in &mut annotated.tree_data {
        annotate_vertical_node(root, denominator);
    }

    annotated
}

fn annotate_vertical_node(node: &mut AccountNode, denominator: f64) {
    node.vertical_percentage = Some(finite_or_zero(100.0 * safe_divide(node.value, denominator)));
    for child in &mut node.children {
        annotate_vertical_node(child, denominator);
    }
}

/// Compares `current` against `previous` by account code, wherever the code
/// sits in either tree. The result has the shape of `current`: codes missing
/// from `previous` compare against zero, codes only in `previous` are dropped.
pub fn annotate_horizontal(current: &PnlResult, previous: &PnlResult) -> PnlResult {
    let previous_values: HashMap<&str, f64> = previous
        .tree_data
        .iter()
        .flat_map(|root| root.walk())
        .map(|node| (node.code.as_str(), node.value))
        .collect();

    let mut annotated = current.clone();
    for root in &mut annotated.tree_data {
        annotate_horizontal_node(root, &previous_values);
    }
    annotated
}

fn annotate_horizontal_node(node: &mut AccountNode, previous: &HashMap<&str, f64>) {
    let previous_value = previous.get(node.code.as_str()).copied().unwrap_or(0.0);
    node.horizontal_change = Some(horizontal_change(node.value, previous_value));

    for child in &mut node.children {
        annotate_horizontal_node(child, previous);
    }
}

/// `absolute = current - previous`; `percentage` is relative to
/// `|previous|` and is 0 when `previous` is 0, even for a non-zero change.
pub fn horizontal_change(current: f64, previous: f64) -> HorizontalChange {
    let absolute = finite_or_zero(current - previous);
    let percentage = if previous == 0.0 {
        0.0
    } else {
        finite_or_zero(100.0 * absolute / previous.abs())
    };
    HorizontalChange {
        absolute,
        percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AnalysisType, CostStructure, PeriodSelector, StatementSection, SummaryKpis};

    fn node(code: &str, value: f64, children: Vec<AccountNode>) -> AccountNode {
        AccountNode {
            code: code.to_string(),
            name: format!("Cuenta {}", code),
            section: StatementSection::Revenue,
            value,
            original_value: value,
            excluded: false,
            tags: vec![],
            fixed_share: None,
            children,
            vertical_percentage: None,
            horizontal_change: None,
        }
    }

    fn result(tree: Vec<AccountNode>, ingresos: f64) -> PnlResult {
        PnlResult {
            analysis_type: AnalysisType::Standard,
            period: PeriodSelector::Annual,
            tree_data: tree,
            waterfall_data: vec![],
            summary_kpis: SummaryKpis {
                ingresos,
                ..Default::default()
            },
            cost_structure: CostStructure::default(),
        }
    }

    #[test]
    fn test_vertical_uses_revenue_denominator() {
        let base = result(vec![node("1", 1000.0, vec![node("1.1", 250.0, vec![])])], 1000.0);
        let annotated = annotate_vertical(&base);

        assert_eq!(annotated.tree_data[0].vertical_percentage, Some(100.0));
        assert_eq!(annotated.find("1.1").unwrap().vertical_percentage, Some(25.0));
        assert!(base.tree_data[0].vertical_percentage.is_none());
    }

    #[test]
    fn test_vertical_zero_revenue() {
        let base = result(vec![node("5", -300.0, vec![])], 0.0);
        let annotated = annotate_vertical(&base);
        assert_eq!(annotated.tree_data[0].vertical_percentage, Some(0.0));
    }

    #[test]
    fn test_horizontal_change() {
        let current = result(vec![node("1", 1200.0, vec![])], 1200.0);
        let previous = result(vec![node("1", 1000.0, vec![])], 1000.0);

        let annotated = annotate_horizontal(&current, &previous);
        let change = annotated.tree_data[0].horizontal_change.unwrap();
        assert_eq!(change.absolute, 200.0);
        assert_eq!(change.percentage, 20.0);
        assert!(current.tree_data[0].horizontal_change.is_none());
    }

    #[test]
    fn test_horizontal_negative_previous_uses_magnitude() {
        let change = horizontal_change(-150.0, -100.0);
        assert_eq!(change.absolute, -50.0);
        assert_eq!(change.percentage, -50.0);
    }

    #[test]
    fn test_horizontal_matches_codes_that_moved() {
        let previous = result(vec![node("5.1", -100.0, vec![])], 0.0);
        let current = result(
            vec![node("5", -120.0, vec![node("5.1", -120.0, vec![])])],
            0.0,
        );

        let annotated = annotate_horizontal(&current, &previous);

        let moved = annotated.find("5.1").unwrap().horizontal_change.unwrap();
        assert_eq!(moved.absolute, -20.0);
        assert_eq!(moved.percentage, -20.0);

        let new_parent = annotated.find("5").unwrap().horizontal_change.unwrap();
        assert_eq!(new_parent.absolute, -120.0);
        assert_eq!(new_parent.percentage, 0.0);
    }

    #[test]
    fn test_horizontal_zero_guard_and_shape() {
        let current = result(
            vec![node(
                "1",
                500.0,
                vec![node("1.1", 300.0, vec![]), node("1.2", 200.0, vec![])],
            )],
            500.0,
        );
        let previous = result(
            vec![
                node("1", 100.0, vec![node("1.1", 100.0, vec![]), node("1.3", 0.0, vec![])]),
                node("2", -40.0, vec![]),
            ],
            100.0,
        );

        let annotated = annotate_horizontal(&current, &previous);

        assert_eq!(annotated.tree_data.len(), 1);
        assert_eq!(annotated.tree_data[0].children.len(), 2);
        assert!(annotated.find("1.3").is_none());

        let new_account = annotated.find("1.2").unwrap().horizontal_change.unwrap();
        assert_eq!(new_account.absolute, 200.0);
        assert_eq!(new_account.percentage, 0.0);

        let grown = annotated.find("1.1").unwrap().horizontal_change.unwrap();
        assert_eq!(grown.percentage, 200.0);
    }
}
