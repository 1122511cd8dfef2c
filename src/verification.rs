use crate::error::{Result, StatementEngineError};
use crate::schema::AccountNode;
use crate::utils::approx_eq;

/// Checks that a built tree is internally consistent:
///
/// - every parent's `value` equals the sum of its children's `value`s,
/// - an excluded leaf contributes nothing.
///
/// The first violation found in pre-order is reported.
pub fn verify_tree(tree: &[AccountNode], tolerance: f64) -> Result<()> {
    for node in tree.iter().flat_map(|root| root.walk()) {
        if node.is_leaf() {
            if node.excluded && node.value != 0.0 {
                return Err(StatementEngineError::AggregationMismatch {
                    code: node.code.clone(),
                    value: node.value,
                    children_sum: 0.0,
                });
            }
            continue;
        }

        let children_sum: f64 = node.children.iter().map(|c| c.value).sum();
        if !approx_eq(node.value, children_sum, tolerance) {
            return Err(StatementEngineError::AggregationMismatch {
                code: node.code.clone(),
                value: node.value,
                children_sum,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StatementSection;

    fn leaf(code: &str, value: f64, excluded: bool) -> AccountNode {
        AccountNode {
            code: code.to_string(),
            name: code.to_string(),
            section: StatementSection::OperatingExpense,
            value,
            original_value: if excluded { -50.0 } else { value },
            excluded,
            tags: vec![],
            fixed_share: None,
            children: vec![],
            vertical_percentage: None,
            horizontal_change: None,
        }
    }

    fn parent(code: &str, value: f64, children: Vec<AccountNode>) -> AccountNode {
        AccountNode {
            children,
            ..leaf(code, value, false)
        }
    }

    #[test]
    fn test_consistent_tree_passes() {
        let tree = vec![parent(
            "5",
            -100.0,
            vec![leaf("5.1", -100.0, false), leaf("5.2", 0.0, true)],
        )];
        assert!(verify_tree(&tree, 1e-9).is_ok());
    }

    #[test]
    fn test_parent_mismatch_is_reported() {
        let tree = vec![parent("5", -90.0, vec![leaf("5.1", -100.0, false)])];
        match verify_tree(&tree, 1e-9) {
            Err(StatementEngineError::AggregationMismatch {
                code, children_sum, ..
            }) => {
                assert_eq!(code, "5");
                assert_eq!(children_sum, -100.0);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_excluded_leaf_with_value_is_reported() {
        let tree = vec![leaf("6", -50.0, true)];
        assert!(verify_tree(&tree, 1e-9).is_err());
    }
}
