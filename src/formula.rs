//! Custom KPI formulas.
//!
//! Formulas are user-authored, so evaluation is total: unknown references,
//! division by zero and unknown operand kinds or operators all resolve to
//! zero instead of failing the whole computation.

use crate::schema::SummaryKpis;
use crate::utils::{finite_or_zero, safe_divide};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum FormulaType {
    #[schemars(description = "numerator / denominator (denominator defaults to 1)")]
    Simple,

    #[schemars(description = "numerator followed by a left-to-right fold over operations")]
    Complex,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum OperandKind {
    Constant,
    KpiRef,

    #[schemars(description = "Reserved. Always resolves to 0.")]
    AccountRef,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Modifier {
    Abs,
    Negate,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum OperandValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Operand {
    pub kind: OperandKind,
    pub value: OperandValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<Modifier>,
}

impl Operand {
    pub fn constant(value: f64) -> Self {
        Self {
            kind: OperandKind::Constant,
            value: OperandValue::Number(value),
            modifier: None,
        }
    }

    pub fn kpi(name: impl Into<String>) -> Self {
        Self {
            kind: OperandKind::KpiRef,
            value: OperandValue::Text(name.into()),
            modifier: None,
        }
    }

    pub fn account(code: impl Into<String>) -> Self {
        Self {
            kind: OperandKind::AccountRef,
            value: OperandValue::Text(code.into()),
            modifier: None,
        }
    }

    pub fn abs(mut self) -> Self {
        self.modifier = Some(Modifier::Abs);
        self
    }

    pub fn negate(mut self) -> Self {
        self.modifier = Some(Modifier::Negate);
        self
    }

    pub fn resolve(&self, summary: &SummaryKpis) -> f64 {
        let raw = match (self.kind, &self.value) {
            (OperandKind::Constant, OperandValue::Number(n)) => *n,
            (OperandKind::Constant, OperandValue::Text(text)) => text.trim().parse().unwrap_or(0.0),
            (OperandKind::KpiRef, OperandValue::Text(name)) => summary.get(name).unwrap_or_else(|| {
                debug!("Unknown KPI reference '{}' resolves to 0", name);
                0.0
            }),
            (OperandKind::KpiRef, OperandValue::Number(_)) => 0.0,
            (OperandKind::AccountRef, _) => 0.0,
            (OperandKind::Unknown, _) => 0.0,
        };

        let modified = match self.modifier {
            None => raw,
            Some(Modifier::Abs) => raw.abs(),
            Some(Modifier::Negate) => -raw,
            Some(Modifier::Unknown) => 0.0,
        };

        finite_or_zero(modified)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operator: Operator,
    pub operand: Operand,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KpiFormula {
    #[serde(rename = "type")]
    pub formula_type: FormulaType,
    pub numerator: Operand,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denominator: Option<Operand>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<Operation>,
}

impl KpiFormula {
    pub fn ratio(numerator: Operand, denominator: Operand) -> Self {
        Self {
            formula_type: FormulaType::Simple,
            numerator,
            denominator: Some(denominator),
            operations: Vec::new(),
        }
    }

    pub fn complex(start: Operand, operations: Vec<(Operator, Operand)>) -> Self {
        Self {
            formula_type: FormulaType::Complex,
            numerator: start,
            denominator: None,
            operations: operations
                .into_iter()
                .map(|(operator, operand)| Operation { operator, operand })
                .collect(),
        }
    }

    /// KPI names this formula reads, in order of appearance.
    pub fn referenced_kpis(&self) -> Vec<&str> {
        std::iter::once(&self.numerator)
            .chain(self.denominator.iter())
            .chain(self.operations.iter().map(|op| &op.operand))
            .filter(|operand| operand.kind == OperandKind::KpiRef)
            .filter_map(|operand| match &operand.value {
                OperandValue::Text(name) => Some(name.as_str()),
                OperandValue::Number(_) => None,
            })
            .collect()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Evaluates `formula` against `summary`. Always returns a finite number.
pub fn evaluate(formula: &KpiFormula, summary: &SummaryKpis) -> f64 {
    let numerator = formula.numerator.resolve(summary);

    let result = match formula.formula_type {
        FormulaType::Simple => {
            let denominator = formula
                .denominator
                .as_ref()
                .map(|d| d.resolve(summary))
                .unwrap_or(1.0);
            safe_divide(numerator, denominator)
        }
        FormulaType::Complex => formula.operations.iter().fold(numerator, |acc, op| {
            apply(acc, op.operator, op.operand.resolve(summary))
        }),
        FormulaType::Unknown => 0.0,
    };

    finite_or_zero(result)
}

fn apply(acc: f64, operator: Operator, value: f64) -> f64 {
    let next = match operator {
        Operator::Add => acc + value,
        Operator::Subtract => acc - value,
        Operator::Multiply => acc * value,
        Operator::Divide => safe_divide(acc, value),
        // An unknown operator contributes nothing.
        Operator::Unknown => acc,
    };
    finite_or_zero(next)
}

/// A named formula as stored by the KPI management surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomKpi {
    pub id: String,
    pub name: String,
    pub formula: KpiFormula,
}

/// Evaluates every custom KPI, keyed by id.
pub fn evaluate_all(kpis: &[CustomKpi], summary: &SummaryKpis) -> BTreeMap<String, f64> {
    kpis.iter()
        .map(|kpi| (kpi.id.clone(), evaluate(&kpi.formula, summary)))
        .collect()
}
