//! # Financial Statement Engine
//!
//! Turns flat ledger records into a hierarchical profit-and-loss statement
//! with view-dependent exclusions, summary KPIs and a waterfall bridge.
//!
//! ## Core Concepts
//!
//! - **Ledger records**: flat rows keyed by a hierarchical account code
//!   (`1`, `1.1`, `1.1.2`) with monthly and annual amounts
//! - **Views**: Standard, Operating and Cash. A view decides which
//!   classification groups (depreciation, interest) are excluded from totals
//! - **Pattern classification**: account names are matched against built-in
//!   and tenant patterns to tag depreciation and interest and to resolve the
//!   statement section of each root account
//! - **Overlays**: vertical analysis (share of revenue) and horizontal
//!   analysis (change against a previous period)
//! - **Downstream**: custom KPI formulas and insight scanning run on the
//!   finished result
//!
//! ## Example
//!
//! ```rust
//! use financial_statement_engine::*;
//!
//! let records = vec![
//!     LedgerRecord::annual("1", "Ingresos", 1000.0),
//!     LedgerRecord::annual("2", "Depreciación de equipos", -100.0),
//!     LedgerRecord::annual("3", "Otros Costos", -300.0),
//! ];
//!
//! let request = PnlRequest::new(records, PeriodSelector::Annual, AnalysisType::Cash);
//! let result = process_pnl(&request).unwrap();
//!
//! assert_eq!(result.summary_kpis.utilidad, 700.0);
//! assert!(result.find("2").unwrap().excluded);
//! ```

pub mod analysis;
pub mod chart_of_accounts;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod formula;
pub mod generation;
pub mod insights;
pub mod normalize;
pub mod overrides;
pub mod patterns;
pub mod schema;
pub mod summary;
pub mod utils;
pub mod verification;
pub mod waterfall;

pub use analysis::{annotate_horizontal, annotate_vertical, horizontal_change};
pub use chart_of_accounts::{build_tree, ChartOfAccounts, TreeBuilder};
pub use classifier::{Classification, PatternClassifier, PatternMatch, PatternSnapshot};
pub use engine::{compute_pnl, PnlRequest, StatementEngine};
pub use error::{Result, StatementEngineError};
pub use formula::{evaluate, evaluate_all, CustomKpi, KpiFormula, Operand, Operator};
pub use generation::{GenerationToken, GenerationTracker, Generational};
pub use insights::{scan, Insight, InsightScanner, Severity};
pub use overrides::*;
pub use patterns::{builtin_patterns, merge_patterns, validate_patterns};
pub use schema::*;
pub use summary::{cost_structure, summarize};
pub use verification::verify_tree;
pub use waterfall::build_waterfall;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A computed statement with its downstream annotations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatementReport {
    pub result: PnlResult,
    pub custom_kpis: BTreeMap<String, f64>,
    pub insights: Vec<Insight>,
}

pub struct StatementProcessor;

impl StatementProcessor {
    pub fn process(engine: &StatementEngine, request: &PnlRequest) -> Result<PnlResult> {
        debug!(
            "Request contains {} records and {} mixed cost splits",
            request.records.len(),
            request.mixed_costs.len()
        );

        engine.compute(request)
    }

    pub fn process_with_verification(
        engine: &StatementEngine,
        request: &PnlRequest,
        tolerance: f64,
    ) -> Result<PnlResult> {
        let result = Self::process(engine, request)?;

        verify_tree(&result.tree_data, tolerance)?;

        Ok(result)
    }

    /// Computes `request`, compares it against `previous` when given, then
    /// evaluates `kpis` and scans for insights on the compared result.
    pub fn report(
        engine: &StatementEngine,
        request: &PnlRequest,
        previous: Option<&PnlRequest>,
        kpis: &[CustomKpi],
        scanner: &InsightScanner,
    ) -> Result<StatementReport> {
        let current = Self::process(engine, request)?;

        let result = match previous {
            Some(previous_request) => {
                let previous = Self::process(engine, previous_request)?;
                engine.compare(&current, &previous, request.vertical)
            }
            None => current,
        };

        let custom_kpis = evaluate_all(kpis, &result.summary_kpis);
        let insights = scanner.scan(&result.tree_data);

        info!(
            "Report for {} view, period {}: {} custom KPIs, {} insights",
            result.analysis_type,
            result.period,
            custom_kpis.len(),
            insights.len()
        );

        Ok(StatementReport {
            result,
            custom_kpis,
            insights,
        })
    }
}

pub fn process_pnl(request: &PnlRequest) -> Result<PnlResult> {
    StatementProcessor::process(&StatementEngine::default(), request)
}

pub fn process_with_verification(request: &PnlRequest, tolerance: f64) -> Result<PnlResult> {
    StatementProcessor::process_with_verification(&StatementEngine::default(), request, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<LedgerRecord> {
        vec![
            LedgerRecord::annual("1", "Ingresos", 1000.0),
            LedgerRecord::annual("1.1", "Ventas nacionales", 700.0),
            LedgerRecord::annual("1.2", "Ventas exportación", 300.0),
            LedgerRecord::annual("2", "Costo de ventas", -400.0),
            LedgerRecord::annual("3", "Gastos de administración", -250.0),
            LedgerRecord::annual("3.1", "Sueldos", -150.0),
            LedgerRecord::annual("3.2", "Depreciación de oficinas", -60.0),
            LedgerRecord::annual("3.3", "Intereses bancarios", -40.0),
        ]
    }

    #[test]
    fn test_end_to_end_processing() {
        let request = PnlRequest::new(records(), PeriodSelector::Annual, AnalysisType::Operating);
        let result = process_with_verification(&request, 1e-9).unwrap();

        assert_eq!(result.summary_kpis.ingresos, 1000.0);
        assert_eq!(result.summary_kpis.costos, -400.0);
        // Interest is excluded under the Operating view.
        assert_eq!(result.summary_kpis.gastos_operacionales, -210.0);
        assert_eq!(result.summary_kpis.utilidad, 390.0);
        assert_eq!(result.summary_kpis.ebitda, 450.0);
        assert_eq!(result.waterfall_data.last().unwrap().name, "EBITDA");
    }

    #[test]
    fn test_invalid_period_is_rejected() {
        let request = PnlRequest::new(
            records(),
            PeriodSelector::Month { year: 2024, month: 13 },
            AnalysisType::Standard,
        );
        assert!(matches!(
            process_pnl(&request),
            Err(StatementEngineError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn test_invalid_cost_share_is_rejected() {
        let request = PnlRequest::new(records(), PeriodSelector::Annual, AnalysisType::Standard)
            .with_mixed_costs(vec![MixedCostSplit {
                account_code: "3.1".to_string(),
                fixed_share: 1.5,
            }]);
        assert!(matches!(
            process_pnl(&request),
            Err(StatementEngineError::InvalidCostShare { .. })
        ));
    }

    #[test]
    fn test_report_with_previous_period() {
        let engine = StatementEngine::default();
        let mut previous_records = records();
        previous_records[3] = LedgerRecord::annual("2", "Costo de ventas", -200.0);

        let request = PnlRequest::new(records(), PeriodSelector::Annual, AnalysisType::Standard);
        let previous = PnlRequest::new(previous_records, PeriodSelector::Annual, AnalysisType::Standard);
        let margin = CustomKpi {
            id: "margen".to_string(),
            name: "Margen".to_string(),
            formula: KpiFormula::ratio(Operand::kpi("utilidad"), Operand::kpi("ingresos")),
        };

        let report = StatementProcessor::report(
            &engine,
            &request,
            Some(&previous),
            &[margin],
            &InsightScanner::default(),
        )
        .unwrap();

        assert_eq!(report.custom_kpis.get("margen"), Some(&0.35));
        let codes: Vec<&str> = report.insights.iter().map(|i| i.target_code.as_str()).collect();
        assert_eq!(codes, vec!["2"]);
        assert_eq!(report.insights[0].severity, Severity::Warning);
    }
}
