use crate::analysis::{annotate_horizontal, annotate_vertical};
use crate::chart_of_accounts::{ChartOfAccounts, TreeBuilder};
use crate::classifier::PatternClassifier;
use crate::error::{Result, StatementEngineError};
use crate::overrides::PatternOverrides;
use crate::patterns::{builtin_patterns, merge_patterns, regex_diagnostics, validate_patterns};
use crate::schema::*;
use crate::summary::{cost_structure, summarize};
use crate::utils::month_key;
use crate::waterfall::build_waterfall;
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Everything needed to compute one statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PnlRequest {
    pub records: Vec<LedgerRecord>,
    pub period: PeriodSelector,
    pub view_id: AnalysisType,

    #[serde(default)]
    pub mixed_costs: Vec<MixedCostSplit>,

    #[serde(default)]
    #[schemars(description = "Annotate every node with its percentage of revenue")]
    pub vertical: bool,
}

impl PnlRequest {
    pub fn new(records: Vec<LedgerRecord>, period: PeriodSelector, view_id: AnalysisType) -> Self {
        Self {
            records,
            period,
            view_id,
            mixed_costs: Vec::new(),
            vertical: false,
        }
    }

    pub fn with_mixed_costs(mut self, mixed_costs: Vec<MixedCostSplit>) -> Self {
        self.mixed_costs = mixed_costs;
        self
    }

    pub fn with_vertical(mut self) -> Self {
        self.vertical = true;
        self
    }

    /// Rejects months outside the calendar, reversed ranges and cost
    /// shares outside [0, 1].
    pub fn validate(&self) -> Result<()> {
        match self.period {
            PeriodSelector::Annual => {}
            PeriodSelector::Month { year, month } => {
                if month_key(year, month).is_none() {
                    return Err(StatementEngineError::InvalidPeriod(format!(
                        "{}-{:02} is not a calendar month",
                        year, month
                    )));
                }
            }
            PeriodSelector::Range { start, end } => {
                if end < start {
                    return Err(StatementEngineError::InvalidPeriod(format!(
                        "range {} ends before it starts",
                        self.period
                    )));
                }
            }
        }

        for split in &self.mixed_costs {
            if !split.fixed_share.is_finite() || !(0.0..=1.0).contains(&split.fixed_share) {
                return Err(StatementEngineError::InvalidCostShare {
                    code: split.account_code.clone(),
                    share: split.fixed_share,
                });
            }
        }

        Ok(())
    }
}

/// Holds the configuration and the current pattern snapshot. Every
/// computation is a pure function of the request and these two.
#[derive(Debug, Clone)]
pub struct StatementEngine {
    config: StatementConfig,
    classifier: PatternClassifier,
}

impl Default for StatementEngine {
    fn default() -> Self {
        Self::new(StatementConfig::default(), PatternClassifier::with_builtin_defaults())
    }
}

impl StatementEngine {
    pub fn new(config: StatementConfig, classifier: PatternClassifier) -> Self {
        Self { config, classifier }
    }

    /// Built-in catalog merged with tenant patterns, after validation.
    pub fn with_patterns(config: StatementConfig, user_patterns: &[ClassificationPattern]) -> Result<Self> {
        validate_patterns(user_patterns)?;
        Ok(Self::new(config, PatternClassifier::with_user_patterns(user_patterns)))
    }

    pub fn config(&self) -> &StatementConfig {
        &self.config
    }

    pub fn classifier(&self) -> &PatternClassifier {
        &self.classifier
    }

    pub fn build_tree(
        &self,
        records: &[LedgerRecord],
        period: PeriodSelector,
        view_id: AnalysisType,
        mixed_costs: &[MixedCostSplit],
    ) -> Result<ChartOfAccounts> {
        let view = self.config.view(view_id);
        TreeBuilder::new(&self.classifier, &self.config).build(records, period, &view, mixed_costs)
    }

    pub fn compute(&self, request: &PnlRequest) -> Result<PnlResult> {
        request.validate()?;

        info!(
            "Computing {} statement for period {} from {} records",
            request.view_id,
            request.period,
            request.records.len()
        );

        let chart = self.build_tree(
            &request.records,
            request.period,
            request.view_id,
            &request.mixed_costs,
        )?;

        let summary_kpis = summarize(&chart.roots, request.view_id);
        let waterfall_data = build_waterfall(&chart.roots, &summary_kpis, request.view_id);
        let cost_structure = cost_structure(&chart.roots);

        debug!(
            "Summary for {} view: ingresos={}, utilidad={}, ebitda={}",
            request.view_id, summary_kpis.ingresos, summary_kpis.utilidad, summary_kpis.ebitda
        );

        let result = PnlResult {
            analysis_type: request.view_id,
            period: request.period,
            tree_data: chart.roots,
            waterfall_data,
            summary_kpis,
            cost_structure,
        };

        Ok(if request.vertical {
            annotate_vertical(&result)
        } else {
            result
        })
    }

    /// Horizontal overlay of `current` against `previous`, optionally with
    /// the vertical overlay as well.
    pub fn compare(&self, current: &PnlResult, previous: &PnlResult, vertical: bool) -> PnlResult {
        if current.analysis_type != previous.analysis_type {
            debug!(
                "Comparing {} result against {} result",
                current.analysis_type, previous.analysis_type
            );
        }

        let compared = annotate_horizontal(current, previous);
        if vertical {
            annotate_vertical(&compared)
        } else {
            compared
        }
    }

    /// Swaps in a new pattern snapshot. Clones of the engine taken earlier
    /// keep the snapshot they were created with.
    pub fn reload_patterns(&mut self, user_patterns: &[ClassificationPattern]) -> Result<()> {
        validate_patterns(user_patterns)?;

        for (id, details) in regex_diagnostics(user_patterns) {
            warn!("Pattern '{}' will never match: {}", id, details);
        }

        self.classifier = self
            .classifier
            .reload(merge_patterns(&builtin_patterns(), user_patterns));

        info!(
            "Reloaded classification patterns (snapshot version {}, {} active)",
            self.classifier.version(),
            self.classifier.snapshot().len()
        );
        Ok(())
    }

    /// Applies tenant edits on top of the current pattern set, tenant
    /// patterns included, and publishes the result as the new snapshot.
    pub fn apply_overrides(&mut self, overrides: &PatternOverrides) -> Result<()> {
        let patterns = overrides.apply(self.classifier.snapshot().definitions());
        validate_patterns(&patterns)?;

        self.classifier = self.classifier.reload(patterns);

        info!(
            "Applied {} pattern modifications (snapshot version {})",
            overrides.modifications.len(),
            self.classifier.version()
        );
        Ok(())
    }
}

/// One-shot computation with default configuration.
pub fn compute_pnl(
    records: &[LedgerRecord],
    period: PeriodSelector,
    view_id: AnalysisType,
    mixed_costs: &[MixedCostSplit],
    user_patterns: &[ClassificationPattern],
) -> Result<PnlResult> {
    let engine = StatementEngine::with_patterns(StatementConfig::default(), user_patterns)?;
    let request = PnlRequest::new(records.to_vec(), period, view_id).with_mixed_costs(mixed_costs.to_vec());
    engine.compute(&request)
}
