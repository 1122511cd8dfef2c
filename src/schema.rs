use crate::error::{Result, StatementEngineError};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies a month in a ledger record. Any day of the month is accepted,
/// the builder only looks at year and month.
pub type PeriodKey = NaiveDate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    #[schemars(description = "Dot-segmented hierarchical account code, e.g. '1', '1.1', '1.1.2'")]
    pub code: String,

    #[schemars(description = "Account name as it appears in the ledger")]
    pub name: String,

    #[serde(default)]
    #[schemars(description = "Signed monthly amounts keyed by a date inside the month")]
    pub monthly_values: BTreeMap<PeriodKey, f64>,

    #[serde(default)]
    #[schemars(description = "Signed amount for the whole fiscal year")]
    pub annual_value: f64,
}

impl LedgerRecord {
    pub fn annual(code: impl Into<String>, name: impl Into<String>, annual_value: f64) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            monthly_values: BTreeMap::new(),
            annual_value,
        }
    }

    pub fn with_month(mut self, month: PeriodKey, value: f64) -> Self {
        self.monthly_values.insert(month, value);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisType {
    #[schemars(description = "Full P&L, every account included")]
    Standard,

    #[schemars(description = "Operating view, financing interest excluded")]
    Operating,

    #[schemars(description = "Cash view, depreciation and interest excluded")]
    Cash,
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisType::Standard => write!(f, "standard"),
            AnalysisType::Operating => write!(f, "operating"),
            AnalysisType::Cash => write!(f, "cash"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisViewConfig {
    pub view_id: AnalysisType,
    pub include_depreciation: bool,
    pub include_interest: bool,
}

impl AnalysisViewConfig {
    pub fn default_for(view_id: AnalysisType) -> Self {
        match view_id {
            AnalysisType::Standard => Self {
                view_id,
                include_depreciation: true,
                include_interest: true,
            },
            AnalysisType::Operating => Self {
                view_id,
                include_depreciation: true,
                include_interest: false,
            },
            AnalysisType::Cash => Self {
                view_id,
                include_depreciation: false,
                include_interest: false,
            },
        }
    }

    /// Whether an account tagged with `group` is zeroed under this view.
    pub fn excludes(&self, group: PatternGroup) -> bool {
        match group {
            PatternGroup::Depreciation => !self.include_depreciation,
            PatternGroup::Interest => !self.include_interest,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MixedCostSplit {
    pub account_code: String,

    #[schemars(description = "Fixed portion of the account, 0.0 to 1.0. The variable portion is 1 - fixedShare.")]
    pub fixed_share: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PatternGroup {
    #[schemars(description = "Depreciation and amortization charges")]
    Depreciation,

    #[schemars(description = "Financing interest and bank charges")]
    Interest,

    #[schemars(description = "Names that identify a revenue section")]
    Revenue,

    #[schemars(description = "Names that identify a cost of sales section")]
    CostOfSales,

    #[schemars(description = "Names that identify an operating expense section")]
    OperatingExpense,
}

impl PatternGroup {
    /// Groups a view may exclude from aggregation.
    pub const EXCLUSION_GROUPS: [PatternGroup; 2] =
        [PatternGroup::Depreciation, PatternGroup::Interest];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Contains,
    StartsWith,
    EndsWith,
    Exact,
    Regex,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PatternSource {
    Builtin,
    User,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationPattern {
    #[schemars(description = "Stable identifier used for edits and deletes")]
    pub id: String,
    pub group: PatternGroup,
    pub match_type: MatchType,

    #[schemars(description = "Text to match. Non-regex values are normalized like account names.")]
    pub value: String,

    #[schemars(description = "Human readable label")]
    pub name: String,
    pub source: PatternSource,

    #[serde(default)]
    #[schemars(description = "Confidence reported for Regex matches, 0.0 to 1.0 (default 0.6)")]
    pub base_confidence: Option<f64>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ClassificationPattern {
    pub fn new(
        id: impl Into<String>,
        group: PatternGroup,
        match_type: MatchType,
        value: impl Into<String>,
        source: PatternSource,
    ) -> Self {
        let value = value.into();
        Self {
            id: id.into(),
            group,
            match_type,
            name: value.clone(),
            value,
            source,
            base_confidence: None,
            enabled: true,
        }
    }

    pub fn user(
        id: impl Into<String>,
        group: PatternGroup,
        match_type: MatchType,
        value: impl Into<String>,
    ) -> Self {
        Self::new(id, group, match_type, value, PatternSource::User)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.base_confidence = Some(confidence);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StatementSection {
    Revenue,
    CostOfSales,
    OperatingExpense,
}

impl StatementSection {
    pub fn is_expense(&self) -> bool {
        !matches!(self, StatementSection::Revenue)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatementSection::Revenue => "Ingresos",
            StatementSection::CostOfSales => "Costos",
            StatementSection::OperatingExpense => "Gastos Operacionales",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalChange {
    pub absolute: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountNode {
    pub code: String,
    pub name: String,
    pub section: StatementSection,

    #[schemars(description = "Amount used in totals, zero when excluded")]
    pub value: f64,

    #[schemars(description = "Amount before exclusions, kept for display")]
    pub original_value: f64,
    pub excluded: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(description = "Exclusion groups matched by this account or an ancestor")]
    pub tags: Vec<PatternGroup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_share: Option<f64>,

    #[serde(default)]
    pub children: Vec<AccountNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_percentage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_change: Option<HorizontalChange>,
}

impl AccountNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn has_tag(&self, group: PatternGroup) -> bool {
        self.tags.contains(&group)
    }

    /// Depth-first search for `code` in this subtree.
    pub fn find(&self, code: &str) -> Option<&AccountNode> {
        if self.code == code {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(code))
    }

    /// Pre-order traversal of this subtree.
    pub fn walk(&self) -> Vec<&AccountNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn leaves(&self) -> Vec<&AccountNode> {
        self.walk().into_iter().filter(|n| n.is_leaf()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryKpis {
    pub ingresos: f64,
    pub costos: f64,
    pub gastos_operacionales: f64,
    pub utilidad: f64,
    pub ebitda: f64,
}

impl SummaryKpis {
    /// Looks a KPI up by name. Accepts the camelCase wire names and their
    /// snake_case forms.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name.trim() {
            "ingresos" => Some(self.ingresos),
            "costos" => Some(self.costos),
            "gastosOperacionales" | "gastos_operacionales" => Some(self.gastos_operacionales),
            "utilidad" => Some(self.utilidad),
            "ebitda" => Some(self.ebitda),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallBar {
    pub name: String,
    pub value: f64,
    pub is_total: bool,
    pub stack_base: f64,
    pub stack_value: f64,
    pub running_total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostContribution {
    pub code: String,
    pub fixed: f64,
    pub variable: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostStructure {
    pub fixed_costs: f64,
    pub variable_costs: f64,
    pub contributions: Vec<CostContribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PnlResult {
    pub analysis_type: AnalysisType,
    pub period: PeriodSelector,
    pub tree_data: Vec<AccountNode>,
    pub waterfall_data: Vec<WaterfallBar>,
    pub summary_kpis: SummaryKpis,
    pub cost_structure: CostStructure,
}

impl PnlResult {
    pub fn find(&self, code: &str) -> Option<&AccountNode> {
        self.tree_data.iter().find_map(|root| root.find(code))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PeriodSelector {
    #[schemars(description = "The record's annual aggregate")]
    Annual,

    #[schemars(description = "A single calendar month")]
    Month { year: i32, month: u32 },

    #[schemars(description = "Inclusive range of months, summed. Any day inside a month identifies it.")]
    Range { start: NaiveDate, end: NaiveDate },
}

impl PeriodSelector {
    /// Parses "annual", "YYYY-MM" or "YYYY-MM:YYYY-MM".
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("annual") || text.eq_ignore_ascii_case("anual") {
            return Ok(PeriodSelector::Annual);
        }

        if let Some((start, end)) = text.split_once(':') {
            let start = parse_month(start)?;
            let end = parse_month(end)?;
            if end < start {
                return Err(StatementEngineError::InvalidPeriod(format!(
                    "range '{}' ends before it starts",
                    text
                )));
            }
            return Ok(PeriodSelector::Range { start, end });
        }

        let date = parse_month(text)?;
        Ok(PeriodSelector::Month {
            year: date.year(),
            month: date.month(),
        })
    }

    /// Whether a monthly value keyed by `key` belongs to this period.
    pub fn contains(&self, key: PeriodKey) -> bool {
        match *self {
            PeriodSelector::Annual => false,
            PeriodSelector::Month { year, month } => key.year() == year && key.month() == month,
            PeriodSelector::Range { start, end } => {
                let ordinal = month_ordinal(key);
                ordinal >= month_ordinal(start) && ordinal <= month_ordinal(end)
            }
        }
    }
}

impl fmt::Display for PeriodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodSelector::Annual => write!(f, "annual"),
            PeriodSelector::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            PeriodSelector::Range { start, end } => {
                write!(f, "{}:{}", start.format("%Y-%m"), end.format("%Y-%m"))
            }
        }
    }
}

fn parse_month(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", text.trim()), "%Y-%m-%d")
        .map_err(|e| StatementEngineError::InvalidPeriod(format!("'{}': {}", text, e)))
}

fn month_ordinal(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SignConvention {
    #[default]
    #[schemars(description = "Ledger amounts are already signed: revenue positive, costs negative")]
    Signed,

    #[schemars(description = "Costs and expenses arrive as positive magnitudes and are negated")]
    PositiveExpenses,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum CodeScheme {
    #[default]
    #[schemars(description = "Parents are dot-segment prefixes: '1.1' is the parent of '1.1.2'")]
    Dotted,

    #[schemars(description = "Parents are character prefixes: '41' is the parent of '4135'")]
    Positional,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    LastWriteWins,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectionRule {
    pub code_prefix: String,
    pub section: StatementSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatementConfig {
    #[serde(default)]
    #[schemars(description = "One entry per view. Missing views use their defaults.")]
    pub views: Vec<AnalysisViewConfig>,

    #[serde(default)]
    #[schemars(description = "Code prefixes that pin a root account to a section, checked before name classification")]
    pub section_rules: Vec<SectionRule>,

    #[serde(default)]
    pub sign_convention: SignConvention,

    #[serde(default)]
    pub code_scheme: CodeScheme,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl StatementConfig {
    pub fn view(&self, view_id: AnalysisType) -> AnalysisViewConfig {
        self.views
            .iter()
            .find(|v| v.view_id == view_id)
            .cloned()
            .unwrap_or_else(|| AnalysisViewConfig::default_for(view_id))
    }

    pub fn section_for_code(&self, code: &str) -> Option<StatementSection> {
        self.section_rules
            .iter()
            .filter(|rule| !rule.code_prefix.is_empty() && code.starts_with(&rule.code_prefix))
            .max_by_key(|rule| rule.code_prefix.len())
            .map(|rule| rule.section)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(StatementConfig)
    }

    pub fn schema_as_json() -> Result<String> {
        let schema = Self::generate_json_schema();
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}
