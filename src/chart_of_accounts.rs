use crate::classifier::PatternClassifier;
use crate::error::{Result, StatementEngineError};
use crate::normalize::is_metadata_label;
use crate::schema::{
    AccountNode, AnalysisType, AnalysisViewConfig, DuplicatePolicy, LedgerRecord, MixedCostSplit,
    PatternGroup, PeriodSelector, SignConvention, StatementConfig, StatementSection,
};
use crate::utils::{ancestor_codes, approx_eq, compare_codes, select_period_value};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A computed account tree for one period and view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartOfAccounts {
    pub analysis_type: AnalysisType,
    pub period: PeriodSelector,
    pub roots: Vec<AccountNode>,
}

// One ledger row after period selection, before linking.
struct Entry {
    code: String,
    name: String,
    amount: f64,
    children: Vec<usize>,
}

pub struct TreeBuilder<'a> {
    classifier: &'a PatternClassifier,
    config: &'a StatementConfig,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(classifier: &'a PatternClassifier, config: &'a StatementConfig) -> Self {
        Self { classifier, config }
    }

    pub fn build(
        &self,
        records: &[LedgerRecord],
        period: PeriodSelector,
        view: &AnalysisViewConfig,
        mixed_costs: &[MixedCostSplit],
    ) -> Result<ChartOfAccounts> {
        let splits = index_splits(mixed_costs)?;
        let mut entries = self.collect_entries(records, &period)?;
        let roots = self.link(&mut entries);

        debug!(
            "Linked {} accounts into {} roots for {} view, period {}",
            entries.len(),
            roots.len(),
            view.view_id,
            period
        );

        let nodes = roots
            .into_iter()
            .map(|idx| {
                let section = self.root_section(&entries, idx);
                self.materialize(&entries, idx, section, &[], view, &splits)
            })
            .collect();

        Ok(ChartOfAccounts {
            analysis_type: view.view_id,
            period,
            roots: nodes,
        })
    }

    fn collect_entries(&self, records: &[LedgerRecord], period: &PeriodSelector) -> Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = Vec::with_capacity(records.len());
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in records {
            let code = record.code.trim();
            if code.is_empty() || is_metadata_label(code) || is_metadata_label(&record.name) {
                debug!("Skipping metadata row '{}' / '{}'", record.code, record.name);
                continue;
            }

            let entry = Entry {
                code: code.to_string(),
                name: record.name.trim().to_string(),
                amount: select_period_value(record, period),
                children: Vec::new(),
            };

            match index.get(code) {
                Some(&existing) => match self.config.duplicate_policy {
                    DuplicatePolicy::Reject => {
                        return Err(StatementEngineError::DuplicateAccountCode {
                            code: code.to_string(),
                            period: period.to_string(),
                        });
                    }
                    DuplicatePolicy::LastWriteWins => {
                        warn!("Duplicate account code '{}' in period {}, keeping the last record", code, period);
                        entries[existing] = entry;
                    }
                },
                None => {
                    index.insert(entry.code.clone(), entries.len());
                    entries.push(entry);
                }
            }
        }

        entries.sort_by(|a, b| compare_codes(&a.code, &b.code));
        Ok(entries)
    }

    /// Links every entry to its longest present ancestor and returns the
    /// root indices. Entries are sorted, so children come out ordered.
    fn link(&self, entries: &mut [Entry]) -> Vec<usize> {
        let index: HashMap<&str, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.code.as_str(), i))
            .collect();

        let parents: Vec<Option<usize>> = entries
            .iter()
            .map(|e| {
                ancestor_codes(&e.code, self.config.code_scheme)
                    .into_iter()
                    .find_map(|candidate| index.get(candidate).copied())
            })
            .collect();

        let mut roots = Vec::new();
        for (child, parent) in parents.into_iter().enumerate() {
            match parent {
                Some(p) => entries[p].children.push(child),
                None => roots.push(child),
            }
        }
        roots
    }

    fn root_section(&self, entries: &[Entry], idx: usize) -> StatementSection {
        let entry = &entries[idx];

        if let Some(section) = self.config.section_for_code(&entry.code) {
            return section;
        }

        if let Some((section, confidence)) = self.classifier.classify_section(&entry.name) {
            debug!(
                "Root '{}' classified as {:?} (confidence {:.2})",
                entry.name, section, confidence
            );
            return section;
        }

        if raw_total(entries, idx) >= 0.0 {
            StatementSection::Revenue
        } else {
            StatementSection::OperatingExpense
        }
    }

    fn materialize(
        &self,
        entries: &[Entry],
        idx: usize,
        section: StatementSection,
        inherited_tags: &[PatternGroup],
        view: &AnalysisViewConfig,
        splits: &HashMap<&str, f64>,
    ) -> AccountNode {
        let entry = &entries[idx];

        let mut tags = inherited_tags.to_vec();
        for group in self
            .classifier
            .matched_groups(&entry.name, &PatternGroup::EXCLUSION_GROUPS)
        {
            if !tags.contains(&group) {
                tags.push(group);
            }
        }
        tags.sort();

        let excluded = tags.iter().any(|group| view.excludes(*group));
        let signed = signed_amount(section, entry.amount, self.config.sign_convention);

        if entry.children.is_empty() {
            let fixed_share = match splits.get(entry.code.as_str()) {
                Some(share) if section.is_expense() => Some(*share),
                Some(_) => {
                    debug!("Ignoring mixed-cost split on revenue account {}", entry.code);
                    None
                }
                None => None,
            };

            return AccountNode {
                code: entry.code.clone(),
                name: entry.name.clone(),
                section,
                value: if excluded { 0.0 } else { signed },
                original_value: signed,
                excluded,
                tags,
                fixed_share,
                children: Vec::new(),
                vertical_percentage: None,
                horizontal_change: None,
            };
        }

        if splits.contains_key(entry.code.as_str()) {
            debug!("Ignoring mixed-cost split on parent account {}", entry.code);
        }

        let children: Vec<AccountNode> = entry
            .children
            .iter()
            .map(|&child| self.materialize(entries, child, section, &tags, view, splits))
            .collect();

        let value: f64 = children.iter().map(|c| c.value).sum();
        let original_value: f64 = children.iter().map(|c| c.original_value).sum();

        if signed != 0.0 && !approx_eq(signed, original_value, 1e-6) {
            debug!(
                "Ledger total {} for {} differs from its children ({}); using the children",
                signed, entry.code, original_value
            );
        }

        AccountNode {
            code: entry.code.clone(),
            name: entry.name.clone(),
            section,
            value,
            original_value,
            excluded,
            tags,
            fixed_share: None,
            children,
            vertical_percentage: None,
            horizontal_change: None,
        }
    }
}

fn index_splits(mixed_costs: &[MixedCostSplit]) -> Result<HashMap<&str, f64>> {
    let mut splits = HashMap::new();
    for split in mixed_costs {
        if !split.fixed_share.is_finite() || !(0.0..=1.0).contains(&split.fixed_share) {
            return Err(StatementEngineError::InvalidCostShare {
                code: split.account_code.clone(),
                share: split.fixed_share,
            });
        }
        splits.insert(split.account_code.trim(), split.fixed_share);
    }
    Ok(splits)
}

fn raw_total(entries: &[Entry], idx: usize) -> f64 {
    let entry = &entries[idx];
    if entry.children.is_empty() {
        entry.amount
    } else {
        entry.children.iter().map(|&c| raw_total(entries, c)).sum()
    }
}

fn signed_amount(section: StatementSection, amount: f64, convention: SignConvention) -> f64 {
    match convention {
        SignConvention::Signed => amount,
        SignConvention::PositiveExpenses if section.is_expense() => -amount,
        SignConvention::PositiveExpenses => amount,
    }
}

/// Builds the account tree for `records`. See [`TreeBuilder`].
pub fn build_tree(
    records: &[LedgerRecord],
    period: PeriodSelector,
    view: &AnalysisViewConfig,
    mixed_costs: &[MixedCostSplit],
    classifier: &PatternClassifier,
    config: &StatementConfig,
) -> Result<Vec<AccountNode>> {
    TreeBuilder::new(classifier, config)
        .build(records, period, view, mixed_costs)
        .map(|chart| chart.roots)
}

impl ChartOfAccounts {
    pub fn find(&self, code: &str) -> Option<&AccountNode> {
        self.roots.iter().find_map(|root| root.find(code))
    }

    pub fn nodes(&self) -> Vec<&AccountNode> {
        self.roots.iter().flat_map(|root| root.walk()).collect()
    }

    pub fn leaves(&self) -> Vec<&AccountNode> {
        self.roots.iter().flat_map(|root| root.leaves()).collect()
    }

    pub fn total_accounts(&self) -> usize {
        self.nodes().len()
    }

    /// Sum of the root values, i.e. the net result of the tree.
    pub fn net_total(&self) -> f64 {
        self.roots.iter().map(|r| r.value).sum()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Code,Account Name,Section,Value,Original Value,Excluded\n");

        for node in self.nodes() {
            output.push_str(&format!(
                "{},{},{},{},{},{}\n",
                csv_field(&node.code),
                csv_field(&node.name),
                node.section.label(),
                node.value,
                node.original_value,
                node.excluded
            ));
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "# Estado de Resultados - {} ({})\n\n",
            self.analysis_type, self.period
        ));

        for root in &self.roots {
            output.push_str(&format!(
                "## {} {} ({})\n\n",
                root.code,
                root.name,
                root.section.label()
            ));
            for child in &root.children {
                write_markdown_node(&mut output, child, 0);
            }
            output.push_str(&format!("**Total:** {:.2}\n\n", root.value));
        }

        output
    }
}

fn write_markdown_node(output: &mut String, node: &AccountNode, depth: usize) {
    let marker = if node.excluded {
        format!(" **[EXCLUDED, original {:.2}]**", node.original_value)
    } else {
        String::new()
    };
    output.push_str(&format!(
        "{}- {} {}: {:.2}{}\n",
        "  ".repeat(depth),
        node.code,
        node.name,
        node.value,
        marker
    ));
    for child in &node.children {
        write_markdown_node(output, child, depth + 1);
    }
}

fn csv_field(text: &str) -> String {
    if text.contains(',') || text.contains('"') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}
