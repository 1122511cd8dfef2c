use crate::schema::{
    AccountNode, AnalysisType, CostContribution, CostStructure, PatternGroup, StatementSection,
    SummaryKpis,
};

/// Derives the top-line KPIs from a computed tree.
///
/// `utilidad` is the sum of the three sections, which equals the sum of the
/// whole tree because costs and expenses are already negative. Under the Cash
/// view depreciation and interest were excluded while building, so `ebitda`
/// equals `utilidad`; every other view adds back the depreciation and interest
/// leaves that stayed in the totals, as tagged by the classifier.
pub fn summarize(tree: &[AccountNode], analysis_type: AnalysisType) -> SummaryKpis {
    let section_total = |section: StatementSection| -> f64 {
        tree.iter()
            .filter(|root| root.section == section)
            .map(|root| root.value)
            .sum()
    };

    let ingresos = section_total(StatementSection::Revenue);
    let costos = section_total(StatementSection::CostOfSales);
    let gastos_operacionales = section_total(StatementSection::OperatingExpense);
    let utilidad = ingresos + costos + gastos_operacionales;

    let ebitda = match analysis_type {
        AnalysisType::Cash => utilidad,
        AnalysisType::Standard | AnalysisType::Operating => utilidad + ebitda_add_back(tree),
    };

    SummaryKpis {
        ingresos,
        costos,
        gastos_operacionales,
        utilidad,
        ebitda,
    }
}

/// Depreciation and interest still included in the totals, as a positive
/// add-back.
pub fn ebitda_add_back(tree: &[AccountNode]) -> f64 {
    -tree
        .iter()
        .flat_map(|root| root.leaves())
        .filter(|leaf| !leaf.excluded)
        .filter(|leaf| {
            leaf.has_tag(PatternGroup::Depreciation) || leaf.has_tag(PatternGroup::Interest)
        })
        .map(|leaf| leaf.value)
        .sum::<f64>()
}

/// Fixed share used for a cost or expense leaf without an explicit split.
pub fn default_fixed_share(section: StatementSection) -> f64 {
    match section {
        StatementSection::CostOfSales => 0.0,
        StatementSection::OperatingExpense => 1.0,
        StatementSection::Revenue => 0.0,
    }
}

/// Splits every cost and expense leaf into fixed and variable parts for
/// break-even consumers. The tree itself keeps the undivided amounts.
pub fn cost_structure(tree: &[AccountNode]) -> CostStructure {
    let contributions: Vec<CostContribution> = tree
        .iter()
        .flat_map(|root| root.leaves())
        .filter(|leaf| leaf.section.is_expense())
        .map(|leaf| {
            let share = leaf
                .fixed_share
                .unwrap_or_else(|| default_fixed_share(leaf.section));
            let fixed = leaf.value * share;
            CostContribution {
                code: leaf.code.clone(),
                fixed,
                variable: leaf.value - fixed,
            }
        })
        .collect();

    CostStructure {
        fixed_costs: contributions.iter().map(|c| c.fixed).sum(),
        variable_costs: contributions.iter().map(|c| c.variable).sum(),
        contributions,
    }
}
