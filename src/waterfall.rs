use crate::schema::{AccountNode, AnalysisType, SummaryKpis, WaterfallBar};
use crate::summary::cost_structure;

/// Accumulates bars, keeping the running total between them.
struct WaterfallBuilder {
    bars: Vec<WaterfallBar>,
    running_total: f64,
}

impl WaterfallBuilder {
    fn new() -> Self {
        Self {
            bars: Vec::new(),
            running_total: 0.0,
        }
    }

    /// A bar drawn from zero that resets the running total.
    fn total(&mut self, name: &str, value: f64) {
        self.running_total = value;
        self.bars.push(WaterfallBar {
            name: name.to_string(),
            value,
            is_total: true,
            stack_base: 0.0,
            stack_value: value,
            running_total: value,
        });
    }

    /// A floating bar starting at the running total before this item.
    fn step(&mut self, name: &str, value: f64) {
        let stack_base = self.running_total;
        self.running_total += value;
        self.bars.push(WaterfallBar {
            name: name.to_string(),
            value,
            is_total: false,
            stack_base,
            stack_value: value.abs(),
            running_total: self.running_total,
        });
    }

    fn finish(self) -> Vec<WaterfallBar> {
        self.bars
    }
}

/// Bridge from revenue to the view's bottom line.
///
/// Costs and expenses are bucketed into variable and fixed parts (see
/// [`cost_structure`]). The Cash view closes on `EBITDA`; the others close on
/// `Utilidad`, followed by the depreciation and interest add-back and an
/// `EBITDA` total when that add-back is not zero.
pub fn build_waterfall(
    tree: &[AccountNode],
    summary: &SummaryKpis,
    analysis_type: AnalysisType,
) -> Vec<WaterfallBar> {
    let costs = cost_structure(tree);
    let mut builder = WaterfallBuilder::new();

    builder.total("Ingresos", summary.ingresos);
    builder.step("Costos Variables", costs.variable_costs);
    builder.step("Costos Fijos", costs.fixed_costs);

    match analysis_type {
        AnalysisType::Cash => builder.total("EBITDA", summary.ebitda),
        AnalysisType::Standard | AnalysisType::Operating => {
            builder.total("Utilidad", summary.utilidad);
            let add_back = summary.ebitda - summary.utilidad;
            if add_back != 0.0 {
                builder.step("Depreciación e Intereses", add_back);
                builder.total("EBITDA", summary.ebitda);
            }
        }
    }

    builder.finish()
}
