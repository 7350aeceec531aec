// src/services/sensitivity.rs
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::ReturnAssumptions;
use crate::models::{value, value_or, ProForma, SectionKind};
use crate::services::calculations::{
    compute_returns_with, DEFAULT_EXIT_CAP_RATE_PCT, DEFAULT_LP_EQUITY_PCT,
};

pub const CAP_RATE_STEP_PCT: f64 = 0.5;
pub const COST_FACTORS: [f64; 3] = [0.9, 1.0, 1.1];
pub const COST_LABELS: [&str; 3] = ["-10%", "Base", "+10%"];
/// Yellow band below the target IRR, in percentage points.
pub const NEAR_TARGET_BAND_PCT: f64 = 2.0;

/// Cost fields scaled together in each scenario.
pub const SCALED_COST_FIELDS: [&str; 5] = [
    "hard_cost_psf",
    "hard_cost_total",
    "soft_cost_total",
    "contingency_total",
    "total_project_cost",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellColor {
    Green,
    Yellow,
    Red,
    Neutral,
}

impl CellColor {
    /// A zero target counts as no target.
    pub fn classify(irr: Option<f64>, target_irr: Option<f64>) -> Self {
        match (irr, target_irr.filter(|t| *t != 0.0)) {
            (Some(irr), Some(target)) if irr >= target => CellColor::Green,
            (Some(irr), Some(target)) if irr >= target - NEAR_TARGET_BAND_PCT => CellColor::Yellow,
            (Some(_), Some(_)) => CellColor::Red,
            _ => CellColor::Neutral,
        }
    }
}

/// Missing parts of a posted table fall back to the standard 3x3 layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityTable {
    pub row_label: String,
    pub col_label: String,
    pub rows: Vec<String>,
    pub cols: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
    pub colors: Vec<Vec<CellColor>>,
    pub base_position: [usize; 2],
    /// Target the colors were classified against, when one was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_irr: Option<f64>,
}

impl SensitivityTable {
    pub fn value_at(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    pub fn color_at(&self, row: usize, col: usize) -> CellColor {
        self.colors
            .get(row)
            .and_then(|r| r.get(col))
            .copied()
            .unwrap_or(CellColor::Neutral)
    }
}

impl Default for SensitivityTable {
    fn default() -> Self {
        SensitivityTable {
            row_label: "Exit Cap Rate".to_string(),
            col_label: "Construction Cost".to_string(),
            rows: cap_rate_labels(DEFAULT_EXIT_CAP_RATE_PCT),
            cols: COST_LABELS.iter().map(|c| c.to_string()).collect(),
            values: vec![vec![None; COST_FACTORS.len()]; 3],
            colors: vec![vec![CellColor::Neutral; COST_FACTORS.len()]; 3],
            base_position: [1, 1],
            target_irr: None,
        }
    }
}

fn cap_rate_labels(base_cap_pct: f64) -> Vec<String> {
    cap_rates(base_cap_pct)
        .iter()
        .map(|r| format!("{:.2}%", r))
        .collect()
}

fn cap_rates(base_cap_pct: f64) -> [f64; 3] {
    [
        base_cap_pct - CAP_RATE_STEP_PCT,
        base_cap_pct,
        base_cap_pct + CAP_RATE_STEP_PCT,
    ]
}

/// One-decimal rounding of the exact binary value, so `0.35` (stored just
/// below 0.35) becomes `0.3` rather than `0.4`.
fn round1(v: f64) -> f64 {
    format!("{:.1}", v).parse().unwrap_or(v)
}

/// Copy of `pro_forma` at the given exit cap rate with construction costs scaled by `cost_factor`.
pub fn create_scenario(
    pro_forma: &ProForma,
    cap_rate_pct: f64,
    cost_factor: f64,
) -> ProForma {
    let mut scenario = pro_forma.clone();

    scenario
        .section_mut(SectionKind::ReturnMetrics)
        .set_number("exit_cap_rate_pct", cap_rate_pct);

    if let Some(costs) = scenario.cost_assumptions.as_mut() {
        for key in SCALED_COST_FIELDS {
            if let Some(field) = costs.get_mut(key) {
                field.scale(cost_factor);
            }
        }
    }

    let total_cost = value(
        scenario.section(SectionKind::CostAssumptions),
        "total_project_cost",
    )
    .filter(|v| *v != 0.0);
    let loan = value(
        scenario.section(SectionKind::FinancingAssumptions),
        "construction_loan_amount",
    )
    .filter(|v| *v != 0.0);

    if let (Some(total_cost), Some(loan), Some(financing)) =
        (total_cost, loan, scenario.financing_assumptions.as_mut())
    {
        let equity = total_cost - loan;
        let lp_pct =
            value_or(Some(&*financing), "lp_equity_pct", DEFAULT_LP_EQUITY_PCT) / 100.0;

        if let Some(field) = financing.get_mut("equity_required") {
            field.set_number(equity);
        }
        if let Some(field) = financing.get_mut("lp_equity_amount") {
            field.set_number(equity * lp_pct);
        }
    }

    scenario
}

pub fn compute_sensitivity_table(
    pro_forma: &ProForma,
    target_irr: Option<f64>,
) -> SensitivityTable {
    compute_sensitivity_table_with(pro_forma, target_irr, &ReturnAssumptions::default())
}

/// 3x3 levered IRR grid over exit cap rate (rows) and construction cost (columns).
pub fn compute_sensitivity_table_with(
    pro_forma: &ProForma,
    target_irr: Option<f64>,
    assumptions: &ReturnAssumptions,
) -> SensitivityTable {
    let base_cap_rate = value_or(
        pro_forma.section(SectionKind::ReturnMetrics),
        "exit_cap_rate_pct",
        DEFAULT_EXIT_CAP_RATE_PCT,
    );
    let cap_rates = cap_rates(base_cap_rate);

    let mut values = Vec::with_capacity(cap_rates.len());
    let mut colors = Vec::with_capacity(cap_rates.len());

    for cap_rate in cap_rates {
        let mut row_values = Vec::with_capacity(COST_FACTORS.len());
        let mut row_colors = Vec::with_capacity(COST_FACTORS.len());

        for cost_factor in COST_FACTORS {
            let scenario = create_scenario(pro_forma, cap_rate, cost_factor);
            let irr = compute_returns_with(&scenario, assumptions)
                .calc_irr_approx_pct
                .filter(|v| v.is_finite())
                .map(round1);

            row_values.push(irr);
            row_colors.push(CellColor::classify(irr, target_irr));
        }

        values.push(row_values);
        colors.push(row_colors);
    }

    debug!("Sensitivity grid around {:.2}% cap: {:?}", base_cap_rate, values);

    SensitivityTable {
        rows: cap_rate_labels(base_cap_rate),
        values,
        colors,
        target_irr: target_irr.filter(|t| *t != 0.0),
        ..SensitivityTable::default()
    }
}
