// src/services/calculations.rs
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::ReturnAssumptions;
use crate::models::{value, value_or, ProForma, ProgramType, Section, SectionKind};

pub const DEFAULT_EXIT_CAP_RATE_PCT: f64 = 5.25;
pub const DEFAULT_LP_EQUITY_PCT: f64 = 90.0;
pub const DEFAULT_OTHER_INCOME_PER_UNIT: f64 = 125.0;
pub const DEFAULT_CONSTRUCTION_MONTHS: f64 = 18.0;
pub const DEFAULT_LEASE_UP_MONTHS: f64 = 18.0;
/// Years held after stabilization when no exit year is stated.
pub const STABILIZED_HOLD_YEARS: f64 = 2.0;
/// IRR reported when the LP loses everything (multiple <= 0).
pub const TOTAL_LOSS_IRR_PCT: f64 = -100.0;
const DISCREPANCY_THRESHOLD_PCT: f64 = 15.0;

/// Independent cross-check of a pro forma's return metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcResults {
    pub calc_noi: Option<f64>,
    pub calc_gross_exit_value: Option<f64>,
    pub calc_net_exit_value: Option<f64>,
    pub calc_total_profit: Option<f64>,
    pub calc_profit_on_cost_pct: Option<f64>,
    pub calc_equity_multiple_approx: Option<f64>,
    pub calc_irr_approx_pct: Option<f64>,
    pub calc_hold_years: Option<f64>,
}

/// Zero counts as "not provided" for the inputs the formulas divide or multiply by.
fn present(v: Option<f64>) -> Option<f64> {
    v.filter(|x| *x != 0.0 && x.is_finite())
}

fn estimate_noi(
    program: &ProgramType,
    revenue: Option<&Section>,
    summary: Option<&Section>,
    assumptions: &ReturnAssumptions,
) -> Option<f64> {
    let occupancy =
        value_or(revenue, "stabilized_occupancy_pct", program.default_occupancy_pct()) / 100.0;

    match program {
        ProgramType::Multifamily | ProgramType::Condo => {
            let rent_psf = present(value(revenue, "rent_psf_monthly"))?;
            let unit_count = present(value(summary, "unit_count"))?;
            let avg_unit_sf = value(revenue, "avg_unit_size_sf")
                .or_else(|| value(summary, "avg_unit_size_sf"))
                .unwrap_or(assumptions.avg_unit_sf);

            let gross_rent = rent_psf * unit_count * avg_unit_sf * 12.0;
            let other_income_monthly = value_or(
                revenue,
                "other_income_per_unit_monthly",
                DEFAULT_OTHER_INCOME_PER_UNIT,
            );
            let other_income = other_income_monthly * unit_count * 12.0;
            let egi = (gross_rent + other_income) * occupancy;
            Some(egi * (1.0 - assumptions.opex_ratio))
        }
        ProgramType::Office => {
            // NNN rent is effectively NOI
            let rent_psf = present(value(revenue, "rent_psf_annual_nnn"))?;
            let rentable_sf = present(value(summary, "rentable_sf"))?;
            Some(rent_psf * rentable_sf * occupancy)
        }
        ProgramType::Hotel => {
            let adr = present(value(revenue, "adr"))?;
            let keys = present(value(summary, "total_keys"))?;
            let revpar = adr * occupancy;
            let gross_revenue = revpar * keys * 365.0;
            Some(gross_revenue * assumptions.hotel_noi_margin)
        }
        ProgramType::Other(name) => {
            debug!("No NOI model for program type '{}'", name);
            None
        }
    }
}

/// `(multiple^(1/years) - 1) * 100`, with a total-loss floor for non-positive multiples.
pub fn approx_irr_pct(equity_multiple: f64, hold_years: f64) -> Option<f64> {
    if equity_multiple <= 0.0 {
        return Some(TOTAL_LOSS_IRR_PCT);
    }
    if hold_years <= 0.0 {
        warn!("Hold period of {} years, skipping IRR approximation", hold_years);
        return None;
    }
    let irr = (equity_multiple.powf(1.0 / hold_years) - 1.0) * 100.0;
    Some(irr).filter(|v| v.is_finite())
}

pub fn compute_returns(pro_forma: &ProForma) -> CalcResults {
    compute_returns_with(pro_forma, &ReturnAssumptions::default())
}

pub fn compute_returns_with(pro_forma: &ProForma, assumptions: &ReturnAssumptions) -> CalcResults {
    let summary = pro_forma.section(SectionKind::ProjectSummary);
    let revenue = pro_forma.section(SectionKind::RevenueAssumptions);
    let costs = pro_forma.section(SectionKind::CostAssumptions);
    let financing = pro_forma.section(SectionKind::FinancingAssumptions);
    let returns = pro_forma.section(SectionKind::ReturnMetrics);

    let total_cost = present(value(costs, "total_project_cost"));
    let equity = present(value(financing, "equity_required"));
    let lp_equity = value(financing, "lp_equity_amount").filter(|v| *v > 0.0);

    let noi = value(returns, "stabilized_noi")
        .or_else(|| estimate_noi(&pro_forma.program_type(), revenue, summary, assumptions));

    let cap_rate = value_or(returns, "exit_cap_rate_pct", DEFAULT_EXIT_CAP_RATE_PCT) / 100.0;
    let gross_exit = present(noi).filter(|_| cap_rate > 0.0).map(|n| n / cap_rate);
    let net_exit = gross_exit.map(|g| g - g * assumptions.sale_cost_pct / 100.0);

    let total_profit = match (present(net_exit), total_cost) {
        (Some(net), Some(cost)) => Some(net - cost),
        _ => None,
    };
    let profit_on_cost = match (present(total_profit), total_cost) {
        (Some(profit), Some(cost)) => Some(profit / cost * 100.0),
        _ => None,
    };

    let hold_years = present(value(returns, "exit_year")).unwrap_or_else(|| {
        let construction = value_or(
            summary,
            "construction_duration_months",
            DEFAULT_CONSTRUCTION_MONTHS,
        );
        let lease_up = value_or(revenue, "lease_up_months", DEFAULT_LEASE_UP_MONTHS);
        (construction + lease_up) / 12.0 + STABILIZED_HOLD_YEARS
    });

    let mut equity_multiple = None;
    let mut irr = None;

    if let (Some(lp_equity), Some(profit), Some(_)) = (lp_equity, present(total_profit), equity) {
        let lp_pct = value_or(financing, "lp_equity_pct", DEFAULT_LP_EQUITY_PCT) / 100.0;
        let lp_profit_share = profit * lp_pct * (1.0 - assumptions.promote_haircut);
        let multiple = (lp_equity + lp_profit_share) / lp_equity;

        equity_multiple = Some(multiple);
        irr = approx_irr_pct(multiple, hold_years);
    } else {
        debug!("LP return approximation skipped: equity or profit unavailable");
    }

    CalcResults {
        calc_noi: noi,
        calc_gross_exit_value: gross_exit,
        calc_net_exit_value: net_exit,
        calc_total_profit: total_profit,
        calc_profit_on_cost_pct: profit_on_cost,
        calc_equity_multiple_approx: equity_multiple,
        calc_irr_approx_pct: irr,
        calc_hold_years: Some(hold_years),
    }
}

struct MetricCheck {
    model_key: &'static str,
    name: &'static str,
    suffix: &'static str,
    decimals: usize,
    hint: &'static str,
}

const METRIC_CHECKS: [MetricCheck; 3] = [
    MetricCheck {
        model_key: "profit_on_cost_pct",
        name: "Profit on cost",
        suffix: "%",
        decimals: 1,
        hint: "Review cost or exit assumptions.",
    },
    MetricCheck {
        model_key: "equity_multiple_lp",
        name: "Equity multiple",
        suffix: "x",
        decimals: 2,
        hint: "Review construction cost or exit cap rate.",
    },
    MetricCheck {
        model_key: "project_irr_levered_pct",
        name: "IRR",
        suffix: "%",
        decimals: 1,
        hint: "Review timing or leverage assumptions.",
    },
];

/// Relative difference of `model` against `calc`, in percent.
pub fn relative_diff_pct(model: f64, calc: f64) -> f64 {
    (model - calc).abs() / calc.abs() * 100.0
}

/// Warnings for return metrics that differ from the calculator by more than 15%.
pub fn check_return_discrepancy(pro_forma: &ProForma, calc: &CalcResults) -> Vec<String> {
    let returns = pro_forma.section(SectionKind::ReturnMetrics);
    let calculated = [
        calc.calc_profit_on_cost_pct,
        calc.calc_equity_multiple_approx,
        calc.calc_irr_approx_pct,
    ];

    METRIC_CHECKS
        .iter()
        .zip(calculated)
        .filter_map(|(check, calc_value)| {
            let model = present(value(returns, check.model_key))?;
            let calc_value = present(calc_value)?;
            if relative_diff_pct(model, calc_value) <= DISCREPANCY_THRESHOLD_PCT {
                return None;
            }
            Some(format!(
                concat!(
                    "{} discrepancy: model shows {:.prec$}{suffix}, ",
                    "calculator estimates {:.prec$}{suffix}. {}"
                ),
                check.name,
                model,
                calc_value,
                check.hint,
                prec = check.decimals,
                suffix = check.suffix,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, Label, LabeledField};
    use serde_json::json;

    fn pro_forma(value: serde_json::Value) -> ProForma {
        serde_json::from_value(value).unwrap()
    }

    fn close(actual: Option<f64>, expected: f64, tolerance: f64) -> bool {
        actual.map(|a| (a - expected).abs() <= tolerance).unwrap_or(false)
    }

    #[test]
    fn multifamily_noi_from_rent() {
        let pf = pro_forma(json!({
            "project_summary": {"program_type": "multifamily", "unit_count": 200},
            "revenue_assumptions": {
                "rent_psf_monthly": {
                    "value": 1.85, "unit": "$/sf/month", "label": "estimated", "source": "broker"
                },
                "stabilized_occupancy_pct": 93,
                "other_income_per_unit_monthly": 125
            }
        }));
        let calc = compute_returns(&pf);
        assert!(close(calc.calc_noi, 2_596_932.0, 1e-3), "{:?}", calc.calc_noi);
    }

    #[test]
    fn office_and_hotel_noi() {
        let office = pro_forma(json!({
            "project_summary": {"program_type": "office", "rentable_sf": 100000},
            "revenue_assumptions": {"rent_psf_annual_nnn": 40}
        }));
        assert!(close(compute_returns(&office).calc_noi, 3_520_000.0, 1e-3));

        let hotel = pro_forma(json!({
            "project_summary": {"program_type": "hotel", "total_keys": 150},
            "revenue_assumptions": {"adr": 200, "stabilized_occupancy_pct": 70}
        }));
        // 200 * 0.7 * 150 * 365 * 0.35
        assert!(close(compute_returns(&hotel).calc_noi, 2_682_750.0, 1e-3));
    }

    #[test]
    fn unknown_program_has_no_noi() {
        let pf = pro_forma(json!({
            "project_summary": {"program_type": "retail", "unit_count": 10},
            "revenue_assumptions": {"rent_psf_monthly": 3.0},
            "cost_assumptions": {"total_project_cost": 1000000}
        }));
        let calc = compute_returns(&pf);
        assert_eq!(calc.calc_noi, None);
        assert_eq!(calc.calc_gross_exit_value, None);
        assert_eq!(calc.calc_total_profit, None);
        assert_eq!(calc.calc_irr_approx_pct, None);
    }

    #[test]
    fn exit_value_and_profit() {
        let pf = pro_forma(json!({
            "cost_assumptions": {"total_project_cost": 70000000},
            "return_metrics": {"stabilized_noi": 4000000, "exit_cap_rate_pct": 5.25}
        }));
        let calc = compute_returns(&pf);
        assert!(close(calc.calc_gross_exit_value, 76_190_476.19, 0.01));
        assert!(close(calc.calc_net_exit_value, 74_285_714.29, 0.01));
        assert!(close(calc.calc_total_profit, 4_285_714.29, 0.01));
        assert!(close(calc.calc_profit_on_cost_pct, 6.12, 0.005));
        // no financing section
        assert_eq!(calc.calc_equity_multiple_approx, None);
    }

    #[test]
    fn lp_multiple_and_irr() {
        let pf = pro_forma(json!({
            "cost_assumptions": {"total_project_cost": 70000000},
            "financing_assumptions": {
                "equity_required": 24500000,
                "lp_equity_pct": 90,
                "lp_equity_amount": 22050000
            },
            "return_metrics": {"stabilized_noi": 4000000, "exit_cap_rate_pct": 5.25, "exit_year": 5}
        }));
        let calc = compute_returns(&pf);
        let profit = calc.calc_total_profit.unwrap();
        let multiple = (22_050_000.0 + profit * 0.9 * 0.8) / 22_050_000.0;
        assert!(close(calc.calc_equity_multiple_approx, multiple, 1e-12));
        assert!(close(calc.calc_irr_approx_pct, (multiple.powf(0.2) - 1.0) * 100.0, 1e-9));
        assert_eq!(calc.calc_hold_years, Some(5.0));
    }

    #[test]
    fn hold_years_fall_back_to_schedule() {
        let pf = pro_forma(json!({
            "project_summary": {"construction_duration_months": 24},
            "revenue_assumptions": {"lease_up_months": 12}
        }));
        assert_eq!(compute_returns(&pf).calc_hold_years, Some(5.0));

        let pf = pro_forma(json!({"project_summary": {"construction_duration_months": 30}}));
        assert_eq!(compute_returns(&pf).calc_hold_years, Some(6.0));
    }

    #[test]
    fn total_loss_reports_sentinel_irr() {
        let pf = pro_forma(json!({
            "cost_assumptions": {"total_project_cost": 200000000},
            "financing_assumptions": {"equity_required": 20000000, "lp_equity_amount": 18000000},
            "return_metrics": {"stabilized_noi": 1000000}
        }));
        let calc = compute_returns(&pf);
        assert!(calc.calc_equity_multiple_approx.unwrap() <= 0.0);
        assert_eq!(calc.calc_irr_approx_pct, Some(-100.0));
        assert_eq!(approx_irr_pct(0.0, 5.0), Some(-100.0));
        assert_eq!(approx_irr_pct(1.5, 0.0), None);
    }

    #[test]
    fn missing_everything_is_tolerated_and_deterministic() {
        let empty = ProForma::default();
        let first = compute_returns(&empty);
        assert_eq!(first, compute_returns(&empty));
        assert_eq!(first.calc_noi, None);
        assert_eq!(first.calc_profit_on_cost_pct, None);
        assert_eq!(first.calc_hold_years, Some(5.0));

        let mut partial = ProForma::default();
        partial
            .section_mut(SectionKind::CostAssumptions)
            .insert(
                "total_project_cost",
                Field::Labeled(LabeledField::new(None, "$", Label::Missing, "")),
            );
        partial
            .section_mut(SectionKind::ReturnMetrics)
            .insert("stabilized_noi", Field::Text("unknown".into()));
        let calc = compute_returns(&partial);
        assert_eq!(calc.calc_noi, None);
        assert_eq!(calc.calc_total_profit, None);
    }

    #[test]
    fn configurable_assumptions_change_noi() {
        let pf = pro_forma(json!({
            "project_summary": {"unit_count": 100},
            "revenue_assumptions": {
                "rent_psf_monthly": 2.0,
                "stabilized_occupancy_pct": 100,
                "other_income_per_unit_monthly": 0
            }
        }));
        let lean = ReturnAssumptions { opex_ratio: 0.25, ..ReturnAssumptions::default() };
        // 2 * 100 * 900 * 12 * 0.75
        assert!(close(compute_returns_with(&pf, &lean).calc_noi, 1_620_000.0, 1e-3));
    }

    fn with_returns(model: serde_json::Value) -> ProForma {
        pro_forma(json!({ "return_metrics": model }))
    }

    #[test]
    fn discrepancy_threshold_is_exclusive() {
        let calc = CalcResults { calc_profit_on_cost_pct: Some(10.0), ..Default::default() };

        let over = with_returns(json!({"profit_on_cost_pct": 11.501}));
        let warnings = check_return_discrepancy(&over, &calc);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Profit on cost discrepancy: model shows 11.5%"));
        assert!(warnings[0].contains("calculator estimates 10.0%"));

        let under = with_returns(json!({"profit_on_cost_pct": 11.499}));
        assert!(check_return_discrepancy(&under, &calc).is_empty());
    }

    #[test]
    fn discrepancy_skips_missing_sides_and_keeps_order() {
        let calc = CalcResults {
            calc_profit_on_cost_pct: None,
            calc_equity_multiple_approx: Some(1.5),
            calc_irr_approx_pct: Some(10.0),
            ..Default::default()
        };
        let pf = with_returns(json!({
            "profit_on_cost_pct": 25.0,
            "equity_multiple_lp": {"value": 2.1, "unit": "x", "label": "estimated", "source": "LP calc"},
            "project_irr_levered_pct": {"value": null, "unit": "%", "label": "missing", "source": ""}
        }));
        let warnings = check_return_discrepancy(&pf, &calc);
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0],
            "Equity multiple discrepancy: model shows 2.10x, calculator estimates 1.50x. Review construction cost or exit cap rate."
        );

        let pf = with_returns(json!({"equity_multiple_lp": 1.0, "project_irr_levered_pct": 20.0}));
        let warnings = check_return_discrepancy(&pf, &calc);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("Equity multiple"));
        assert!(warnings[1].starts_with("IRR discrepancy"));
    }
}
