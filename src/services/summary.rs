// src/services/summary.rs
use crate::models::{ProForma, SectionKind};
use crate::services::calculations::CalcResults;
use crate::services::format::with_commas;

pub const BROKER_REVIEW_NOTE: &str =
    "All revenue and cost assumptions are estimated from market data -- review with your broker before committing to an underwrite.";

/// Plain-English recap of a generated pro forma for the chat reply.
pub fn build_answer_summary(
    pro_forma: &ProForma,
    calc: &CalcResults,
    warnings: &[String],
) -> String {
    let deal_name = pro_forma.deal_name().unwrap_or("Your project");
    let positive = |key: &str| {
        pro_forma
            .value(SectionKind::ProjectSummary, key)
            .filter(|v| *v > 0.0)
    };
    let unit_count = positive("unit_count");
    let total_gfa = positive("total_gfa_sf");
    let total_cost = pro_forma.value(SectionKind::CostAssumptions, "total_project_cost");
    let hard_cost_psf = pro_forma.value(SectionKind::CostAssumptions, "hard_cost_psf");
    let cap_rate = pro_forma.value(SectionKind::ReturnMetrics, "exit_cap_rate_pct");
    let irr = pro_forma.value(SectionKind::ReturnMetrics, "project_irr_levered_pct");
    let multiple = pro_forma.value(SectionKind::ReturnMetrics, "equity_multiple_lp");

    let mut opening = match (unit_count, total_gfa) {
        (Some(units), _) => format!("{} ({} units)", deal_name, with_commas(units, 0)),
        (None, Some(gfa)) => format!("{} ({} SF)", deal_name, with_commas(gfa, 0)),
        (None, None) => deal_name.to_string(),
    };

    match (irr, multiple) {
        (Some(irr), Some(multiple)) => opening.push_str(&format!(
            " projects a levered LP IRR of {:.1}% and {:.2}x equity multiple",
            irr, multiple
        )),
        _ => {
            let approx = (calc.calc_irr_approx_pct, calc.calc_equity_multiple_approx);
            if let (Some(irr), Some(multiple)) = approx {
                opening.push_str(&format!(
                    concat!(
                        " has an approximate LP IRR of {:.1}% and {:.2}x equity multiple",
                        " by the return calculator"
                    ),
                    irr, multiple
                ));
            }
        }
    }

    if let Some(cost) = total_cost {
        opening.push_str(&format!(" on a total project cost of ${:.1}M", cost / 1_000_000.0));
    }

    let mut sentences = vec![opening];
    if let Some(psf) = hard_cost_psf {
        sentences.push(format!("Construction cost is estimated at ${:.0}/sf", psf));
    }
    if let Some(cap) = cap_rate {
        sentences.push(format!("Exit is modeled at a {:.2}% cap rate", cap));
    }

    let mut answer = sentences.join(". ") + ".";
    if !warnings.is_empty() {
        answer.push_str("\n\nNOTE: ");
        answer.push_str(&warnings.join(" "));
    }
    answer.push_str("\n\n");
    answer.push_str(BROKER_REVIEW_NOTE);
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summarizes_headline_numbers() {
        let pf: ProForma = serde_json::from_value(json!({
            "project_summary": {"deal_name": "Charlotte Multifamily", "unit_count": 200},
            "cost_assumptions": {"total_project_cost": 74590600, "hard_cost_psf": 275},
            "return_metrics": {
                "exit_cap_rate_pct": 5.25,
                "project_irr_levered_pct": 15.5,
                "equity_multiple_lp": 1.85
            }
        }))
        .unwrap();

        let warnings = ["Check the cap rate.".to_string()];
        let text = build_answer_summary(&pf, &CalcResults::default(), &warnings);
        assert!(text.starts_with(concat!(
            "Charlotte Multifamily (200 units) projects a levered LP IRR of 15.5% ",
            "and 1.85x equity multiple on a total project cost of $74.6M."
        )));
        assert!(text.contains(
            "Construction cost is estimated at $275/sf. Exit is modeled at a 5.25% cap rate."
        ));
        assert!(text.contains("NOTE: Check the cap rate."));
        assert!(text.ends_with(BROKER_REVIEW_NOTE));
    }

    #[test]
    fn falls_back_to_calculator_and_defaults() {
        let calc = CalcResults {
            calc_irr_approx_pct: Some(12.34),
            calc_equity_multiple_approx: Some(1.6),
            ..Default::default()
        };
        let text = build_answer_summary(&ProForma::default(), &calc, &[]);
        assert!(text.starts_with("Your project has an approximate LP IRR of 12.3% and 1.60x"));
        assert!(!text.contains("NOTE:"));
    }
}
