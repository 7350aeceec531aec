// src/services/adjustments.rs
use anyhow::Result;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ReturnAssumptions;
use crate::models::{Field, Label, LabeledField, ProForma, ProFormaModel, SectionKind};

pub const ADJUSTMENT_SOURCE: &str = "user adjustment";

/// A user-driven change to a single pro forma field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub section: SectionKind,
    pub key: String,
    pub value: f64,
    pub unit: String,
}

impl Adjustment {
    pub fn new(section: SectionKind, key: &str, value: f64, unit: &str) -> Self {
        Adjustment {
            section,
            key: key.to_string(),
            value,
            unit: unit.to_string(),
        }
    }

    pub fn exit_cap_rate(pct: f64) -> Self {
        Adjustment::new(SectionKind::ReturnMetrics, "exit_cap_rate_pct", pct, "%")
    }

    pub fn monthly_rent(psf: f64) -> Self {
        Adjustment::new(SectionKind::RevenueAssumptions, "rent_psf_monthly", psf, "$/SF/mo")
    }

    pub fn unit_count(units: f64) -> Self {
        Adjustment::new(SectionKind::ProjectSummary, "unit_count", units, "units")
    }

    pub fn hard_cost(psf: f64) -> Self {
        Adjustment::new(SectionKind::CostAssumptions, "hard_cost_psf", psf, "$/SF")
    }

    /// Short description for the chat reply ("exit cap to 5.5%").
    pub fn describe(&self) -> String {
        match self.key.as_str() {
            "exit_cap_rate_pct" => format!("exit cap to {}%", self.value),
            "rent_psf_monthly" => format!("rent to ${}/SF", self.value),
            "unit_count" => format!("units to {}", self.value),
            "hard_cost_psf" => format!("hard cost to ${}/SF", self.value),
            key => format!("{} to {}", key.replace('_', " "), self.value),
        }
    }
}

/// New pro forma with the adjusted field replaced by a confirmed value.
pub fn apply_adjustment(pro_forma: &ProForma, adjustment: &Adjustment) -> ProForma {
    let mut adjusted = pro_forma.clone();
    let previous = adjusted.value(adjustment.section, &adjustment.key);

    adjusted.section_mut(adjustment.section).insert(
        adjustment.key.clone(),
        Field::Labeled(LabeledField::new(
            Some(adjustment.value),
            &adjustment.unit,
            Label::Confirmed,
            ADJUSTMENT_SOURCE,
        )),
    );

    info!(
        "Adjusted {}.{}: {:?} -> {}",
        adjustment.section.key(),
        adjustment.key,
        previous,
        adjustment.value
    );
    adjusted
}

/// Recognizes the adjustment phrases used in chat ("change cap rate to 5.5", "220 units").
pub struct AdjustmentParser {
    cap_rate: Regex,
    rent: Regex,
    units: Regex,
    hard_cost: Regex,
}

impl AdjustmentParser {
    pub fn new() -> Result<Self> {
        Ok(AdjustmentParser {
            cap_rate: Regex::new(r"cap\s*(?:rate)?\s*(?:to|=|:)?\s*(\d+\.?\d*)")?,
            rent: Regex::new(r"rent\s*(?:to|=|:)?\s*\$?(\d+\.?\d*)")?,
            units: Regex::new(r"(\d+)\s*units?")?,
            hard_cost: Regex::new(r"hard\s*(?:cost)?\s*(?:to|=|:)?\s*\$?(\d+)")?,
        })
    }

    pub fn parse(&self, message: &str) -> Vec<Adjustment> {
        let message = message.to_lowercase();
        let number = |re: &Regex| -> Option<f64> {
            re.captures(&message)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
        };

        let mut adjustments = Vec::new();
        if let Some(v) = number(&self.cap_rate) {
            adjustments.push(Adjustment::exit_cap_rate(v));
        }
        if let Some(v) = number(&self.rent) {
            adjustments.push(Adjustment::monthly_rent(v));
        }
        if let Some(v) = number(&self.units) {
            adjustments.push(Adjustment::unit_count(v));
        }
        if let Some(v) = number(&self.hard_cost) {
            adjustments.push(Adjustment::hard_cost(v));
        }
        adjustments
    }
}

pub fn parse_adjustments(message: &str) -> Result<Vec<Adjustment>> {
    Ok(AdjustmentParser::new()?.parse(message))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentOutcome {
    pub model: ProFormaModel,
    pub changes: Vec<String>,
}

/// Applies every adjustment in order, then reruns the calculator and discrepancy check.
pub fn adjust_model(
    pro_forma: &ProForma,
    adjustments: &[Adjustment],
    assumptions: &ReturnAssumptions,
) -> AdjustmentOutcome {
    let adjusted = adjustments
        .iter()
        .fold(pro_forma.clone(), |pf, adjustment| apply_adjustment(&pf, adjustment));

    AdjustmentOutcome {
        model: ProFormaModel::from_pro_forma(adjusted, assumptions),
        changes: adjustments.iter().map(Adjustment::describe).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_chat_phrases() {
        let parser = AdjustmentParser::new().unwrap();

        assert_eq!(
            parser.parse("Change the cap rate to 5.5"),
            vec![Adjustment::exit_cap_rate(5.5)]
        );
        assert_eq!(parser.parse("set rent to $2.75"), vec![Adjustment::monthly_rent(2.75)]);
        assert_eq!(
            parser.parse("what if we had 220 units instead?"),
            vec![Adjustment::unit_count(220.0)]
        );
        assert_eq!(parser.parse("Hard cost to $310"), vec![Adjustment::hard_cost(310.0)]);
        assert!(parser.parse("make it nicer").is_empty());

        let both = parser.parse("cap 6 and rent 3.1");
        assert_eq!(both, vec![Adjustment::exit_cap_rate(6.0), Adjustment::monthly_rent(3.1)]);
    }

    #[test]
    fn apply_returns_new_confirmed_field() {
        let original: ProForma = serde_json::from_value(json!({
            "return_metrics": {
                "exit_cap_rate_pct": {"value": 5.25, "unit": "%", "label": "estimated", "source": "broker"}
            }
        }))
        .unwrap();

        let adjusted = apply_adjustment(&original, &Adjustment::exit_cap_rate(5.75));
        let field = adjusted
            .field(SectionKind::ReturnMetrics, "exit_cap_rate_pct")
            .and_then(Field::as_labeled)
            .unwrap();
        assert_eq!(field.provenance(), Some(Label::Confirmed));
        assert_eq!(field.source.as_deref(), Some(ADJUSTMENT_SOURCE));
        assert_eq!(adjusted.value(SectionKind::ReturnMetrics, "exit_cap_rate_pct"), Some(5.75));
        assert_eq!(original.value(SectionKind::ReturnMetrics, "exit_cap_rate_pct"), Some(5.25));

        let created = apply_adjustment(&ProForma::default(), &Adjustment::hard_cost(300.0));
        assert_eq!(created.value(SectionKind::CostAssumptions, "hard_cost_psf"), Some(300.0));
    }

    #[test]
    fn adjust_model_recomputes_returns() {
        let pf: ProForma = serde_json::from_value(json!({
            "project_summary": {"unit_count": 200},
            "revenue_assumptions": {"rent_psf_monthly": 1.85},
            "cost_assumptions": {"total_project_cost": 40000000}
        }))
        .unwrap();

        let before = ProFormaModel::from_pro_forma(pf.clone(), &ReturnAssumptions::default());
        let outcome = adjust_model(
            &pf,
            &[Adjustment::unit_count(220.0)],
            &ReturnAssumptions::default(),
        );

        assert_eq!(outcome.changes, vec!["units to 220"]);
        let noi_before = before.calc_results.unwrap().calc_noi.unwrap();
        let noi_after = outcome.model.calc_results.as_ref().unwrap().calc_noi.unwrap();
        assert!((noi_after / noi_before - 1.1).abs() < 1e-9);
    }
}
