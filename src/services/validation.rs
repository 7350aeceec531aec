// src/services/validation.rs
use log::{info, warn};
use serde::Serialize;

use crate::models::{Field, Label, ProForma, SectionKind};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Text,
    Value { nullable: bool },
}

const REQUIRED: Kind = Kind::Value { nullable: false };
const NULLABLE: Kind = Kind::Value { nullable: true };

/// Field schema the pro forma generator is asked to follow.
const SCHEMA: [(SectionKind, &[(&str, Kind)]); 5] = [
    (
        SectionKind::ProjectSummary,
        &[
            ("deal_name", Kind::Text),
            ("market", Kind::Text),
            ("program_type", Kind::Text),
            ("total_gfa_sf", REQUIRED),
            ("unit_count", NULLABLE),
            ("rentable_sf", NULLABLE),
            ("construction_start", REQUIRED),
            ("construction_duration_months", REQUIRED),
            ("total_keys", NULLABLE),
            ("notes", Kind::Text),
        ],
    ),
    (
        SectionKind::RevenueAssumptions,
        &[
            ("rent_psf_monthly", NULLABLE),
            ("rent_psf_annual_nnn", NULLABLE),
            ("adr", NULLABLE),
            ("stabilized_occupancy_pct", REQUIRED),
            ("lease_up_months", REQUIRED),
            ("annual_rent_growth_pct", REQUIRED),
            ("other_income_per_unit_monthly", NULLABLE),
        ],
    ),
    (
        SectionKind::CostAssumptions,
        &[
            ("land_cost_total", REQUIRED),
            ("hard_cost_psf", REQUIRED),
            ("hard_cost_total", REQUIRED),
            ("soft_cost_pct_of_hard", REQUIRED),
            ("soft_cost_total", REQUIRED),
            ("developer_fee_pct", REQUIRED),
            ("developer_fee_total", REQUIRED),
            ("contingency_pct", REQUIRED),
            ("contingency_total", REQUIRED),
            ("total_project_cost", REQUIRED),
        ],
    ),
    (
        SectionKind::FinancingAssumptions,
        &[
            ("construction_loan_ltc_pct", REQUIRED),
            ("construction_loan_amount", REQUIRED),
            ("construction_loan_rate_pct", REQUIRED),
            ("carry_cost_total", REQUIRED),
            ("equity_required", REQUIRED),
            ("lp_equity_pct", REQUIRED),
            ("lp_equity_amount", REQUIRED),
            ("gp_equity_pct", REQUIRED),
            ("gp_equity_amount", REQUIRED),
        ],
    ),
    (
        SectionKind::ReturnMetrics,
        &[
            ("exit_cap_rate_pct", REQUIRED),
            ("exit_year", REQUIRED),
            ("stabilized_noi", REQUIRED),
            ("gross_exit_value", REQUIRED),
            ("net_exit_value", REQUIRED),
            ("total_profit", REQUIRED),
            ("profit_on_cost_pct", REQUIRED),
            ("development_spread_bps", REQUIRED),
            ("project_irr_levered_pct", REQUIRED),
            ("equity_multiple_lp", REQUIRED),
            ("lp_irr_pct", REQUIRED),
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

fn describe(field: &Field) -> &'static str {
    match field {
        Field::Labeled(_) => "object",
        Field::Bare(_) => "number",
        Field::Text(_) => "string",
        Field::Null => "null",
        Field::Other(_) => "unsupported value",
    }
}

fn check_value_field(path: &str, field: Option<&Field>, nullable: bool, errors: &mut Vec<String>) {
    let field = match field {
        None | Some(Field::Null) => {
            if !nullable {
                errors.push(format!("{}: missing field", path));
            }
            return;
        }
        Some(field) => field,
    };

    let labeled = match field.as_labeled() {
        Some(labeled) => labeled,
        None => {
            errors.push(format!("{}: expected labeled field, got {}", path, describe(field)));
            return;
        }
    };

    if labeled.unit.is_none() {
        errors.push(format!("{}: missing 'unit' key", path));
    }
    if labeled.source.is_none() {
        errors.push(format!("{}: missing 'source' key", path));
    }
    match labeled.label.as_deref() {
        None => errors.push(format!("{}: missing 'label' key", path)),
        Some(raw) => match raw.parse::<Label>() {
            Ok(Label::Missing) if labeled.value.is_some() => {
                errors.push(format!("{}: label 'missing' must have a null value", path));
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("{}: {}", path, e)),
        },
    }
}

/// Checks a pro forma against the generator schema. Never fails; problems are listed in the report.
pub fn validate_pro_forma(pro_forma: &ProForma) -> ValidationReport {
    let mut errors: Vec<String> = SectionKind::ALL
        .iter()
        .filter(|kind| pro_forma.section(**kind).is_none())
        .map(|kind| format!("Missing required section: {}", kind.key()))
        .collect();

    if !errors.is_empty() {
        warn!("Pro forma rejected: {}", errors.join("; "));
        return ValidationReport { valid: false, errors };
    }

    for (kind, fields) in SCHEMA.iter() {
        let section = pro_forma.section(*kind);
        for (name, field_kind) in fields.iter() {
            if let Kind::Value { nullable } = field_kind {
                let path = format!("{}.{}", kind.key(), name);
                check_value_field(&path, section.and_then(|s| s.get(name)), *nullable, &mut errors);
            }
        }
    }

    let total_cost_ok = pro_forma
        .field(SectionKind::CostAssumptions, "total_project_cost")
        .and_then(Field::as_labeled)
        .and_then(|f| f.value.as_ref())
        .and_then(|v| v.as_f64())
        .is_some();
    if !total_cost_ok {
        errors.push("cost_assumptions.total_project_cost must have a numeric value".to_string());
    }

    if errors.is_empty() {
        info!("Pro forma passed schema validation");
    } else {
        warn!("Pro forma has {} schema problem(s)", errors.len());
    }

    ValidationReport { valid: errors.is_empty(), errors }
}
