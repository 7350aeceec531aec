// tests/common/mod.rs
#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{Cursor, Read};

/// Multifamily deal in the labeled field shape the generator returns.
pub fn charlotte_multifamily() -> Value {
    json!({
        "project_summary": {
            "deal_name": "Charlotte MF",
            "market": "Charlotte, NC",
            "program_type": "multifamily",
            "total_gfa_sf": {"value": 210000, "unit": "sf", "label": "confirmed", "source": "user-provided"},
            "unit_count": {"value": 200, "unit": "units", "label": "confirmed", "source": "user-provided"},
            "rentable_sf": null,
            "construction_start": {"value": 2026, "unit": "year", "label": "estimated", "source": "market norm"},
            "construction_duration_months": {"value": 18, "unit": "months", "label": "estimated", "source": "market norm"},
            "total_keys": null
        },
        "revenue_assumptions": {
            "rent_psf_monthly": {"value": 1.85, "unit": "$/sf/month", "label": "estimated", "source": "CoStar Q3"},
            "other_income_per_unit_monthly": {"value": 125, "unit": "$/unit/month", "label": "estimated", "source": "market norm"},
            "stabilized_occupancy_pct": {"value": 93, "unit": "%", "label": "estimated", "source": "market norm"},
            "lease_up_months": {"value": 18, "unit": "months", "label": "estimated", "source": "market norm"}
        },
        "cost_assumptions": {
            "land_cost_total": {"value": 8000000, "unit": "$", "label": "confirmed", "source": "LOI"},
            "hard_cost_psf": {"value": 250, "unit": "$/sf", "label": "estimated", "source": "GC budget"},
            "soft_cost_pct_of_hard": {"value": 20, "unit": "%", "label": "estimated", "source": "market norm"},
            "contingency_pct": {"value": 5, "unit": "%", "label": "estimated", "source": "market norm"},
            "total_project_cost": {"value": 74590600, "unit": "$", "label": "calculated", "source": "sum of costs"}
        },
        "financing_assumptions": {
            "construction_loan_amount": {"value": 48483890, "unit": "$", "label": "estimated", "source": "65% LTC"},
            "equity_required": {"value": 26106710, "unit": "$", "label": "calculated", "source": "cost less loan"},
            "lp_equity_pct": {"value": 90, "unit": "%", "label": "estimated", "source": "market norm"},
            "lp_equity_amount": {"value": 23496039, "unit": "$", "label": "calculated", "source": "equity x LP share"}
        },
        "return_metrics": {
            "exit_cap_rate_pct": {"value": 5.25, "unit": "%", "label": "estimated", "source": "broker survey"},
            "exit_year": {"value": 5, "unit": "years", "label": "estimated", "source": "market norm"},
            "project_irr_levered_pct": {"value": 15.5, "unit": "%", "label": "calculated", "source": "model"},
            "equity_multiple_lp": {"value": 1.85, "unit": "x", "label": "calculated", "source": "model"},
            "profit_on_cost_pct": {"value": 12.0, "unit": "%", "label": "calculated", "source": "model"}
        }
    })
}

/// Text of one part of an exported workbook package.
pub fn read_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("workbook is a zip package");
    let mut entry = archive.by_name(name).expect("entry exists");
    let mut text = String::new();
    entry.read_to_string(&mut text).expect("entry is utf-8");
    text
}
