// src/services/live_workbook.rs
//! Workbook whose sheets are linked by formulas back to a single editable Inputs sheet.
//!
//! Sheet order: Inputs, Parcel Analysis, Calculations, Scenarios, Sensitivity, Summary.
//! Every non-input cell wraps its expression in `IFERROR`, so a blank input shows
//! a dash downstream rather than an Excel error.

use anyhow::Result;
use log::info;
use rust_xlsxwriter::{
    Color, ConditionalFormatFormula, Format, FormatAlign, FormatBorder, Worksheet, XlsxError,
};
use std::collections::HashMap;

use crate::config::ReturnAssumptions;
use crate::models::{Field, Label, ProForma, ProFormaModel, SectionKind};
use crate::services::calculations::{
    DEFAULT_CONSTRUCTION_MONTHS, DEFAULT_EXIT_CAP_RATE_PCT, DEFAULT_LEASE_UP_MONTHS,
    DEFAULT_LP_EQUITY_PCT, DEFAULT_OTHER_INCOME_PER_UNIT, STABILIZED_HOLD_YEARS,
    TOTAL_LOSS_IRR_PCT,
};
use crate::services::format::{multiple, percent, PLACEHOLDER};
use crate::services::sensitivity::{CAP_RATE_STEP_PCT, COST_LABELS, NEAR_TARGET_BAND_PCT};
use crate::services::workbook::{
    add_header_row, add_section_header, fill_format, label_fill, metric_format, new_workbook,
    normal_format, note_format, set_column_widths, title_format, FILL_GREEN, FILL_RED,
    FILL_YELLOW,
};

pub const INPUTS: &str = "Inputs";
pub const PARCEL: &str = "Parcel Analysis";
pub const CALCULATIONS: &str = "Calculations";
pub const SCENARIOS: &str = "Scenarios";
pub const SENSITIVITY: &str = "Sensitivity";
pub const SUMMARY: &str = "Summary";

const MONEY: &str = "$#,##0";
const NUMBER: &str = "#,##0.00";
const PCT: &str = "0.00\"%\"";
const MULTIPLE: &str = "0.00\"x\"";

/// (ref name, label, formula, number format) for one formula row.
type FormulaRow = (&'static str, &'static str, String, &'static str);

/// `0` -> `A`, `26` -> `AA`.
pub fn column_letter(col: u16) -> String {
    let mut n = col as u32 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Absolute reference to a cell on another sheet, quoting names with spaces.
pub fn cell_ref(sheet: &str, row: u32, col: u16) -> String {
    let sheet = if sheet.contains(' ') || sheet.contains('&') {
        format!("'{}'", sheet.replace('\'', "''"))
    } else {
        sheet.to_string()
    };
    format!("{}!${}${}", sheet, column_letter(col), row + 1)
}

/// Relative same-sheet reference.
fn local_ref(row: u32, col: u16) -> String {
    format!("{}{}", column_letter(col), row + 1)
}

fn guarded(expr: &str) -> String {
    format!("=IFERROR({},\"{}\")", expr, PLACEHOLDER)
}

/// Named cell addresses, filled in as sheets are laid out.
#[derive(Default)]
struct Refs(HashMap<&'static str, String>);

impl Refs {
    fn set(&mut self, name: &'static str, sheet: &str, row: u32, col: u16) {
        self.0.insert(name, cell_ref(sheet, row, col));
    }

    fn get(&self, name: &str) -> &str {
        // every name is registered by an earlier layout step
        self.0.get(name).map(String::as_str).unwrap_or("NA()")
    }
}

#[derive(Clone, Copy)]
enum Fallback {
    Blank,
    Value(f64),
}

struct InputRow {
    name: &'static str,
    section: SectionKind,
    key: &'static str,
    unit: &'static str,
    fallback: Fallback,
    format: &'static str,
}

const fn input(
    name: &'static str,
    section: SectionKind,
    key: &'static str,
    unit: &'static str,
    fallback: Fallback,
    format: &'static str,
) -> InputRow {
    InputRow { name, section, key, unit, fallback, format }
}

fn project_inputs(assumptions: &ReturnAssumptions) -> Vec<InputRow> {
    use SectionKind::ProjectSummary as S;
    vec![
        input("Unit Count", S, "unit_count", "units", Fallback::Blank, "#,##0"),
        input("Total GFA", S, "total_gfa_sf", "sf", Fallback::Blank, "#,##0"),
        input("Rentable SF", S, "rentable_sf", "sf", Fallback::Blank, "#,##0"),
        input("Hotel Keys", S, "total_keys", "keys", Fallback::Blank, "#,##0"),
        input(
            "Average Unit Size",
            S,
            "avg_unit_size_sf",
            "sf",
            Fallback::Value(assumptions.avg_unit_sf),
            "#,##0",
        ),
        input(
            "Construction Duration",
            S,
            "construction_duration_months",
            "months",
            Fallback::Value(DEFAULT_CONSTRUCTION_MONTHS),
            "0",
        ),
    ]
}

fn revenue_inputs(pf: &ProForma) -> Vec<InputRow> {
    use SectionKind::RevenueAssumptions as R;
    let occupancy = pf.program_type().default_occupancy_pct();
    vec![
        input("Monthly Rent ($/SF)", R, "rent_psf_monthly", "$/sf/month", Fallback::Blank, NUMBER),
        input(
            "Other Income per Unit",
            R,
            "other_income_per_unit_monthly",
            "$/unit/month",
            Fallback::Value(DEFAULT_OTHER_INCOME_PER_UNIT),
            NUMBER,
        ),
        input(
            "Annual Rent NNN ($/SF)",
            R,
            "rent_psf_annual_nnn",
            "$/sf/year",
            Fallback::Blank,
            NUMBER,
        ),
        input("ADR (Hotel)", R, "adr", "$", Fallback::Blank, NUMBER),
        input(
            "Stabilized Occupancy",
            R,
            "stabilized_occupancy_pct",
            "%",
            Fallback::Value(occupancy),
            PCT,
        ),
        input(
            "Lease-Up Period",
            R,
            "lease_up_months",
            "months",
            Fallback::Value(DEFAULT_LEASE_UP_MONTHS),
            "0",
        ),
    ]
}

fn cost_inputs() -> Vec<InputRow> {
    use SectionKind::CostAssumptions as C;
    vec![
        input("Land Cost (Total)", C, "land_cost_total", "$", Fallback::Blank, MONEY),
        input("Hard Cost ($/SF)", C, "hard_cost_psf", "$/sf", Fallback::Blank, NUMBER),
        input("Soft Cost (% of Hard)", C, "soft_cost_pct_of_hard", "%", Fallback::Blank, PCT),
        input("Contingency (%)", C, "contingency_pct", "%", Fallback::Blank, PCT),
        input("Total Project Cost", C, "total_project_cost", "$", Fallback::Blank, MONEY),
    ]
}

fn financing_inputs() -> Vec<InputRow> {
    use SectionKind::FinancingAssumptions as F;
    vec![
        input(
            "Construction Loan Amount",
            F,
            "construction_loan_amount",
            "$",
            Fallback::Blank,
            MONEY,
        ),
        input("Total Equity Required", F, "equity_required", "$", Fallback::Blank, MONEY),
        input(
            "LP Equity (%)",
            F,
            "lp_equity_pct",
            "%",
            Fallback::Value(DEFAULT_LP_EQUITY_PCT),
            PCT,
        ),
        input("LP Equity ($)", F, "lp_equity_amount", "$", Fallback::Blank, MONEY),
    ]
}

fn return_inputs() -> Vec<InputRow> {
    use SectionKind::ReturnMetrics as M;
    vec![
        input("Stated Stabilized NOI", M, "stabilized_noi", "$", Fallback::Blank, MONEY),
        input(
            "Exit Cap Rate",
            M,
            "exit_cap_rate_pct",
            "%",
            Fallback::Value(DEFAULT_EXIT_CAP_RATE_PCT),
            PCT,
        ),
        input("Exit Year", M, "exit_year", "years", Fallback::Blank, "0"),
    ]
}

fn lookup<'a>(pf: &'a ProForma, item: &InputRow) -> Option<&'a Field> {
    let field = pf.field(item.section, item.key);
    if item.key == "avg_unit_size_sf" {
        // the calculator reads this from either section
        return pf.field(SectionKind::RevenueAssumptions, item.key).or(field);
    }
    field
}

fn write_input_row(
    ws: &mut Worksheet,
    row: u32,
    pf: &ProForma,
    item: &InputRow,
) -> Result<(), XlsxError> {
    let field = lookup(pf, item);
    let value = field.and_then(Field::number);
    let labeled = field.and_then(Field::as_labeled);

    let (label, source) = match (value, field, item.fallback) {
        (Some(_), Some(Field::Bare(_)), _) => (Label::Confirmed, String::new()),
        (Some(_), _, _) => (
            labeled.and_then(|l| l.provenance()).unwrap_or(Label::Estimated),
            labeled.and_then(|l| l.source.clone()).unwrap_or_default(),
        ),
        (None, _, Fallback::Value(_)) => (Label::Missing, "calculator default".to_string()),
        (None, _, Fallback::Blank) => (Label::Missing, "not provided".to_string()),
    };
    let unit = labeled
        .and_then(|l| l.unit.clone())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| item.unit.to_string());

    let format = fill_format(label_fill(Some(label)));
    let value_format = format.clone().set_num_format(item.format).set_align(FormatAlign::Right);

    ws.write_string_with_format(row, 0, item.name, &format)?;
    match (value, item.fallback) {
        (Some(v), _) | (None, Fallback::Value(v)) => {
            ws.write_number_with_format(row, 1, v, &value_format)?;
        }
        (None, Fallback::Blank) => {
            ws.write_blank(row, 1, &value_format)?;
        }
    }
    ws.write_string_with_format(row, 2, unit, &format)?;
    ws.write_string_with_format(row, 3, label.as_str(), &format)?;
    ws.write_string_with_format(row, 4, source, &format)?;
    Ok(())
}

fn write_constant_row(
    ws: &mut Worksheet,
    row: u32,
    name: &str,
    value: f64,
    unit: &str,
    num_format: &str,
    source: &str,
) -> Result<(), XlsxError> {
    let format = fill_format(label_fill(Some(Label::Estimated)));
    ws.write_string_with_format(row, 0, name, &format)?;
    let value_format = format
        .clone()
        .set_num_format(num_format)
        .set_align(FormatAlign::Right);
    ws.write_number_with_format(row, 1, value, &value_format)?;
    ws.write_string_with_format(row, 2, unit, &format)?;
    ws.write_string_with_format(row, 3, Label::Estimated.as_str(), &format)?;
    ws.write_string_with_format(row, 4, source, &format)?;
    Ok(())
}

/// Target LP IRR driving the Sensitivity grid colors; blank leaves the grid uncolored.
fn write_target_row(
    ws: &mut Worksheet,
    row: u32,
    target_irr: Option<f64>,
) -> Result<(), XlsxError> {
    let target_irr = target_irr.filter(|t| t.is_finite() && *t != 0.0);
    let (label, source) = match target_irr {
        Some(_) => (Label::Confirmed, "sensitivity request"),
        None => (Label::Missing, "enter a target to color the sensitivity grid"),
    };
    let format = fill_format(label_fill(Some(label)));
    let value_format = format.clone().set_num_format(PCT).set_align(FormatAlign::Right);

    ws.write_string_with_format(row, 0, "Target LP IRR", &format)?;
    match target_irr {
        Some(target) => ws.write_number_with_format(row, 1, target, &value_format)?,
        None => ws.write_blank(row, 1, &value_format)?,
    };
    ws.write_string_with_format(row, 2, "%", &format)?;
    ws.write_string_with_format(row, 3, label.as_str(), &format)?;
    ws.write_string_with_format(row, 4, source, &format)?;
    Ok(())
}

fn build_inputs_sheet(
    pf: &ProForma,
    title: &str,
    target_irr: Option<f64>,
    assumptions: &ReturnAssumptions,
    refs: &mut Refs,
) -> Result<Worksheet, XlsxError> {
    let mut ws = Worksheet::new();
    ws.set_name(INPUTS)?;
    set_column_widths(&mut ws)?;

    ws.write_string_with_format(0, 0, title, &title_format())?;
    ws.write_string_with_format(
        1,
        0,
        "Edit values in column B; every other sheet recalculates from this one.",
        &Format::new().set_italic().set_font_size(10),
    )?;
    let mut row = add_header_row(&mut ws, 3, &["Input", "Value", "Unit", "Label", "Source"])?;

    row = add_section_header(&mut ws, row, "PROJECT")?;
    let program = pf.summary_text("program_type").unwrap_or("multifamily");
    let program_label = if pf.summary_text("program_type").is_some() {
        Label::Confirmed
    } else {
        Label::Missing
    };
    let format = fill_format(label_fill(Some(program_label)));
    ws.write_string_with_format(row, 0, "Program Type", &format)?;
    ws.write_string_with_format(row, 1, program, &format.clone().set_align(FormatAlign::Right))?;
    ws.write_blank(row, 2, &format)?;
    ws.write_string_with_format(row, 3, program_label.as_str(), &format)?;
    ws.write_string_with_format(row, 4, "multifamily, condo, office or hotel", &format)?;
    refs.set("program_type", INPUTS, row, 1);
    row += 1;

    let groups: [(&str, Vec<InputRow>); 5] = [
        ("", project_inputs(assumptions)),
        ("REVENUE", revenue_inputs(pf)),
        ("COSTS", cost_inputs()),
        ("FINANCING", financing_inputs()),
        ("EXIT", return_inputs()),
    ];
    for (title, items) in groups.iter() {
        if !title.is_empty() {
            row = add_section_header(&mut ws, row, title)?;
        }
        for item in items {
            write_input_row(&mut ws, row, pf, item)?;
            refs.set(item.key, INPUTS, row, 1);
            row += 1;
        }
    }
    write_target_row(&mut ws, row, target_irr)?;
    refs.set("target_irr", INPUTS, row, 1);
    row += 1;

    row = add_section_header(&mut ws, row, "MODEL CONSTANTS")?;
    let constants: [(&'static str, &str, f64, &str, &str); 6] = [
        (
            "opex_ratio",
            "Operating Expense Ratio (Residential)",
            assumptions.opex_ratio,
            "of EGI",
            "0.00",
        ),
        (
            "hotel_noi_margin",
            "Hotel NOI Margin",
            assumptions.hotel_noi_margin,
            "of revenue",
            "0.00",
        ),
        ("sale_cost_pct", "Sale Costs", assumptions.sale_cost_pct, "% of exit", PCT),
        (
            "promote_haircut",
            "GP Promote Haircut on LP Profit",
            assumptions.promote_haircut,
            "of LP profit",
            "0.00",
        ),
        ("cap_rate_step", "Sensitivity Cap Rate Step", CAP_RATE_STEP_PCT, "pp", "0.00"),
        ("cost_step_pct", "Sensitivity Cost Step", 10.0, "%", PCT),
    ];
    for (key, name, value, unit, num_format) in constants {
        write_constant_row(&mut ws, row, name, value, unit, num_format, "calculator assumption")?;
        refs.set(key, INPUTS, row, 1);
        row += 1;
    }

    Ok(ws)
}

/// Label / formula / unit rows; registers each row's value cell under its name.
fn write_formula_rows(
    ws: &mut Worksheet,
    sheet: &str,
    mut row: u32,
    rows: &[FormulaRow],
    refs: &mut Refs,
) -> Result<u32, XlsxError> {
    let label_format = normal_format().set_border(FormatBorder::Thin);
    for (name, label, formula, num_format) in rows {
        let value_format = normal_format()
            .set_border(FormatBorder::Thin)
            .set_num_format(*num_format)
            .set_align(FormatAlign::Right);
        ws.write_string_with_format(row, 0, *label, &label_format)?;
        ws.write_formula_with_format(row, 1, formula.as_str(), &value_format)?;
        refs.set(*name, sheet, row, 1);
        row += 1;
    }
    Ok(row)
}

fn build_parcel_sheet(refs: &mut Refs) -> Result<Worksheet, XlsxError> {
    let mut ws = Worksheet::new();
    ws.set_name(PARCEL)?;
    set_column_widths(&mut ws)?;
    ws.write_string_with_format(0, 0, "Parcel & Cost Build-Up", &title_format())?;
    let row = add_header_row(&mut ws, 2, &["Item", "Value"])?;

    let land = refs.get("land_cost_total").to_string();
    let gfa = refs.get("total_gfa_sf").to_string();
    let units = refs.get("unit_count").to_string();
    let hard_psf = refs.get("hard_cost_psf").to_string();
    let soft_pct = refs.get("soft_cost_pct_of_hard").to_string();
    let contingency_pct = refs.get("contingency_pct").to_string();
    let tpc = refs.get("total_project_cost").to_string();
    let noi = cell_ref(CALCULATIONS, CALC_NOI_ROW, 1);

    let hard_total = local_ref(row + 5, 1);
    let soft_total = local_ref(row + 6, 1);
    let contingency_total = local_ref(row + 7, 1);

    let rows = [
        ("parcel_land", "Land Cost (Total)", guarded(&land), MONEY),
        ("parcel_gfa", "Total GFA", guarded(&gfa), "#,##0"),
        ("parcel_units", "Unit Count", guarded(&units), "#,##0"),
        ("land_per_sf", "Land Cost per GFA SF", guarded(&format!("{}/{}", land, gfa)), NUMBER),
        ("land_per_unit", "Land Cost per Unit", guarded(&format!("{}/{}", land, units)), MONEY),
        ("hard_total", "Hard Cost (Total)", guarded(&format!("{}*{}", hard_psf, gfa)), MONEY),
        (
            "soft_total",
            "Soft Cost (Total)",
            guarded(&format!("{}*{}/100", hard_total, soft_pct)),
            MONEY,
        ),
        (
            "contingency_total",
            "Contingency (Total)",
            guarded(&format!("{}*{}/100", hard_total, contingency_pct)),
            MONEY,
        ),
        (
            "build_up",
            "Cost Build-Up (ex. fees & carry)",
            guarded(&format!("{}+{}+{}+{}", land, hard_total, soft_total, contingency_total)),
            MONEY,
        ),
        ("parcel_tpc", "Total Project Cost", guarded(&tpc), MONEY),
        ("land_share", "Land Share of Cost", guarded(&format!("{}/{}*100", land, tpc)), PCT),
        ("cost_per_sf", "Total Cost per GFA SF", guarded(&format!("{}/{}", tpc, gfa)), NUMBER),
        ("yield_on_cost", "Yield on Cost", guarded(&format!("{}/{}*100", noi, tpc)), PCT),
    ];
    write_formula_rows(&mut ws, PARCEL, row, &rows, refs)?;
    Ok(ws)
}

/// Row of the stabilized NOI on the Calculations sheet (referenced before that sheet is built).
const CALC_FIRST_ROW: u32 = 3;
const CALC_NOI_ROW: u32 = CALC_FIRST_ROW + 9;

fn build_calculations_sheet(refs: &mut Refs) -> Result<Worksheet, XlsxError> {
    let mut ws = Worksheet::new();
    ws.set_name(CALCULATIONS)?;
    set_column_widths(&mut ws)?;
    ws.write_string_with_format(0, 0, "Return Calculations", &title_format())?;
    let first = add_header_row(&mut ws, 2, &["Metric", "Value"])?;
    debug_assert_eq!(first, CALC_FIRST_ROW);

    let rows = calculation_rows(refs, first);
    write_formula_rows(&mut ws, CALCULATIONS, first, &rows, refs)?;
    Ok(ws)
}

/// NOI, exit and LP return chain, one row per metric starting at `first`.
fn calculation_rows(refs: &Refs, first: u32) -> Vec<FormulaRow> {
    let r = |name: &str| refs.get(name).to_string();
    let at = |offset: u32| local_ref(first + offset, 1);

    let program = at(0);
    let gpr = at(1);
    let other = at(2);
    let egi = at(3);
    let resi_noi = at(4);
    let office_noi = at(5);
    let revpar = at(6);
    let hotel_revenue = at(7);
    let hotel_noi = at(8);
    let noi = at(9);
    let gross_exit = at(10);
    let sale_costs = at(11);
    let net_exit = at(12);
    let profit = at(13);
    let hold = at(15);
    let lp_share = at(16);
    let lp_total = at(17);
    let multiple_cell = at(18);

    let occupancy = r("stabilized_occupancy_pct");
    let units = r("unit_count");
    let lp_equity = r("lp_equity_amount");
    let tpc = r("total_project_cost");
    let cap = r("exit_cap_rate_pct");

    vec![
        (
            "calc_program",
            "Program Type",
            format!(
                "=IF(TRIM({p})=\"\",\"multifamily\",LOWER(TRIM({p})))",
                p = r("program_type")
            ),
            "@",
        ),
        (
            "calc_gpr",
            "Gross Potential Rent",
            guarded(&format!(
                "IF(AND(N({rent})>0,N({units})>0),{rent}*{units}*{avg}*12,NA())",
                rent = r("rent_psf_monthly"),
                units = units,
                avg = r("avg_unit_size_sf"),
            )),
            MONEY,
        ),
        (
            "calc_other_income",
            "Other Income",
            guarded(&format!(
                "IF(N({units})>0,N({other})*{units}*12,NA())",
                units = units,
                other = r("other_income_per_unit_monthly"),
            )),
            MONEY,
        ),
        (
            "calc_egi",
            "Effective Gross Income",
            guarded(&format!("({}+{})*{}/100", gpr, other, occupancy)),
            MONEY,
        ),
        (
            "calc_resi_noi",
            "Residential NOI",
            guarded(&format!("{}*(1-{})", egi, r("opex_ratio"))),
            MONEY,
        ),
        (
            "calc_office_noi",
            "Office NOI (NNN)",
            guarded(&format!(
                "IF(AND(N({rent})>0,N({rsf})>0),{rent}*{rsf}*{occ}/100,NA())",
                rent = r("rent_psf_annual_nnn"),
                rsf = r("rentable_sf"),
                occ = occupancy,
            )),
            MONEY,
        ),
        (
            "calc_revpar",
            "RevPAR",
            guarded(&format!(
                "IF(N({adr})>0,{adr}*{occ}/100,NA())",
                adr = r("adr"),
                occ = occupancy
            )),
            NUMBER,
        ),
        (
            "calc_hotel_revenue",
            "Hotel Gross Revenue",
            guarded(&format!(
                "IF(N({keys})>0,{revpar}*{keys}*365,NA())",
                keys = r("total_keys"),
                revpar = revpar
            )),
            MONEY,
        ),
        (
            "calc_hotel_noi",
            "Hotel NOI",
            guarded(&format!("{}*{}", hotel_revenue, r("hotel_noi_margin"))),
            MONEY,
        ),
        (
            "calc_noi",
            "Stabilized NOI",
            guarded(&format!(
                concat!(
                    "IF(ISNUMBER({stated}),{stated},",
                    "IF(OR({p}=\"multifamily\",{p}=\"condo\"),{resi},",
                    "IF({p}=\"office\",{office},",
                    "IF({p}=\"hotel\",{hotel},NA()))))"
                ),
                stated = r("stabilized_noi"),
                p = program,
                resi = resi_noi,
                office = office_noi,
                hotel = hotel_noi,
            )),
            MONEY,
        ),
        (
            "calc_gross_exit",
            "Gross Exit Value",
            guarded(&format!(
                "IF(AND({noi}<>0,{cap}>0),{noi}/({cap}/100),NA())",
                noi = noi,
                cap = cap
            )),
            MONEY,
        ),
        (
            "calc_sale_costs",
            "Sale Costs",
            guarded(&format!("{}*{}/100", gross_exit, r("sale_cost_pct"))),
            MONEY,
        ),
        (
            "calc_net_exit",
            "Net Exit Value",
            guarded(&format!("{}-{}", gross_exit, sale_costs)),
            MONEY,
        ),
        (
            "calc_profit",
            "Total Profit",
            guarded(&format!(
                "IF(N({tpc})<>0,{net}-{tpc},NA())",
                tpc = tpc,
                net = net_exit
            )),
            MONEY,
        ),
        (
            "calc_poc",
            "Profit on Cost",
            guarded(&format!(
                "IF({profit}<>0,{profit}/{tpc}*100,NA())",
                profit = profit,
                tpc = tpc
            )),
            PCT,
        ),
        (
            "calc_hold",
            "Hold Period (years)",
            guarded(&format!(
                "IF(N({exit})<>0,{exit},({months}+{lease})/12+{stab})",
                exit = r("exit_year"),
                months = r("construction_duration_months"),
                lease = r("lease_up_months"),
                stab = STABILIZED_HOLD_YEARS,
            )),
            "0.00",
        ),
        (
            "calc_lp_share",
            "LP Profit Share (after promote)",
            guarded(&format!(
                concat!(
                    "IF(AND(N({lp})>0,N({equity})<>0,{profit}<>0),",
                    "{profit}*{pct}/100*(1-{haircut}),NA())"
                ),
                lp = lp_equity,
                equity = r("equity_required"),
                profit = profit,
                pct = r("lp_equity_pct"),
                haircut = r("promote_haircut"),
            )),
            MONEY,
        ),
        (
            "calc_lp_total",
            "LP Total Return",
            guarded(&format!("{}+{}", lp_equity, lp_share)),
            MONEY,
        ),
        (
            "calc_multiple",
            "Equity Multiple (approx.)",
            guarded(&format!("{}/{}", lp_total, lp_equity)),
            MULTIPLE,
        ),
        (
            "calc_irr",
            "IRR (approx.)",
            guarded(&format!(
                "IF({m}<=0,{loss},IF({hold}>0,({m}^(1/{hold})-1)*100,NA()))",
                m = multiple_cell,
                hold = hold,
                loss = TOTAL_LOSS_IRR_PCT,
            )),
            PCT,
        ),
    ]
}

/// Exit-cap/cost scenario columns: Downside, Base, Upside.
fn build_scenarios_sheet(refs: &mut Refs) -> Result<Worksheet, XlsxError> {
    let mut ws = Worksheet::new();
    ws.set_name(SCENARIOS)?;
    set_column_widths(&mut ws)?;
    ws.write_string_with_format(0, 0, "Scenarios", &title_format())?;
    let first = add_header_row(&mut ws, 2, &["Metric", "Downside", "Base", "Upside"])?;

    let r = |name: &str| refs.get(name).to_string();
    let cap = r("exit_cap_rate_pct");
    let cap_step = r("cap_rate_step");
    let cost_step = r("cost_step_pct");
    let loan = r("construction_loan_amount");
    let lp_pct = r("lp_equity_pct");
    let noi = r("calc_noi");
    let hold = r("calc_hold");

    // (cap sign, cost sign) per column
    let columns: [(&str, &str); 3] = [("+", "+"), ("", ""), ("-", "-")];
    let labels = [
        ("Exit Cap Rate", PCT),
        ("Construction Cost Factor", "0.00"),
        ("Total Project Cost", MONEY),
        ("Equity Required", MONEY),
        ("LP Equity", MONEY),
        ("Gross Exit Value", MONEY),
        ("Net Exit Value", MONEY),
        ("Total Profit", MONEY),
        ("Profit on Cost", PCT),
        ("Equity Multiple (approx.)", MULTIPLE),
        ("IRR (approx.)", PCT),
    ];

    let label_format = normal_format().set_border(FormatBorder::Thin);
    for (i, (label, _)) in labels.iter().enumerate() {
        ws.write_string_with_format(first + i as u32, 0, *label, &label_format)?;
    }

    for (c, (cap_sign, cost_sign)) in columns.iter().enumerate() {
        let col = c as u16 + 1;
        let at = |offset: u32| local_ref(first + offset, col);
        let (cap_cell, factor, tpc, equity, lp_equity, gross, net, profit, multiple_cell) =
            (at(0), at(1), at(2), at(3), at(4), at(5), at(6), at(7), at(9));

        let cap_formula = if cap_sign.is_empty() {
            guarded(&cap)
        } else {
            guarded(&format!("{}{}{}", cap, cap_sign, cap_step))
        };
        let factor_formula = if cost_sign.is_empty() {
            "=1".to_string()
        } else {
            format!("=1{}{}/100", cost_sign, cost_step)
        };

        let formulas = [
            cap_formula,
            factor_formula,
            guarded(&format!("{}*{}", r("total_project_cost"), factor)),
            guarded(&format!(
                "IF(N({loan})<>0,{tpc}-{loan},{eq})",
                loan = loan,
                tpc = tpc,
                eq = r("equity_required")
            )),
            guarded(&format!(
                "IF(N({loan})<>0,{equity}*{pct}/100,{lp})",
                loan = loan,
                equity = equity,
                pct = lp_pct,
                lp = r("lp_equity_amount")
            )),
            guarded(&format!(
                "IF(AND({noi}<>0,{cap}>0),{noi}/({cap}/100),NA())",
                noi = noi,
                cap = cap_cell
            )),
            guarded(&format!("{}*(1-{}/100)", gross, r("sale_cost_pct"))),
            guarded(&format!("{}-{}", net, tpc)),
            guarded(&format!("IF({p}<>0,{p}/{t}*100,NA())", p = profit, t = tpc)),
            guarded(&format!(
                "IF(AND(N({lp})>0,{p}<>0),({lp}+{p}*{pct}/100*(1-{h}))/{lp},NA())",
                lp = lp_equity,
                p = profit,
                pct = lp_pct,
                h = r("promote_haircut"),
            )),
            guarded(&format!(
                "IF({m}<=0,{loss},IF({hold}>0,({m}^(1/{hold})-1)*100,NA()))",
                m = multiple_cell,
                hold = hold,
                loss = TOTAL_LOSS_IRR_PCT,
            )),
        ];

        for (i, formula) in formulas.iter().enumerate() {
            let format = normal_format()
                .set_border(FormatBorder::Thin)
                .set_num_format(labels[i].1)
                .set_align(FormatAlign::Right);
            ws.write_formula_with_format(first + i as u32, col, formula.as_str(), &format)?;
        }
    }

    refs.set("scenario_base_irr", SCENARIOS, first + 10, 2);
    refs.set("scenario_downside_irr", SCENARIOS, first + 10, 1);
    refs.set("scenario_upside_irr", SCENARIOS, first + 10, 3);
    Ok(ws)
}

const SENS_HEADER_ROW: u32 = 2;
const SENS_FACTOR_ROW: u32 = 3;
const SENS_GRID_ROW: u32 = 4;
const SENS_WORKINGS_ROW: u32 = SENS_GRID_ROW + 6;
const SENS_TPC_ROW: u32 = SENS_WORKINGS_ROW + 1;
const SENS_LP_ROW: u32 = SENS_WORKINGS_ROW + 2;
const SENS_NET_HEADER_ROW: u32 = SENS_WORKINGS_ROW + 4;
const SENS_NET_FIRST_ROW: u32 = SENS_NET_HEADER_ROW + 1;

/// Rounded LP IRR for cap rate `i` and cost column `j`, from the workings below the grid.
fn sensitivity_cell_formula(refs: &Refs, i: u32, j: u16) -> String {
    let col = j + 1;
    let net = local_ref(SENS_NET_FIRST_ROW + i, 1);
    let tpc = local_ref(SENS_TPC_ROW, col);
    let lp = local_ref(SENS_LP_ROW, col);
    let multiple_expr = format!(
        "(({lp}+({net}-{tpc})*{pct}/100*(1-{h}))/{lp})",
        lp = lp,
        net = net,
        tpc = tpc,
        pct = refs.get("lp_equity_pct"),
        h = refs.get("promote_haircut"),
    );
    guarded(&format!(
        "IF(({net}-{tpc})=0,NA(),ROUND(IF({m}<=0,{loss},({m}^(1/{hold})-1)*100),1))",
        net = net,
        tpc = tpc,
        m = multiple_expr,
        hold = refs.get("calc_hold"),
        loss = TOTAL_LOSS_IRR_PCT,
    ))
}

/// Green / yellow / red rules for the grid, relative to its top-left cell.
/// A blank or zero target leaves every cell uncolored.
fn sensitivity_color_rules(refs: &Refs) -> [(u32, String); 3] {
    let cell = local_ref(SENS_GRID_ROW, 1);
    let target = refs.get("target_irr");
    let has_target = format!("ISNUMBER({}),N({})<>0", cell, target);
    [
        (FILL_GREEN, format!("=AND({},{}>={})", has_target, cell, target)),
        (
            FILL_YELLOW,
            format!(
                "=AND({h},{c}<{t},{c}>={t}-{band})",
                h = has_target,
                c = cell,
                t = target,
                band = NEAR_TARGET_BAND_PCT
            ),
        ),
        (
            FILL_RED,
            format!("=AND({},{}<{}-{})", has_target, cell, target, NEAR_TARGET_BAND_PCT),
        ),
    ]
}

fn build_sensitivity_sheet(refs: &Refs) -> Result<Worksheet, XlsxError> {
    let mut ws = Worksheet::new();
    ws.set_name(SENSITIVITY)?;
    set_column_widths(&mut ws)?;
    ws.merge_range(
        0,
        0,
        0,
        4,
        "Sensitivity Analysis: Levered IRR (%) by Exit Cap Rate and Construction Cost",
        &title_format(),
    )?;

    let r = |name: &str| refs.get(name).to_string();
    let header = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let right_bold = Format::new()
        .set_bold()
        .set_align(FormatAlign::Right)
        .set_border(FormatBorder::Thin);

    ws.write_string_with_format(
        SENS_HEADER_ROW,
        0,
        "Exit Cap Rate \\ Construction Cost",
        &right_bold,
    )?;
    ws.write_string_with_format(SENS_FACTOR_ROW, 0, "Cost Factor", &right_bold)?;
    let cost_step = r("cost_step_pct");
    let factor_format = header.clone().set_num_format("0.00");
    for (j, label) in COST_LABELS.iter().enumerate() {
        let col = j as u16 + 1;
        ws.write_string_with_format(SENS_HEADER_ROW, col, *label, &header)?;
        let factor = match j {
            0 => format!("=1-{}/100", cost_step),
            1 => "=1".to_string(),
            _ => format!("=1+{}/100", cost_step),
        };
        ws.write_formula_with_format(SENS_FACTOR_ROW, col, factor.as_str(), &factor_format)?;
    }

    let cap = r("exit_cap_rate_pct");
    let cap_step = r("cap_rate_step");
    let cap_format = right_bold.clone().set_num_format(PCT);
    for i in 0..3u32 {
        let cap_formula = match i {
            0 => guarded(&format!("{}-{}", cap, cap_step)),
            1 => guarded(&cap),
            _ => guarded(&format!("{}+{}", cap, cap_step)),
        };
        ws.write_formula_with_format(SENS_GRID_ROW + i, 0, cap_formula.as_str(), &cap_format)?;
    }

    for i in 0..3u32 {
        for j in 0..3u16 {
            let mut format = Format::new()
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin)
                .set_num_format("0.0\"%\"");
            if i == 1 && j == 1 {
                format = format.set_bold();
            }
            let formula = sensitivity_cell_formula(refs, i, j);
            ws.write_formula_with_format(SENS_GRID_ROW + i, j + 1, formula.as_str(), &format)?;
        }
    }

    // colors track the Target LP IRR input rather than the exported values
    for (fill, rule) in sensitivity_color_rules(refs) {
        let rule_format = Format::new().set_background_color(Color::RGB(fill));
        let conditional = ConditionalFormatFormula::new()
            .set_rule(rule.as_str())
            .set_format(&rule_format);
        ws.add_conditional_format(SENS_GRID_ROW, 1, SENS_GRID_ROW + 2, 3, &conditional)?;
    }

    let legend_row = SENS_GRID_ROW + 4;
    ws.write_string_with_format(legend_row, 0, "Legend:", &normal_format())?;
    for (col, (fill, label)) in [
        (FILL_GREEN, "Meets target IRR (Inputs)"),
        (FILL_YELLOW, "Within 200bps of target"),
        (FILL_RED, "Below target"),
    ]
    .iter()
    .enumerate()
    {
        ws.write_string_with_format(legend_row, col as u16 + 1, *label, &fill_format(*fill))?;
    }

    add_section_header(&mut ws, SENS_WORKINGS_ROW, "WORKINGS")?;
    let label_format = normal_format().set_border(FormatBorder::Thin);
    let money = normal_format()
        .set_border(FormatBorder::Thin)
        .set_num_format(MONEY);
    ws.write_string_with_format(SENS_TPC_ROW, 0, "Scenario Total Project Cost", &label_format)?;
    ws.write_string_with_format(SENS_LP_ROW, 0, "Scenario LP Equity", &label_format)?;
    let loan = r("construction_loan_amount");
    let lp_pct = r("lp_equity_pct");
    for j in 0..3u16 {
        let col = j + 1;
        let factor = local_ref(SENS_FACTOR_ROW, col);
        let tpc = local_ref(SENS_TPC_ROW, col);
        ws.write_formula_with_format(
            SENS_TPC_ROW,
            col,
            guarded(&format!("{}*{}", r("total_project_cost"), factor)).as_str(),
            &money,
        )?;
        ws.write_formula_with_format(
            SENS_LP_ROW,
            col,
            guarded(&format!(
                "IF(N({loan})<>0,({tpc}-{loan})*{pct}/100,{lp})",
                loan = loan,
                tpc = tpc,
                pct = lp_pct,
                lp = r("lp_equity_amount")
            ))
            .as_str(),
            &money,
        )?;
    }

    ws.write_string_with_format(
        SENS_NET_HEADER_ROW,
        0,
        "Net Exit Value by Cap Rate",
        &right_bold,
    )?;
    let noi = r("calc_noi");
    let cap_label_format = label_format.clone().set_num_format(PCT);
    for i in 0..3u32 {
        let row = SENS_NET_FIRST_ROW + i;
        let cap_cell = local_ref(SENS_GRID_ROW + i, 0);
        ws.write_formula_with_format(
            row,
            0,
            format!("={}", cap_cell).as_str(),
            &cap_label_format,
        )?;
        ws.write_formula_with_format(
            row,
            1,
            guarded(&format!(
                "IF(AND({noi}<>0,{cap}>0),{noi}/({cap}/100)*(1-{sale}/100),NA())",
                noi = noi,
                cap = cap_cell,
                sale = r("sale_cost_pct")
            ))
            .as_str(),
            &money,
        )?;
    }

    Ok(ws)
}

fn build_summary_sheet(
    model: &ProFormaModel,
    title: &str,
    refs: &Refs,
) -> Result<Worksheet, XlsxError> {
    let mut ws = Worksheet::new();
    ws.set_name(SUMMARY)?;
    set_column_widths(&mut ws)?;
    let pf = &model.pro_forma;

    ws.write_string_with_format(0, 0, title, &title_format())?;
    let mut row = 2;
    row = add_section_header(&mut ws, row, "LIVE MODEL (recalculates from Inputs)")?;

    let metric = metric_format();
    let metrics = [
        ("IRR (approx.)", format!("={}", refs.get("calc_irr")), PCT),
        ("Equity Multiple (approx.)", format!("={}", refs.get("calc_multiple")), MULTIPLE),
        ("Profit on Cost", format!("={}", refs.get("calc_poc")), PCT),
        ("Total Project Cost", guarded(refs.get("total_project_cost")), MONEY),
        ("Stabilized NOI", format!("={}", refs.get("calc_noi")), MONEY),
        ("Net Exit Value", format!("={}", refs.get("calc_net_exit")), MONEY),
        ("Downside IRR (cap +, cost +)", format!("={}", refs.get("scenario_downside_irr")), PCT),
        ("Upside IRR (cap -, cost -)", format!("={}", refs.get("scenario_upside_irr")), PCT),
    ];
    for (label, formula, num_format) in metrics.iter() {
        ws.write_string_with_format(row, 0, *label, &metric)?;
        ws.write_formula_with_format(
            row,
            1,
            formula.as_str(),
            &metric.clone().set_num_format(*num_format).set_align(FormatAlign::Right),
        )?;
        row += 1;
    }
    row += 1;

    row = add_section_header(&mut ws, row, "AS GENERATED")?;
    let normal = normal_format();
    let right = normal_format().set_align(FormatAlign::Right);
    let stated_metric = |key: &str| pf.value(SectionKind::ReturnMetrics, key);
    let stated = [
        ("Levered LP IRR", percent(stated_metric("project_irr_levered_pct"))),
        ("LP Equity Multiple", multiple(stated_metric("equity_multiple_lp"))),
        ("Profit on Cost", percent(stated_metric("profit_on_cost_pct"))),
    ];
    for (label, value) in stated {
        ws.write_string_with_format(row, 0, label, &normal)?;
        ws.write_string_with_format(row, 1, value, &right)?;
        row += 1;
    }

    if !model.warnings.is_empty() {
        row += 1;
        row = add_section_header(&mut ws, row, "WARNINGS")?;
        let warning = normal_format().set_background_color(Color::RGB(FILL_YELLOW));
        for text in &model.warnings {
            ws.write_string_with_format(row, 0, text, &warning)?;
            row += 1;
        }
    }

    row += 1;
    ws.merge_range(
        row,
        0,
        row,
        4,
        "Yellow = confirmed, blue = estimated, red = missing. Verify estimated inputs with your broker.",
        &note_format(),
    )?;
    Ok(ws)
}

/// Live-formula workbook: only the Inputs sheet holds numbers, everything else links back to it.
pub fn export_live_model(
    model: &ProFormaModel,
    deal_name: &str,
    assumptions: &ReturnAssumptions,
) -> Result<Vec<u8>> {
    let title = model.pro_forma.deal_name().unwrap_or(deal_name);
    let target_irr = model.sensitivity.as_ref().and_then(|t| t.target_irr);
    let mut workbook = new_workbook(deal_name);
    let mut refs = Refs::default();

    let inputs =
        build_inputs_sheet(&model.pro_forma, title, target_irr, assumptions, &mut refs)?;
    let parcel = build_parcel_sheet(&mut refs)?;
    let calculations = build_calculations_sheet(&mut refs)?;
    let scenarios = build_scenarios_sheet(&mut refs)?;
    let sensitivity = build_sensitivity_sheet(&refs)?;
    let summary = build_summary_sheet(model, title, &refs)?;

    for sheet in [inputs, parcel, calculations, scenarios, sensitivity, summary] {
        workbook.push_worksheet(sheet);
    }

    let bytes = workbook.save_to_buffer()?;
    info!("Exported live workbook for '{}' ({} bytes)", deal_name, bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(1), "B");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn cell_refs_quote_sheet_names() {
        assert_eq!(cell_ref(INPUTS, 4, 1), "Inputs!$B$5");
        assert_eq!(cell_ref(PARCEL, 0, 2), "'Parcel Analysis'!$C$1");
        assert_eq!(local_ref(9, 3), "D10");
    }

    #[test]
    fn guarded_formulas_fall_back_to_dash() {
        assert_eq!(guarded("A1/B1"), "=IFERROR(A1/B1,\"—\")");
    }

    fn laid_out_refs(target_irr: Option<f64>) -> Refs {
        let mut refs = Refs::default();
        let assumptions = ReturnAssumptions::default();
        build_inputs_sheet(&ProForma::default(), "Deal", target_irr, &assumptions, &mut refs)
            .unwrap();
        build_parcel_sheet(&mut refs).unwrap();
        build_calculations_sheet(&mut refs).unwrap();
        build_scenarios_sheet(&mut refs).unwrap();
        refs
    }

    fn formula(rows: &[FormulaRow], name: &str) -> String {
        rows.iter()
            .find(|row| row.0 == name)
            .map(|row| row.2.clone())
            .unwrap()
    }

    #[test]
    fn calculation_rows_register_noi_where_parcel_expects_it() {
        let mut refs = Refs::default();
        build_calculations_sheet(&mut refs).unwrap();
        assert_eq!(refs.get("calc_noi"), cell_ref(CALCULATIONS, CALC_NOI_ROW, 1));
    }

    #[test]
    fn inputs_land_where_formulas_point() {
        let refs = laid_out_refs(None);
        assert_eq!(refs.get("program_type"), "Inputs!$B$6");
        assert_eq!(refs.get("total_project_cost"), "Inputs!$B$25");
        assert_eq!(refs.get("lp_equity_pct"), "Inputs!$B$29");
        assert_eq!(refs.get("lp_equity_amount"), "Inputs!$B$30");
        assert_eq!(refs.get("stabilized_noi"), "Inputs!$B$32");
        assert_eq!(refs.get("exit_cap_rate_pct"), "Inputs!$B$33");
        assert_eq!(refs.get("target_irr"), "Inputs!$B$35");
        assert_eq!(refs.get("promote_haircut"), "Inputs!$B$40");
        assert_eq!(refs.get("calc_hold"), "Calculations!$B$19");
        assert_eq!(refs.get("calc_irr"), "Calculations!$B$23");
    }

    #[test]
    fn calculation_formulas_chain_noi_to_irr() {
        let rows = calculation_rows(&laid_out_refs(None), CALC_FIRST_ROW);
        assert_eq!(rows.len(), 20);

        assert_eq!(
            formula(&rows, "calc_noi"),
            concat!(
                r#"=IFERROR(IF(ISNUMBER(Inputs!$B$32),Inputs!$B$32,"#,
                r#"IF(OR(B4="multifamily",B4="condo"),B8,IF(B4="office",B9,"#,
                r#"IF(B4="hotel",B12,NA())))),"—")"#
            )
        );
        assert_eq!(
            formula(&rows, "calc_gross_exit"),
            r#"=IFERROR(IF(AND(B13<>0,Inputs!$B$33>0),B13/(Inputs!$B$33/100),NA()),"—")"#
        );
        assert_eq!(
            formula(&rows, "calc_profit"),
            r#"=IFERROR(IF(N(Inputs!$B$25)<>0,B16-Inputs!$B$25,NA()),"—")"#
        );
        assert_eq!(
            formula(&rows, "calc_multiple"),
            r#"=IFERROR(B21/Inputs!$B$30,"—")"#
        );
        assert_eq!(
            formula(&rows, "calc_irr"),
            r#"=IFERROR(IF(B22<=0,-100,IF(B19>0,(B22^(1/B19)-1)*100,NA())),"—")"#
        );
    }

    #[test]
    fn sensitivity_cell_reads_its_workings() {
        let refs = laid_out_refs(None);
        let multiple = "((D13+(B17-D12)*Inputs!$B$29/100*(1-Inputs!$B$40))/D13)";
        let expected = format!(
            concat!(
                "=IFERROR(IF((B17-D12)=0,NA(),",
                "ROUND(IF({m}<=0,-100,({m}^(1/Calculations!$B$19)-1)*100),1)),\"—\")"
            ),
            m = multiple
        );
        assert_eq!(sensitivity_cell_formula(&refs, 1, 2), expected);
    }

    #[test]
    fn sensitivity_colors_follow_target_input() {
        let rules = sensitivity_color_rules(&laid_out_refs(Some(15.0)));
        let has_target = "ISNUMBER(B5),N(Inputs!$B$35)<>0";
        assert_eq!(rules[0].0, FILL_GREEN);
        assert_eq!(rules[0].1, format!("=AND({},B5>=Inputs!$B$35)", has_target));
        assert_eq!(rules[1].0, FILL_YELLOW);
        assert_eq!(
            rules[1].1,
            format!("=AND({},B5<Inputs!$B$35,B5>=Inputs!$B$35-2)", has_target)
        );
        assert_eq!(rules[2].0, FILL_RED);
        assert_eq!(rules[2].1, format!("=AND({},B5<Inputs!$B$35-2)", has_target));
    }

    #[test]
    fn empty_model_exports() {
        let bytes = export_live_model(
            &ProFormaModel::default(),
            "Pro Forma",
            &ReturnAssumptions::default(),
        )
        .unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
