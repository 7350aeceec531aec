// src/services/workbook.rs
use anyhow::Result;
use log::info;
use rust_xlsxwriter::{
    Color, DocProperties, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError,
};

use crate::models::{Field, FieldValue, Label, ProForma, ProFormaModel, Section, SectionKind};
use crate::services::calculations::CalcResults;
use crate::services::format::{
    currency_short, field_value, multiple, percent, with_commas, PLACEHOLDER,
};
use crate::services::sensitivity::{CellColor, SensitivityTable, COST_LABELS};

pub const FILL_CONFIRMED: u32 = 0xFFFF99;
pub const FILL_ESTIMATED: u32 = 0xCCE5FF;
pub const FILL_CALCULATED: u32 = 0xFFFFFF;
pub const FILL_MISSING: u32 = 0xFFCCCC;
pub const FILL_GREEN: u32 = 0xC6EFCE;
pub const FILL_YELLOW: u32 = 0xFFEB9C;
pub const FILL_RED: u32 = 0xFFC7CE;
const FILL_HEADER: u32 = 0x4F4F4F;
const FILL_SECTION: u32 = 0xD9D9D9;

pub const NOT_AVAILABLE: &str = "N/A";
const COLUMN_WIDTHS: [f64; 5] = [35.0, 15.0, 12.0, 14.0, 50.0];
const VALUE_HEADERS: [&str; 4] = ["Value", "Unit", "Label", "Source"];
const VERIFY_NOTE: &str =
    "NOTE: All 'estimated' assumptions are sourced from market data and should be verified with your local broker before finalizing the underwrite.";

/// Fill for a provenance label. Unlabeled fields are shown as estimated.
pub fn label_fill(label: Option<Label>) -> u32 {
    match label {
        Some(Label::Confirmed) => FILL_CONFIRMED,
        Some(Label::Calculated) => FILL_CALCULATED,
        Some(Label::Missing) => FILL_MISSING,
        Some(Label::Estimated) | None => FILL_ESTIMATED,
    }
}

pub fn color_fill(color: CellColor) -> u32 {
    match color {
        CellColor::Green => FILL_GREEN,
        CellColor::Yellow => FILL_YELLOW,
        CellColor::Red => FILL_RED,
        CellColor::Neutral => FILL_CALCULATED,
    }
}

pub(crate) fn normal_format() -> Format {
    Format::new().set_font_size(10)
}

pub(crate) fn fill_format(fill: u32) -> Format {
    normal_format()
        .set_background_color(Color::RGB(fill))
        .set_border(FormatBorder::Thin)
}

pub(crate) fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_size(11)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(FILL_HEADER))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin)
}

pub(crate) fn section_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_size(11)
        .set_background_color(Color::RGB(FILL_SECTION))
        .set_border(FormatBorder::Thin)
}

pub(crate) fn title_format() -> Format {
    Format::new().set_bold().set_font_size(16)
}

pub(crate) fn metric_format() -> Format {
    Format::new().set_bold().set_font_size(14)
}

pub(crate) fn note_format() -> Format {
    Format::new()
        .set_italic()
        .set_font_size(10)
        .set_background_color(Color::RGB(FILL_YELLOW))
        .set_text_wrap()
}

pub(crate) fn set_column_widths(ws: &mut Worksheet) -> Result<(), XlsxError> {
    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        ws.set_column_width(col as u16, *width)?;
    }
    Ok(())
}

pub(crate) fn add_header_row(
    ws: &mut Worksheet,
    row: u32,
    headers: &[&str],
) -> Result<u32, XlsxError> {
    let format = header_format();
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(row, col as u16, *header, &format)?;
    }
    Ok(row + 1)
}

/// Section title across columns A-E.
pub(crate) fn add_section_header(
    ws: &mut Worksheet,
    row: u32,
    title: &str,
) -> Result<u32, XlsxError> {
    let format = section_format();
    ws.write_string_with_format(row, 0, title, &format)?;
    for col in 1..5 {
        ws.write_blank(row, col, &format)?;
    }
    Ok(row + 1)
}

fn value_text(field: &Field) -> String {
    let unit = field
        .as_labeled()
        .and_then(|f| f.unit.as_deref())
        .unwrap_or("");
    match field {
        Field::Labeled(labeled) => match &labeled.value {
            None => PLACEHOLDER.to_string(),
            Some(FieldValue::Number(n)) => field_value(*n, unit),
            Some(FieldValue::Text(s)) => s.clone(),
        },
        Field::Bare(n) => field_value(*n, unit),
        Field::Text(s) => s.clone(),
        Field::Null | Field::Other(_) => NOT_AVAILABLE.to_string(),
    }
}

/// Assumption row: name, value, unit, label, source, filled by provenance.
fn add_value_row(
    ws: &mut Worksheet,
    row: u32,
    name: &str,
    field: Option<&Field>,
    bold: bool,
) -> Result<u32, XlsxError> {
    let field = match field {
        Some(field) if !matches!(field, Field::Null | Field::Other(_)) => field,
        _ => {
            ws.write_string_with_format(row, 0, name, &normal_format())?;
            ws.write_string(row, 1, NOT_AVAILABLE)?;
            return Ok(row + 1);
        }
    };

    let (unit, label, label_text, source) = match field.as_labeled() {
        Some(labeled) => (
            labeled.unit.clone().unwrap_or_default(),
            labeled.provenance(),
            labeled.label.clone().unwrap_or_else(|| Label::Estimated.to_string()),
            labeled.source.clone().unwrap_or_default(),
        ),
        None => (
            String::new(),
            Some(Label::Confirmed),
            Label::Confirmed.to_string(),
            String::new(),
        ),
    };

    let mut format = fill_format(label_fill(label));
    if bold {
        format = format.set_bold();
    }
    let value_format = format.clone().set_align(FormatAlign::Right);

    ws.write_string_with_format(row, 0, name, &format)?;
    ws.write_string_with_format(row, 1, value_text(field), &value_format)?;
    ws.write_string_with_format(row, 2, unit, &format)?;
    ws.write_string_with_format(row, 3, label_text, &format)?;
    ws.write_string_with_format(row, 4, source, &format)?;
    Ok(row + 1)
}

fn add_value_rows(
    ws: &mut Worksheet,
    mut row: u32,
    section: Option<&Section>,
    fields: &[(&str, &str)],
) -> Result<u32, XlsxError> {
    for (name, key) in fields {
        row = add_value_row(ws, row, name, section.and_then(|s| s.get(key)), false)?;
    }
    Ok(row)
}

fn new_sheet(name: &str) -> Result<Worksheet, XlsxError> {
    let mut ws = Worksheet::new();
    ws.set_name(name)?;
    set_column_widths(&mut ws)?;
    Ok(ws)
}

fn summary_param(pro_forma: &ProForma, key: &str) -> Option<String> {
    let field = pro_forma.field(SectionKind::ProjectSummary, key)?;
    field
        .text()
        .map(str::to_string)
        .or_else(|| field.number().map(|n| with_commas(n, 0)))
}

fn build_summary_sheet(model: &ProFormaModel, deal_name: &str) -> Result<Worksheet, XlsxError> {
    let mut ws = new_sheet("Summary")?;
    let pf = &model.pro_forma;
    let normal = normal_format();

    ws.write_string_with_format(0, 0, pf.deal_name().unwrap_or(deal_name), &title_format())?;
    let mut row = 2;

    let stated_metric = |key: &str| pf.value(SectionKind::ReturnMetrics, key);
    let total_cost = pf.value(SectionKind::CostAssumptions, "total_project_cost");
    let metrics = [
        ("Levered LP IRR", percent(stated_metric("project_irr_levered_pct"))),
        ("LP Equity Multiple", multiple(stated_metric("equity_multiple_lp"))),
        ("Profit on Cost", percent(stated_metric("profit_on_cost_pct"))),
        ("Total Project Cost", currency_short(total_cost)),
    ];
    let metric = metric_format();
    let metric_value = metric_format().set_align(FormatAlign::Right);
    for (label, value) in metrics {
        ws.write_string_with_format(row, 0, label, &metric)?;
        ws.write_string_with_format(row, 1, value, &metric_value)?;
        row += 1;
    }
    row += 1;

    row = add_section_header(&mut ws, row, "PROJECT PARAMETERS")?;
    let gfa = pf.value(SectionKind::ProjectSummary, "total_gfa_sf").unwrap_or(0.0);
    let duration = pf
        .value(SectionKind::ProjectSummary, "construction_duration_months")
        .unwrap_or(0.0);
    let param = |key: &str, fallback: &str| {
        summary_param(pf, key).unwrap_or_else(|| fallback.to_string())
    };
    let params = [
        ("Market", param("market", PLACEHOLDER)),
        ("Program Type", param("program_type", PLACEHOLDER)),
        ("Total GFA", format!("{} SF", with_commas(gfa, 0))),
        ("Unit Count", param("unit_count", NOT_AVAILABLE)),
        ("Rentable SF", param("rentable_sf", NOT_AVAILABLE)),
        ("Hotel Keys", param("total_keys", NOT_AVAILABLE)),
        ("Construction Start", param("construction_start", "TBD")),
        ("Construction Duration", format!("{} months", with_commas(duration, 0))),
    ];
    for (label, value) in params {
        ws.write_string_with_format(row, 0, label, &normal)?;
        ws.write_string_with_format(row, 1, value, &normal)?;
        row += 1;
    }
    row += 1;

    if let Some(calc) = &model.calc_results {
        row = add_calc_rows(&mut ws, row, calc)?;
        row += 1;
    }

    if let Some(notes) = pf.summary_text("notes").filter(|n| !n.trim().is_empty()) {
        row = add_section_header(&mut ws, row, "NOTES")?;
        ws.merge_range(row, 0, row, 4, notes, &normal.clone().set_text_wrap())?;
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

    Ok(ws)
}

fn add_calc_rows(ws: &mut Worksheet, row: u32, calc: &CalcResults) -> Result<u32, XlsxError> {
    let mut row = add_section_header(ws, row, "CALCULATOR CROSS-CHECK")?;
    let hold = calc
        .calc_hold_years
        .map(|y| format!("{:.1} years", y))
        .unwrap_or_else(|| PLACEHOLDER.to_string());
    let rows = [
        ("Stabilized NOI", currency_short(calc.calc_noi)),
        ("Gross Exit Value", currency_short(calc.calc_gross_exit_value)),
        ("Net Exit Value", currency_short(calc.calc_net_exit_value)),
        ("Total Profit", currency_short(calc.calc_total_profit)),
        ("Profit on Cost", percent(calc.calc_profit_on_cost_pct)),
        ("Equity Multiple (approx.)", multiple(calc.calc_equity_multiple_approx)),
        ("IRR (approx.)", percent(calc.calc_irr_approx_pct)),
        ("Hold Period", hold),
    ];
    let normal = normal_format();
    let right = normal_format().set_align(FormatAlign::Right);
    for (label, value) in rows {
        ws.write_string_with_format(row, 0, label, &normal)?;
        ws.write_string_with_format(row, 1, value, &right)?;
        row += 1;
    }
    Ok(row)
}

fn table_headers(first: &'static str) -> [&'static str; 5] {
    [first, VALUE_HEADERS[0], VALUE_HEADERS[1], VALUE_HEADERS[2], VALUE_HEADERS[3]]
}

fn build_revenue_sheet(pf: &ProForma) -> Result<Worksheet, XlsxError> {
    let mut ws = new_sheet("Revenue")?;
    let row = add_header_row(&mut ws, 0, &table_headers("Assumption"))?;
    add_value_rows(
        &mut ws,
        row,
        pf.section(SectionKind::RevenueAssumptions),
        &[
            ("Monthly Rent ($/SF)", "rent_psf_monthly"),
            ("Annual Rent NNN ($/SF)", "rent_psf_annual_nnn"),
            ("ADR (Hotel)", "adr"),
            ("Stabilized Occupancy", "stabilized_occupancy_pct"),
            ("Lease-Up Period", "lease_up_months"),
            ("Annual Rent Growth", "annual_rent_growth_pct"),
            ("Other Income per Unit", "other_income_per_unit_monthly"),
        ],
    )?;
    Ok(ws)
}

fn build_costs_sheet(pf: &ProForma) -> Result<Worksheet, XlsxError> {
    let mut ws = new_sheet("Costs")?;
    let row = add_header_row(&mut ws, 0, &table_headers("Cost Item"))?;
    let costs = pf.section(SectionKind::CostAssumptions);
    let row = add_value_rows(
        &mut ws,
        row,
        costs,
        &[
            ("Land Cost (Total)", "land_cost_total"),
            ("Hard Cost ($/SF)", "hard_cost_psf"),
            ("Hard Cost (Total)", "hard_cost_total"),
            ("Soft Cost (% of Hard)", "soft_cost_pct_of_hard"),
            ("Soft Cost (Total)", "soft_cost_total"),
            ("Developer Fee (%)", "developer_fee_pct"),
            ("Developer Fee (Total)", "developer_fee_total"),
            ("Contingency (%)", "contingency_pct"),
            ("Contingency (Total)", "contingency_total"),
        ],
    )?;
    add_value_row(
        &mut ws,
        row,
        "TOTAL PROJECT COST",
        costs.and_then(|s| s.get("total_project_cost")),
        true,
    )?;
    Ok(ws)
}

fn build_financing_sheet(pf: &ProForma) -> Result<Worksheet, XlsxError> {
    let mut ws = new_sheet("Financing")?;
    let financing = pf.section(SectionKind::FinancingAssumptions);
    let mut row = add_header_row(&mut ws, 0, &table_headers("Item"))?;

    row = add_section_header(&mut ws, row, "CONSTRUCTION LOAN")?;
    row = add_value_rows(
        &mut ws,
        row,
        financing,
        &[
            ("Loan-to-Cost", "construction_loan_ltc_pct"),
            ("Loan Amount", "construction_loan_amount"),
            ("Interest Rate", "construction_loan_rate_pct"),
            ("Carry Cost (Total)", "carry_cost_total"),
        ],
    )?;

    row = add_section_header(&mut ws, row, "EQUITY")?;
    add_value_rows(
        &mut ws,
        row,
        financing,
        &[
            ("Total Equity Required", "equity_required"),
            ("LP Equity (%)", "lp_equity_pct"),
            ("LP Equity ($)", "lp_equity_amount"),
            ("GP Equity (%)", "gp_equity_pct"),
            ("GP Equity ($)", "gp_equity_amount"),
        ],
    )?;
    Ok(ws)
}

fn build_returns_sheet(model: &ProFormaModel) -> Result<Worksheet, XlsxError> {
    let mut ws = new_sheet("Returns")?;
    let row = add_header_row(&mut ws, 0, &table_headers("Metric"))?;
    let row = add_value_rows(
        &mut ws,
        row,
        model.pro_forma.section(SectionKind::ReturnMetrics),
        &[
            ("Exit Cap Rate", "exit_cap_rate_pct"),
            ("Exit Year", "exit_year"),
            ("Stabilized NOI", "stabilized_noi"),
            ("Gross Exit Value", "gross_exit_value"),
            ("Net Exit Value", "net_exit_value"),
            ("Total Profit", "total_profit"),
            ("Profit on Cost", "profit_on_cost_pct"),
            ("Development Spread", "development_spread_bps"),
            ("Project IRR (Levered)", "project_irr_levered_pct"),
            ("LP Equity Multiple", "equity_multiple_lp"),
            ("LP IRR", "lp_irr_pct"),
        ],
    )?;

    if let Some(sensitivity) = &model.sensitivity {
        add_sensitivity_table(&mut ws, row + 2, sensitivity)?;
    }
    Ok(ws)
}

/// Colored 3x3 IRR grid with a legend. Returns the next free row.
pub(crate) fn add_sensitivity_table(
    ws: &mut Worksheet,
    start_row: u32,
    table: &SensitivityTable,
) -> Result<u32, XlsxError> {
    let mut row = start_row;
    ws.merge_range(
        row,
        0,
        row,
        4,
        "Sensitivity Analysis: Levered IRR (%) by Exit Cap Rate and Construction Cost",
        &section_format(),
    )?;
    row += 2;

    let bold_center = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let cols: Vec<&str> = if table.cols.is_empty() {
        COST_LABELS.to_vec()
    } else {
        table.cols.iter().map(String::as_str).collect()
    };
    for (i, label) in cols.iter().enumerate() {
        ws.write_string_with_format(row, i as u16 + 1, *label, &bold_center)?;
    }
    row += 1;

    let row_header = Format::new()
        .set_bold()
        .set_align(FormatAlign::Right)
        .set_border(FormatBorder::Thin);
    for (i, label) in table.rows.iter().enumerate() {
        ws.write_string_with_format(row, 0, label, &row_header)?;
        for j in 0..cols.len() {
            let text = table
                .value_at(i, j)
                .map(|v| format!("{:.1}%", v))
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            let mut format = Format::new()
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin)
                .set_background_color(Color::RGB(color_fill(table.color_at(i, j))));
            if [i, j] == table.base_position {
                format = format.set_bold();
            }
            ws.write_string_with_format(row, j as u16 + 1, text, &format)?;
        }
        row += 1;
    }

    row += 1;
    ws.write_string_with_format(row, 0, "Legend:", &normal_format())?;
    let legend = [
        (FILL_GREEN, "Meets target IRR"),
        (FILL_YELLOW, "Within 200bps of target"),
        (FILL_RED, "Below target"),
    ];
    for (col, (fill, label)) in legend.iter().enumerate() {
        ws.write_string_with_format(row, col as u16 + 1, *label, &fill_format(*fill))?;
    }

    Ok(row + 2)
}

/// `rent_psf_monthly` -> `Rent Psf Monthly`.
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_assumptions_sheet(pf: &ProForma) -> Result<Worksheet, XlsxError> {
    let mut ws = new_sheet("Assumptions & Sources")?;
    let mut row = add_header_row(&mut ws, 0, &table_headers("Assumption"))?;

    let sections = [
        ("REVENUE ASSUMPTIONS", SectionKind::RevenueAssumptions),
        ("COST ASSUMPTIONS", SectionKind::CostAssumptions),
        ("FINANCING ASSUMPTIONS", SectionKind::FinancingAssumptions),
        ("RETURN ASSUMPTIONS", SectionKind::ReturnMetrics),
    ];

    for (title, kind) in sections {
        let is_estimated = |field: &Field| {
            field.as_labeled().and_then(|l| l.provenance()) == Some(Label::Estimated)
        };
        let estimated: Vec<(&String, &Field)> = pf
            .section(kind)
            .map(|s| s.iter().filter(|(_, f)| is_estimated(f)).collect())
            .unwrap_or_default();

        if estimated.is_empty() {
            continue;
        }
        row = add_section_header(&mut ws, row, title)?;
        for (key, field) in estimated {
            row = add_value_row(&mut ws, row, &title_case(key), Some(field), false)?;
        }
    }

    row += 2;
    ws.set_row_height(row, 30)?;
    ws.merge_range(row, 0, row, 4, VERIFY_NOTE, &note_format())?;
    Ok(ws)
}

pub(crate) fn new_workbook(title: &str) -> Workbook {
    let mut workbook = Workbook::new();
    let properties = DocProperties::new()
        .set_title(title)
        .set_subject("Development pro forma")
        .set_company("FAiLLON");
    workbook.set_properties(&properties);
    workbook
}

/// Static workbook: Summary, Revenue, Costs, Financing, Returns, Assumptions & Sources.
pub fn export_pro_forma(model: &ProFormaModel, deal_name: &str) -> Result<Vec<u8>> {
    let mut workbook = new_workbook(deal_name);
    let pf = &model.pro_forma;

    workbook.push_worksheet(build_summary_sheet(model, deal_name)?);
    workbook.push_worksheet(build_revenue_sheet(pf)?);
    workbook.push_worksheet(build_costs_sheet(pf)?);
    workbook.push_worksheet(build_financing_sheet(pf)?);
    workbook.push_worksheet(build_returns_sheet(model)?);
    workbook.push_worksheet(build_assumptions_sheet(pf)?);

    let bytes = workbook.save_to_buffer()?;
    info!("Exported static workbook for '{}' ({} bytes)", deal_name, bytes.len());
    Ok(bytes)
}

/// Deal name as a file name: spaces to `_`, path separators and other unsafe characters to `-`.
pub fn get_suggested_filename(model: &ProFormaModel) -> String {
    let deal_name = model.pro_forma.deal_name().unwrap_or("Pro_Forma");
    let clean: String = deal_name
        .trim()
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    format!("{}.xlsx", clean)
}
