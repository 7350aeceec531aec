// tests/export_workbook.rs
mod common;

use faillon::config::ReturnAssumptions;
use faillon::models::{Field, ProFormaModel, SectionKind};
use faillon::services::live_workbook::export_live_model;
use faillon::services::sensitivity::compute_sensitivity_table;
use faillon::services::workbook::{export_pro_forma, get_suggested_filename};

use common::{charlotte_multifamily, read_entry};

fn model() -> ProFormaModel {
    let assumptions = ReturnAssumptions::default();
    let mut model = ProFormaModel::from_json(charlotte_multifamily(), &assumptions).unwrap();
    model.sensitivity = Some(compute_sensitivity_table(&model.pro_forma, Some(15.0)));
    model
}

#[test]
fn static_workbook_has_six_sheets() {
    let bytes = export_pro_forma(&model(), "Charlotte MF").unwrap();
    assert_eq!(&bytes[..2], b"PK");

    let workbook = read_entry(&bytes, "xl/workbook.xml");
    let sheets = [
        "Summary",
        "Revenue",
        "Costs",
        "Financing",
        "Returns",
        "Assumptions &amp; Sources",
    ];
    for name in sheets {
        assert!(workbook.contains(&format!("name=\"{}\"", name)), "missing sheet {}", name);
    }

    let strings = read_entry(&bytes, "xl/sharedStrings.xml");
    assert!(strings.contains("Charlotte MF"));
    assert!(strings.contains("CoStar Q3"));
}

#[test]
fn live_workbook_links_back_to_inputs() {
    let bytes = export_live_model(&model(), "Charlotte MF", &ReturnAssumptions::default()).unwrap();
    assert_eq!(&bytes[..2], b"PK");

    let workbook = read_entry(&bytes, "xl/workbook.xml");
    let order = [
        "Inputs",
        "Parcel Analysis",
        "Calculations",
        "Scenarios",
        "Sensitivity",
        "Summary",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|name| workbook.find(&format!("name=\"{}\"", name)).expect("sheet present"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "sheets out of order");

    let inputs = read_entry(&bytes, "xl/worksheets/sheet1.xml");
    assert!(!inputs.contains("<f>"), "inputs sheet should hold literal values only");

    let calculations = read_entry(&bytes, "xl/worksheets/sheet3.xml");
    assert!(calculations.contains("<f>IFERROR("));
    assert!(calculations.contains("Inputs!$B$"));

    let parcel = read_entry(&bytes, "xl/worksheets/sheet2.xml");
    assert!(parcel.contains("Calculations!$B$"));

    let summary = read_entry(&bytes, "xl/worksheets/sheet6.xml");
    assert!(summary.contains("Calculations!$B$"));
    assert!(summary.contains("Scenarios!$"));
}

#[test]
fn live_sensitivity_colors_follow_target_input() {
    let bytes = export_live_model(&model(), "Charlotte MF", &ReturnAssumptions::default()).unwrap();

    let strings = read_entry(&bytes, "xl/sharedStrings.xml");
    assert!(strings.contains("Target LP IRR"));
    let inputs = read_entry(&bytes, "xl/worksheets/sheet1.xml");
    assert!(inputs.contains("<c r=\"B35\""));
    assert!(inputs.contains("<v>15</v>"));

    let sensitivity = read_entry(&bytes, "xl/worksheets/sheet5.xml");
    assert!(sensitivity.contains("<conditionalFormatting sqref=\"B5:D7\">"));
    assert_eq!(sensitivity.matches("type=\"expression\"").count(), 3);
    assert!(sensitivity.contains("N(Inputs!$B$35)"));
}

#[test]
fn empty_payload_still_exports() {
    let model = ProFormaModel::default();
    assert_eq!(&export_pro_forma(&model, "Pro Forma").unwrap()[..2], b"PK");
    assert_eq!(
        &export_live_model(&model, "Pro Forma", &ReturnAssumptions::default()).unwrap()[..2],
        b"PK"
    );
    assert_eq!(get_suggested_filename(&model), "Pro_Forma.xlsx");
}

#[test]
fn suggested_filename_is_path_safe() {
    assert_eq!(get_suggested_filename(&model()), "Charlotte_MF.xlsx");

    let mut model = model();
    model
        .pro_forma
        .section_mut(SectionKind::ProjectSummary)
        .insert("deal_name", Field::Text("..\\Tower: A/B?".to_string()));
    let name = get_suggested_filename(&model);
    assert!(name.ends_with(".xlsx"));
    assert!(!name.contains(['/', '\\', ':', '?']));
}
