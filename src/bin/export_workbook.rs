// src/bin/export_workbook.rs
// Usage: export_workbook <pro_forma.json> [output.xlsx] [--live]
use chrono::Local;
use dotenv::dotenv;
use log::info;
use std::{env, error::Error, fs};

use faillon::config::ReturnAssumptions;
use faillon::models::ProFormaModel;
use faillon::services::live_workbook::export_live_model;
use faillon::services::sensitivity::compute_sensitivity_table_with;
use faillon::services::workbook::{export_pro_forma, get_suggested_filename};

fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let live = args.iter().any(|a| a == "--live");
    args.retain(|a| a != "--live");

    let input = args
        .first()
        .ok_or("usage: export_workbook <pro_forma.json> [output.xlsx] [--live]")?;
    let assumptions = ReturnAssumptions::from_env();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(input)?)?;
    let mut model = ProFormaModel::from_json(raw, &assumptions)?;
    if model.sensitivity.is_none() {
        let table = compute_sensitivity_table_with(&model.pro_forma, None, &assumptions);
        model.sensitivity = Some(table);
    }

    let deal_name = model.pro_forma.deal_name().unwrap_or("Pro Forma").to_string();
    let bytes = if live {
        export_live_model(&model, &deal_name, &assumptions)?
    } else {
        export_pro_forma(&model, &deal_name)?
    };

    let output = match args.get(1) {
        Some(path) => path.clone(),
        None => {
            let suggested = get_suggested_filename(&model);
            let stem = suggested.trim_end_matches(".xlsx");
            format!("{}_{}.xlsx", stem, Local::now().format("%Y%m%d"))
        }
    };

    fs::write(&output, &bytes)?;
    info!("Wrote {} bytes to {}", bytes.len(), output);
    println!("Exported {} workbook: {}", if live { "live" } else { "static" }, output);
    for warning in &model.warnings {
        println!("WARNING: {}", warning);
    }
    Ok(())
}
