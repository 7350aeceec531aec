// src/bin/check_returns.rs
// Usage: check_returns <pro_forma.json> [target_irr]
use dotenv::dotenv;
use std::{env, error::Error, fs};

use faillon::config::ReturnAssumptions;
use faillon::models::ProFormaModel;
use faillon::services::format::{currency_short, multiple, percent, PLACEHOLDER};
use faillon::services::sensitivity::compute_sensitivity_table_with;
use faillon::services::summary::build_answer_summary;
use faillon::services::validation::validate_pro_forma;

fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let input = args.first().ok_or("usage: check_returns <pro_forma.json> [target_irr]")?;
    let target_irr = args.get(1).map(|t| t.parse::<f64>()).transpose()?;
    let assumptions = ReturnAssumptions::from_env();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(input)?)?;
    let model = ProFormaModel::from_json(raw, &assumptions)?;
    let calc = model.calc_results.clone().unwrap_or_default();

    let report = validate_pro_forma(&model.pro_forma);
    if !report.valid {
        println!("Schema problems:");
        for error in &report.errors {
            println!("  - {}", error);
        }
        println!();
    }

    println!("Calculator results:");
    println!("  NOI:              {}", currency_short(calc.calc_noi));
    println!("  Gross exit value: {}", currency_short(calc.calc_gross_exit_value));
    println!("  Net exit value:   {}", currency_short(calc.calc_net_exit_value));
    println!("  Total profit:     {}", currency_short(calc.calc_total_profit));
    println!("  Profit on cost:   {}", percent(calc.calc_profit_on_cost_pct));
    println!("  Equity multiple:  {}", multiple(calc.calc_equity_multiple_approx));
    println!("  IRR:              {}", percent(calc.calc_irr_approx_pct));
    let hold = calc
        .calc_hold_years
        .map(|y| format!("{:.1}", y))
        .unwrap_or_else(|| PLACEHOLDER.to_string());
    println!("  Hold (years):     {}", hold);
    println!();

    let table = compute_sensitivity_table_with(&model.pro_forma, target_irr, &assumptions);
    println!("{} \\ {}", table.row_label, table.col_label);
    let header: Vec<String> = table.cols.iter().map(|c| format!("{:>10}", c)).collect();
    println!("{:>10} {}", "", header.join(""));
    for (i, row) in table.rows.iter().enumerate() {
        let cells: Vec<String> = (0..table.cols.len())
            .map(|j| {
                let value = table
                    .value_at(i, j)
                    .map(|v| format!("{:.1}%", v))
                    .unwrap_or_else(|| PLACEHOLDER.to_string());
                format!("{:>10}", value)
            })
            .collect();
        println!("{:>10} {}", row, cells.join(""));
    }
    println!();

    println!("{}", build_answer_summary(&model.pro_forma, &calc, &model.warnings));
    Ok(())
}
