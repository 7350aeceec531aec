// src/handlers/returns.rs
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use crate::config::ReturnAssumptions;
use crate::models::ProForma;
use crate::services::calculations::{check_return_discrepancy, compute_returns_with, CalcResults};

#[derive(Debug, Serialize)]
pub struct ReturnsResponse {
    pub calc_results: CalcResults,
    pub warnings: Vec<String>,
}

pub async fn get_returns(
    pro_forma: ProForma,
    assumptions: Arc<ReturnAssumptions>,
) -> Result<Json, Rejection> {
    info!(
        "Handling request to compute returns for '{}'.",
        pro_forma.deal_name().unwrap_or("unnamed deal")
    );

    let calc_results = compute_returns_with(&pro_forma, &assumptions);
    let warnings = check_return_discrepancy(&pro_forma, &calc_results);
    if !warnings.is_empty() {
        warn!("Stated returns disagree with the calculator: {:?}", warnings);
    }

    Ok(warp::reply::json(&ReturnsResponse { calc_results, warnings }))
}
