// src/handlers/sensitivity.rs
use log::info;
use serde::Deserialize;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use crate::config::ReturnAssumptions;
use crate::models::ProForma;
use crate::services::sensitivity::compute_sensitivity_table_with;

#[derive(Debug, Deserialize)]
pub struct SensitivityRequest {
    pub pro_forma: ProForma,
    #[serde(default)]
    pub target_irr: Option<f64>,
}

pub async fn get_sensitivity(
    request: SensitivityRequest,
    assumptions: Arc<ReturnAssumptions>,
) -> Result<Json, Rejection> {
    info!("Handling request for sensitivity grid (target IRR: {:?}).", request.target_irr);

    let table =
        compute_sensitivity_table_with(&request.pro_forma, request.target_irr, &assumptions);
    Ok(warp::reply::json(&table))
}
