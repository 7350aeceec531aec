// src/handlers/validate.rs
use log::info;
use warp::reply::Json;
use warp::Rejection;

use crate::models::ProForma;
use crate::services::validation::validate_pro_forma;

pub async fn validate(pro_forma: ProForma) -> Result<Json, Rejection> {
    info!("Handling request to validate a pro forma.");
    let report = validate_pro_forma(&pro_forma);
    Ok(warp::reply::json(&report))
}
