// src/handlers/adjust.rs
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use crate::config::ReturnAssumptions;
use crate::models::ProForma;
use crate::services::adjustments::{adjust_model, parse_adjustments, Adjustment};

/// Explicit adjustments are applied first, then whatever the message asks for.
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub pro_forma: ProForma,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub adjustments: Vec<Adjustment>,
}

pub async fn adjust(
    request: AdjustRequest,
    assumptions: Arc<ReturnAssumptions>,
) -> Result<Json, Rejection> {
    info!("Handling request to adjust a pro forma.");

    let mut adjustments = request.adjustments;
    if let Some(message) = request.message.as_deref() {
        let parsed = parse_adjustments(message).map_err(|e| {
            error!("Failed to build adjustment parser: {}", e);
            warp::reject::custom(ApiError::new(e.to_string()))
        })?;
        adjustments.extend(parsed);
    }

    if adjustments.is_empty() {
        warn!("No adjustments recognized in request: {:?}", request.message);
        return Err(warp::reject::custom(ApiError::bad_request(
            "No adjustments recognized. Try 'cap rate to 5.5', 'rent to $2.75', '220 units' or 'hard cost to $310'.",
        )));
    }

    let outcome = adjust_model(&request.pro_forma, &adjustments, &assumptions);
    info!("Applied adjustments: {}", outcome.changes.join(", "));
    Ok(warp::reply::json(&outcome))
}
