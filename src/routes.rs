// src/routes.rs
use std::convert::Infallible;
use std::sync::Arc;

use log::{info, warn};
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::config::ReturnAssumptions;
use crate::handlers::error::ApiError;
use crate::handlers::{
    adjust::adjust,
    export::{export_workbook, get_summary, ExportQuery},
    returns::get_returns,
    sensitivity::get_sensitivity,
    validate::validate,
};

/// Largest JSON body accepted on any route.
const MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message: String;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        code = StatusCode::BAD_REQUEST;
        message = format!("Invalid request body: {}", e);
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        code = StatusCode::BAD_REQUEST;
        message = "Invalid query string: mode must be 'static' or 'live'".to_string();
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = StatusCode::PAYLOAD_TOO_LARGE;
        message = "Payload Too Large".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        warn!("Unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

pub fn routes(
    assumptions: Arc<ReturnAssumptions>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let assumptions_filter = warp::any().map(move || assumptions.clone());

    let returns_route = warp::path!("api" / "v1" / "returns")
        .and(warp::post())
        .and(json_body())
        .and(assumptions_filter.clone())
        .and_then(get_returns);

    let sensitivity_route = warp::path!("api" / "v1" / "sensitivity")
        .and(warp::post())
        .and(json_body())
        .and(assumptions_filter.clone())
        .and_then(get_sensitivity);

    let validate_route = warp::path!("api" / "v1" / "validate")
        .and(warp::post())
        .and(json_body())
        .and_then(validate);

    let adjust_route = warp::path!("api" / "v1" / "adjust")
        .and(warp::post())
        .and(json_body())
        .and(assumptions_filter.clone())
        .and_then(adjust);

    let summary_route = warp::path!("api" / "v1" / "summary")
        .and(warp::post())
        .and(json_body())
        .and(assumptions_filter.clone())
        .and_then(get_summary);

    let export_route = warp::path!("api" / "v1" / "export")
        .and(warp::post())
        .and(warp::query::<ExportQuery>())
        .and(json_body())
        .and(assumptions_filter.clone())
        .and_then(export_workbook);

    info!("All routes configured successfully.");

    returns_route
        .or(sensitivity_route)
        .or(validate_route)
        .or(adjust_route)
        .or(summary_route)
        .or(export_route)
        .recover(handle_rejection)
}
