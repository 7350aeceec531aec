// src/handlers/export.rs
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::Response;
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use crate::config::ReturnAssumptions;
use crate::models::ProFormaModel;
use crate::services::calculations::compute_returns_with;
use crate::services::live_workbook::export_live_model;
use crate::services::summary::build_answer_summary;
use crate::services::workbook::{export_pro_forma, get_suggested_filename};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const DEFAULT_TITLE: &str = "Pro Forma";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    #[default]
    Static,
    Live,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub mode: ExportMode,
    pub deal_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

pub async fn export_workbook(
    query: ExportQuery,
    model: ProFormaModel,
    assumptions: Arc<ReturnAssumptions>,
) -> Result<Response<Vec<u8>>, Rejection> {
    let deal_name = query.deal_name.as_deref().unwrap_or(DEFAULT_TITLE);
    info!("Handling request to export '{}' as a {:?} workbook.", deal_name, query.mode);

    let result = match query.mode {
        ExportMode::Static => export_pro_forma(&model, deal_name),
        ExportMode::Live => export_live_model(&model, deal_name, &assumptions),
    };
    let bytes = result.map_err(|e| {
        error!("Failed to export workbook: {:#}", e);
        warp::reject::custom(ApiError::new(e.to_string()))
    })?;

    let filename = get_suggested_filename(&model);
    Response::builder()
        .header(CONTENT_TYPE, XLSX_CONTENT_TYPE)
        .header(CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename))
        .body(bytes)
        .map_err(|e| {
            error!("Failed to build export response: {}", e);
            warp::reject::custom(ApiError::new(e.to_string()))
        })
}

pub async fn get_summary(
    model: ProFormaModel,
    assumptions: Arc<ReturnAssumptions>,
) -> Result<Json, Rejection> {
    info!("Handling request for a plain-English summary.");

    let calc = model
        .calc_results
        .clone()
        .unwrap_or_else(|| compute_returns_with(&model.pro_forma, &assumptions));
    let summary = build_answer_summary(&model.pro_forma, &calc, &model.warnings);
    Ok(warp::reply::json(&SummaryResponse { summary }))
}
