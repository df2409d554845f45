// Stats endpoint - reads persisted 300 s rollups over a time range

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{MetricId, Summary};
use crate::store::RollupTable;

use super::{ApiError, AppState};

/// Query parameters for /stats. All arrive as strings so that missing and
/// malformed values produce the same 400, not a generic extractor reject.
#[derive(Debug, Deserialize)]
pub struct StatsParams {
    #[serde(rename = "metricID")]
    metric_id: Option<String>,
    #[serde(rename = "startTS")]
    start_ts: Option<String>,
    #[serde(rename = "endTS")]
    end_ts: Option<String>,
}

/// GET /stats?metricID=&startTS=&endTS=
///
/// `metricID` and `startTS` (unix seconds) are required; `endTS` defaults to
/// now (UTC). Rows come from the 300 s rollup table with `ts >= startTS`,
/// bounded above by `endTS`.
pub async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Vec<Summary>>, ApiError> {
    let metric: MetricId = params
        .metric_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing metricID".to_string()))?
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid metricID".to_string()))?;

    let start = parse_unix_seconds(params.start_ts.as_deref(), "startTS")?
        .ok_or_else(|| ApiError::BadRequest("missing startTS".to_string()))?;

    let end = parse_unix_seconds(params.end_ts.as_deref(), "endTS")?
        .unwrap_or_else(|| Utc::now().timestamp());

    let since = DateTime::from_timestamp(start, 0)
        .ok_or_else(|| ApiError::BadRequest("startTS out of range".to_string()))?;

    let rows = state.store.scan_rollup(RollupTable::R300, metric, since)?;
    let rows = rows
        .into_iter()
        .filter(|row| row.ts.timestamp() <= end)
        .collect();

    Ok(Json(rows))
}

fn parse_unix_seconds(raw: Option<&str>, name: &str) -> Result<Option<i64>, ApiError> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid {name}"))),
    }
}
