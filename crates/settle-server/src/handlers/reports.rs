//! Spending report handlers
//!
//! All aggregates leave settlement transactions out.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Datelike, Duration, Local, Months, NaiveDate};
use serde::Deserialize;

use crate::{AppError, AppState};
use settle_core::models::{CategorySpending, MonthlyExpenseReport};

#[derive(Debug, Deserialize)]
pub struct MonthlyQuery {
    /// YYYY-MM, defaults to the current month
    pub period: Option<String>,
}

/// GET /api/reports/monthly - Expense total for one calendar month
pub async fn report_monthly(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MonthlyQuery>,
) -> Result<Json<MonthlyExpenseReport>, AppError> {
    let period = params
        .period
        .unwrap_or_else(|| Local::now().format("%Y-%m").to_string());
    Ok(Json(state.db.monthly_expenses(&period)?))
}

/// Query parameters shared by range reports
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Preset (this-month, last-month, this-year, last-30-days, last-90-days)
    #[serde(default = "default_period")]
    pub period: String,
    /// Custom start date (YYYY-MM-DD)
    pub from: Option<String>,
    /// Custom end date (YYYY-MM-DD)
    pub to: Option<String>,
    #[serde(default = "default_include_subcategories")]
    pub include_subcategories: bool,
}

fn default_period() -> String {
    "this-month".to_string()
}

fn default_include_subcategories() -> bool {
    true
}

/// Resolve a preset or custom range into inclusive dates
pub fn resolve_period(
    period: &str,
    custom_from: Option<&str>,
    custom_to: Option<&str>,
) -> Result<(NaiveDate, NaiveDate), AppError> {
    if let (Some(from), Some(to)) = (custom_from, custom_to) {
        let from_date = NaiveDate::parse_from_str(from, "%Y-%m-%d")
            .map_err(|_| AppError::bad_request("Invalid from date format (use YYYY-MM-DD)"))?;
        let to_date = NaiveDate::parse_from_str(to, "%Y-%m-%d")
            .map_err(|_| AppError::bad_request("Invalid to date format (use YYYY-MM-DD)"))?;
        return Ok((from_date, to_date));
    }

    let today = Local::now().date_naive();
    let month_start = today.with_day(1).unwrap_or(today);
    let invalid = || AppError::bad_request("Invalid period");

    match period.to_lowercase().as_str() {
        "this-month" => Ok((month_start, today)),
        "last-month" => {
            let from = month_start
                .checked_sub_months(Months::new(1))
                .ok_or_else(invalid)?;
            let to = month_start.pred_opt().ok_or_else(invalid)?;
            Ok((from, to))
        }
        "this-year" => {
            let from = NaiveDate::from_ymd_opt(today.year(), 1, 1).ok_or_else(invalid)?;
            Ok((from, today))
        }
        "last-30-days" => Ok((today - Duration::days(30), today)),
        "last-90-days" => Ok((today - Duration::days(90), today)),
        _ => Err(AppError::bad_request(
            "Unknown period. Use this-month, last-month, this-year, last-30-days, last-90-days, or from/to",
        )),
    }
}

/// GET /api/reports/categories - Spending per category, largest first
pub async fn report_categories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<CategorySpending>>, AppError> {
    let (from, to) = resolve_period(&params.period, params.from.as_deref(), params.to.as_deref())?;
    Ok(Json(state.db.spending_by_category(from, to)?))
}

/// GET /api/reports/categories/:id - One category, optionally with its subcategories
pub async fn report_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<CategorySpending>, AppError> {
    let (from, to) = resolve_period(&params.period, params.from.as_deref(), params.to.as_deref())?;
    Ok(Json(state.db.category_spending(
        id,
        from,
        to,
        params.include_subcategories,
    )?))
}
