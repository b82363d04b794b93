//! Parameter and result shapes for the polled task kinds.
//!
//! These are the view-model halves of the platform's REST contracts; a
//! backend implementation maps its wire DTOs onto them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::state::TaskStatus;

/// Submission parameters for a single backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestParams {
    pub factor_id: String,
    pub universe: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Rebalance frequency, e.g. "daily" or "monthly".
    pub frequency: String,
    /// Free-form strategy parameters forwarded verbatim.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Final report of a finished backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub annual_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    /// Cumulative net value per rebalance date, for the equity chart.
    pub equity_curve: Vec<f64>,
    pub finished_at: DateTime<Utc>,
}

/// Submission parameters for a pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunParams {
    pub pipeline_id: String,
    /// Arguments forwarded to the pipeline verbatim.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Per-stage outcome inside a pipeline run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub name: String,
    pub status: TaskStatus,
    /// Tail of the stage's log, for inline display.
    #[serde(default)]
    pub log_tail: Option<String>,
}

/// Final report of a finished pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunReport {
    pub stages: Vec<PipelineStage>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtest_params_roundtrip_with_default_params() {
        let json = r#"{
            "factor_id": "momentum_12m",
            "universe": "csi500",
            "start_date": "2020-01-01",
            "end_date": "2023-12-31",
            "frequency": "monthly"
        }"#;
        let params: BacktestParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.factor_id, "momentum_12m");
        assert_eq!(params.params, serde_json::Value::Null);
    }

    #[test]
    fn pipeline_report_decodes_stage_statuses() {
        let json = r#"{
            "stages": [
                {"name": "ingest", "status": "completed"},
                {"name": "signal", "status": "failed", "log_tail": "KeyError: close"}
            ],
            "finished_at": "2024-03-01T10:00:00Z"
        }"#;
        let report: PipelineRunReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stages[1].status, TaskStatus::Failed);
    }
}
