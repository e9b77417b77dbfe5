//! Quantification subsystem: numeric risk, variance, backtest and scenario
//! safety scores. Strictly numeric output.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parliament_compliance::{LogicError, SubsystemLogic};
use parliament_memory::MemoryStore;
use parliament_types::{AuditEventType, SubsystemId, SubsystemIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Event type of the score records the historical comparison reads back.
pub const RISK_ANALYSIS_EVENT: &str = "risk_analysis";

const HISTORY_DAYS: i64 = 30;
const NARRATIVE_VOCABULARY: [&str; 5] = ["story", "mythos", "aesthetic", "symbolic", "beautiful"];

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance; zero below two points.
fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Risk,
    Variance,
    Backtest,
    ScenarioSafety,
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisType::Risk => "risk",
            AnalysisType::Variance => "variance",
            AnalysisType::Backtest => "backtest",
            AnalysisType::ScenarioSafety => "scenario_safety",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// Lowest level whose ceiling the score does not exceed.
    pub fn from_score(score: f64) -> Self {
        if score <= 0.3 {
            RiskLevel::Low
        } else if score <= 0.6 {
            RiskLevel::Moderate
        } else if score <= 0.85 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub outcome: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioEstimate {
    #[serde(default)]
    pub probability: f64,
    #[serde(default = "ScenarioEstimate::default_quality")]
    pub outcome_quality: f64,
}

impl ScenarioEstimate {
    fn default_quality() -> f64 {
        0.5
    }
}

/// Analysis data; each analysis reads the fields it needs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerData {
    #[serde(default)]
    pub complexity: f64,
    #[serde(default)]
    pub uncertainty: Option<f64>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub timeline_days: Option<f64>,
    #[serde(default)]
    pub time_series: Vec<SeriesPoint>,
    #[serde(default)]
    pub historical_data: Vec<TradeOutcome>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioEstimate>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerParameters {
    #[serde(default = "LedgerParameters::default_safety_threshold")]
    pub safety_threshold: f64,
}

impl LedgerParameters {
    fn default_safety_threshold() -> f64 {
        0.7
    }
}

impl Default for LedgerParameters {
    fn default() -> Self {
        Self {
            safety_threshold: Self::default_safety_threshold(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerInput {
    pub analysis_type: AnalysisType,
    #[serde(default)]
    pub data: LedgerData,
    #[serde(default)]
    pub parameters: LedgerParameters,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarianceData {
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub trend: String,
    pub data_points: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(rename = "type")]
    pub kind: AnalysisType,
    pub risk_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<(f64, f64)>,
    pub metrics: Value,
    pub recommendations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalComparison {
    pub baseline_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_std_dev: Option<f64>,
    pub data_points: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerOutput {
    pub analysis: Analysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance_data: Option<VarianceData>,
    pub historical_comparison: HistoricalComparison,
}

pub struct LedgerLogic {
    store: Arc<dyn MemoryStore>,
}

impl LedgerLogic {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    /// Mean of the complexity, uncertainty, dependency and timeline
    /// pressure factors that apply.
    pub fn quantify_risk(data: &LedgerData) -> Analysis {
        let mut factors = Vec::new();

        if data.complexity > 0.0 {
            factors.push(RiskFactor {
                factor: "complexity".into(),
                score: (data.complexity / 10.0).min(1.0),
            });
        }
        factors.push(RiskFactor {
            factor: "uncertainty".into(),
            score: data.uncertainty.unwrap_or(0.5),
        });
        let dependency_risk = (data.dependencies.len() as f64 / 5.0).min(1.0);
        if !data.dependencies.is_empty() {
            factors.push(RiskFactor {
                factor: "dependencies".into(),
                score: dependency_risk,
            });
        }
        let timeline_days = data.timeline_days.unwrap_or(30.0);
        let timeline_risk = (1.0 - timeline_days / 90.0).max(0.0);
        factors.push(RiskFactor {
            factor: "timeline_pressure".into(),
            score: timeline_risk,
        });

        let assessed = factors.len();
        let score = factors.iter().map(|f| f.score).sum::<f64>() / assessed as f64;

        let mut recommendations = Vec::new();
        if score > 0.7 {
            recommendations.push(format!(
                "Risk score {:.2} exceeds threshold. Recommend mitigation.",
                score
            ));
        }
        if dependency_risk > 0.6 {
            recommendations.push(format!(
                "{} dependencies detected. Consider dependency reduction.",
                data.dependencies.len()
            ));
        }
        if timeline_risk > 0.5 {
            recommendations.push(format!(
                "Timeline of {} days compressed. Recommend buffer extension.",
                timeline_days
            ));
        }

        Analysis {
            kind: AnalysisType::Risk,
            risk_score: round3(score),
            risk_level: Some(RiskLevel::from_score(score)),
            confidence_interval: Some(((score - 0.1).max(0.0), (score + 0.1).min(1.0))),
            metrics: json!({
                "risk_factors": factors,
                "total_factors_assessed": assessed,
            }),
            recommendations,
        }
    }

    pub fn track_variance(data: &LedgerData) -> (Analysis, Option<VarianceData>) {
        let values: Vec<f64> = data.time_series.iter().map(|p| p.value).collect();
        if values.len() < 2 {
            let analysis = Analysis {
                kind: AnalysisType::Variance,
                risk_score: 0.5,
                risk_level: None,
                confidence_interval: None,
                metrics: json!({ "error": "Insufficient data for variance calculation" }),
                recommendations: Vec::new(),
            };
            return (analysis, None);
        }

        let m = mean(&values);
        let variance = sample_variance(&values);
        let std_dev = variance.sqrt();
        let cv = if m != 0.0 { std_dev / m.abs() } else { 0.0 };
        let trend = if values.len() >= 3 {
            let recent = mean(&values[values.len() - 3..]);
            let older = mean(&values[..3]);
            if recent > older { "increasing" } else { "decreasing" }
        } else {
            "insufficient_data"
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variability = if cv > 0.3 {
            "high"
        } else if cv > 0.15 {
            "moderate"
        } else {
            "low"
        };

        let analysis = Analysis {
            kind: AnalysisType::Variance,
            risk_score: round3(cv.min(1.0)),
            risk_level: None,
            confidence_interval: None,
            metrics: json!({ "min": min, "max": max, "range": max - min }),
            recommendations: vec![format!("CV of {:.2} indicates {} variability", cv, variability)],
        };
        let variance_data = VarianceData {
            mean: round3(m),
            variance: round3(variance),
            std_dev: round3(std_dev),
            coefficient_of_variation: round3(cv),
            trend: trend.to_string(),
            data_points: values.len(),
        };
        (analysis, Some(variance_data))
    }

    /// Risk is the loss rate over the historical outcomes.
    pub fn backtest(data: &LedgerData) -> Analysis {
        if data.historical_data.is_empty() {
            return Analysis {
                kind: AnalysisType::Backtest,
                risk_score: 0.5,
                risk_level: None,
                confidence_interval: None,
                metrics: json!({ "error": "No historical data provided" }),
                recommendations: vec!["Insufficient data for backtesting".to_string()],
            };
        }

        let total = data.historical_data.len();
        let wins = data.historical_data.iter().filter(|t| t.outcome > 0.0).count();
        let total_return: f64 = data.historical_data.iter().map(|t| t.outcome).sum();
        let win_rate = wins as f64 / total as f64;
        let avg_return = total_return / total as f64;

        Analysis {
            kind: AnalysisType::Backtest,
            risk_score: round3(1.0 - win_rate),
            risk_level: None,
            confidence_interval: None,
            metrics: json!({
                "total_trades": total,
                "wins": wins,
                "losses": total - wins,
                "win_rate": round3(win_rate),
                "avg_return": round3(avg_return),
                "total_return": round3(total_return),
            }),
            recommendations: vec![
                format!(
                    "Win rate of {:.1}% {} threshold",
                    win_rate * 100.0,
                    if win_rate > 0.5 { "meets" } else { "below" }
                ),
                format!("Average return per trade: {:.3}", avg_return),
            ],
        }
    }

    /// A scenario is safe when probability times outcome quality reaches the
    /// threshold; risk is the unsafe share.
    pub fn scenario_safety(data: &LedgerData, parameters: &LedgerParameters) -> Analysis {
        if data.scenarios.is_empty() {
            return Analysis {
                kind: AnalysisType::ScenarioSafety,
                risk_score: 0.5,
                risk_level: None,
                confidence_interval: None,
                metrics: json!({ "error": "No scenarios provided" }),
                recommendations: Vec::new(),
            };
        }

        let total = data.scenarios.len();
        let safe = data
            .scenarios
            .iter()
            .filter(|s| s.probability * s.outcome_quality >= parameters.safety_threshold)
            .count();
        let safety_rate = safe as f64 / total as f64;

        Analysis {
            kind: AnalysisType::ScenarioSafety,
            risk_score: round3(1.0 - safety_rate),
            risk_level: None,
            confidence_interval: None,
            metrics: json!({
                "total_scenarios": total,
                "safe_scenarios": safe,
                "unsafe_scenarios": total - safe,
                "safety_rate": round3(safety_rate),
            }),
            recommendations: vec![
                format!("{:.0}% of scenarios meet safety threshold", safety_rate * 100.0),
                if safety_rate > 0.7 {
                    "Acceptable risk profile".to_string()
                } else {
                    "Review required".to_string()
                },
            ],
        }
    }

    async fn historical_comparison(&self) -> Result<HistoricalComparison, LogicError> {
        let scores = self
            .store
            .read_recent_decision_scores(
                SubsystemId::Ledger,
                &AuditEventType::Other(RISK_ANALYSIS_EVENT.to_string()),
                chrono::Duration::days(HISTORY_DAYS),
            )
            .await?;
        if scores.is_empty() {
            return Ok(HistoricalComparison {
                baseline_available: false,
                baseline_mean: None,
                baseline_std_dev: None,
                data_points: 0,
            });
        }
        Ok(HistoricalComparison {
            baseline_available: true,
            baseline_mean: Some(round3(mean(&scores))),
            baseline_std_dev: Some(round3(sample_variance(&scores).sqrt())),
            data_points: scores.len(),
        })
    }
}

#[async_trait]
impl SubsystemLogic for LedgerLogic {
    type Input = LedgerInput;
    type Output = LedgerOutput;

    fn id(&self) -> SubsystemId {
        SubsystemId::Ledger
    }

    async fn process(&self, input: &LedgerInput) -> Result<LedgerOutput, LogicError> {
        let data = &input.data;
        if let Some(uncertainty) = data.uncertainty {
            if !(0.0..=1.0).contains(&uncertainty) {
                return Err(LogicError::InvalidInput(format!(
                    "uncertainty {} outside [0, 1]",
                    uncertainty
                )));
            }
        }

        let (analysis, variance_data) = match input.analysis_type {
            AnalysisType::Risk => (Self::quantify_risk(data), None),
            AnalysisType::Variance => Self::track_variance(data),
            AnalysisType::Backtest => (Self::backtest(data), None),
            AnalysisType::ScenarioSafety => (Self::scenario_safety(data, &input.parameters), None),
        };

        // Compare against history before this score joins it.
        let historical_comparison = self.historical_comparison().await?;
        self.store
            .append_audit_record(
                SubsystemId::Ledger,
                AuditEventType::Other(RISK_ANALYSIS_EVENT.to_string()),
                None,
                json!({
                    "analysis_type": input.analysis_type,
                    "score": analysis.risk_score,
                }),
                None,
            )
            .await?;

        debug!(
            analysis_type = %input.analysis_type,
            risk_score = analysis.risk_score,
            baseline = historical_comparison.baseline_available,
            "Analysis complete"
        );
        Ok(LedgerOutput {
            analysis,
            variance_data,
            historical_comparison,
        })
    }

    fn check_output(&self, _identity: &SubsystemIdentity, output: &LedgerOutput) -> Result<(), String> {
        let score = output.analysis.risk_score;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(format!("risk score {} is not a probability", score));
        }
        for recommendation in &output.analysis.recommendations {
            let lower = recommendation.to_lowercase();
            if let Some(keyword) = NARRATIVE_VOCABULARY.iter().find(|k| lower.contains(*k)) {
                warn!(keyword, "Narrative vocabulary in numeric recommendation");
                return Err(format!("recommendation uses narrative language: {}", keyword));
            }
        }
        Ok(())
    }
}
