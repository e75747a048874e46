/// Core data types for dashboard snapshots
///
/// These types match the JSON body served by the metrics endpoint
/// at http://127.0.0.1:5000/api/data

use serde::{Deserialize, Deserializer, Serialize};

/// One complete set of metrics from a successful poll
///
/// Replaced wholesale on every successful fetch or cache hit. Missing or
/// `null` numeric fields read as zero so a partial payload never fails a cycle.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Snapshot {
    /// Headline cookie count
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub cookie_count: f64,
    /// Account equity in base currency units
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub equity: f64,
    /// Unrealized PnL expressed in cookies (signed)
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub unrealized_pnl_cookies: f64,
    /// Maintenance margin usage, 0-100
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub maintenance_margin_percentage: f64,
    /// Effective account leverage
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub effective_leverage: f64,
    /// Trend chart points, chronological
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub chart_data: Vec<ChartPoint>,
    /// Human readable PnL breakdown
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub pnl_lines: Vec<PnlLine>,
    /// Headline PnL class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl_class: Option<PnlClass>,
    /// Headline PnL percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl_percentage: Option<f64>,
}

/// A single point on the trend chart
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChartPoint {
    #[serde(alias = "x", default)]
    pub timestamp: ChartTime,
    #[serde(alias = "y", default, deserialize_with = "f64_or_zero")]
    pub value: f64,
}

/// Chart x-axis value: epoch millis or a preformatted timestamp string
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChartTime {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl Default for ChartTime {
    fn default() -> Self {
        ChartTime::Millis(0)
    }
}

/// One line of the PnL breakdown
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PnlLine {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub class: PnlClass,
}

/// Gain/loss classification used for styling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum PnlClass {
    Gain,
    Loss,
    #[default]
    Neutral,
}

impl PnlClass {
    /// Convert to wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            PnlClass::Gain => "gain",
            PnlClass::Loss => "loss",
            PnlClass::Neutral => "neutral",
        }
    }
}

impl From<String> for PnlClass {
    fn from(value: String) -> Self {
        match value.as_str() {
            "gain" => PnlClass::Gain,
            "loss" => PnlClass::Loss,
            _ => PnlClass::Neutral,
        }
    }
}

impl From<PnlClass> for String {
    fn from(value: PnlClass) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for PnlClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn f64_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

fn vec_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let json = r##"{
            "cookie_count": 42.5,
            "equity": 42500.0,
            "unrealized_pnl_cookies": -1.25,
            "maintenance_margin_percentage": 12.0,
            "effective_leverage": 3.4,
            "chart_data": [{"x": 1700000000000, "y": 41.0}, {"timestamp": "2026-10-16T09:00:00", "value": 42.0}],
            "pnl_lines": [{"text": "+1.00 cookies in the last hour", "class": "gain", "color": "#4CAF50"}],
            "pnl_class": "gain",
            "pnl_text": "ignored"
        }"##;

        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.cookie_count, 42.5);
        assert_eq!(snapshot.unrealized_pnl_cookies, -1.25);
        assert_eq!(snapshot.chart_data.len(), 2);
        assert_eq!(snapshot.chart_data[0].timestamp, ChartTime::Millis(1700000000000));
        assert_eq!(
            snapshot.chart_data[1].timestamp,
            ChartTime::Text("2026-10-16T09:00:00".to_string())
        );
        assert_eq!(snapshot.chart_data[1].value, 42.0);
        assert_eq!(snapshot.pnl_lines[0].class, PnlClass::Gain);
        assert_eq!(snapshot.pnl_class, Some(PnlClass::Gain));
    }

    #[test]
    fn test_missing_and_null_fields_default_to_zero() {
        let json = r#"{"cookie_count": 7, "equity": null, "chart_data": null}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.cookie_count, 7.0);
        assert_eq!(snapshot.equity, 0.0);
        assert_eq!(snapshot.effective_leverage, 0.0);
        assert!(snapshot.chart_data.is_empty());
        assert!(snapshot.pnl_lines.is_empty());
        assert_eq!(snapshot.pnl_class, None);
    }

    #[test]
    fn test_unknown_pnl_class_is_neutral() {
        let line: PnlLine = serde_json::from_str(r#"{"text": "flat", "class": "sideways"}"#).unwrap();
        assert_eq!(line.class, PnlClass::Neutral);
        assert_eq!(PnlClass::Loss.to_string(), "loss");
    }
}
