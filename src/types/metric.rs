use serde::{Deserialize, Serialize};

/// Where a derived value came from. Ordered from most to least trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Read directly from an overview-class source.
    Reported,
    /// Recomputed locally from finer-grained sources.
    Recomputed,
    /// Static placeholder.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    Score,
    Percent,
    Count,
    KilowattHours,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Success,
    Warning,
    Danger,
}

impl Band {
    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            Band::Success
        } else if score >= 70.0 {
            Band::Warning
        } else {
            Band::Danger
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Trend::Up
        } else if delta < 0.0 {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetric {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub confidence: Confidence,
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    /// Upstream status text shown beside the value, e.g. "good".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DerivedMetric {
    pub fn is_placeholder(&self) -> bool {
        self.confidence == Confidence::Default
    }
}
