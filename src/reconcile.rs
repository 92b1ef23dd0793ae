use serde_json::Value;

use crate::coerce;

/// A logical field and the physical paths it has been observed at, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationRule {
    pub field: &'static str,
    pub candidates: &'static [&'static str],
}

impl ReconciliationRule {
    pub const fn new(field: &'static str, candidates: &'static [&'static str]) -> Self {
        Self { field, candidates }
    }
}

/// Walk a dotted path. Object keys match exactly; numeric segments index arrays.
/// Any missing step yields `None`.
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(record);
    }
    path.split('.').try_fold(record, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// First candidate that resolves to a non-null value. `0`, `false` and `""` count as present.
pub fn resolve<'a>(record: &'a Value, rule: &ReconciliationRule) -> Option<&'a Value> {
    rule.candidates
        .iter()
        .filter_map(|path| lookup(record, path))
        .find(|value| !value.is_null())
}

/// Resolve then coerce. A present but non-numeric value counts as a miss.
pub fn resolve_number(record: &Value, rule: &ReconciliationRule) -> Option<f64> {
    coerce::parse_finite(resolve(record, rule))
}

/// Resolve a list-valued field. A record that is itself an array is the list.
pub fn resolve_list<'a>(record: &'a Value, rule: &ReconciliationRule) -> Option<&'a Vec<Value>> {
    if let Value::Array(items) = record {
        return Some(items);
    }
    rule.candidates
        .iter()
        .filter_map(|path| lookup(record, path))
        .find_map(Value::as_array)
}

/// Field locations observed across the backend's overview, real-time and list endpoints.
pub mod rules {
    use super::ReconciliationRule;

    pub const HEALTH_SCORE: ReconciliationRule = ReconciliationRule::new(
        "healthScore",
        &[
            "systemHealth.overallScore",
            "system_health.overall_score",
            "systemHealth.score",
            "healthScore",
            "health_score",
        ],
    );

    pub const HEALTH_STATUS: ReconciliationRule = ReconciliationRule::new(
        "healthStatus",
        &["systemHealth.status", "system_health.status"],
    );

    pub const TOTAL_BUILDINGS: ReconciliationRule = ReconciliationRule::new(
        "totalBuildings",
        &[
            "buildings.total",
            "summary.totalBuildings",
            "summary.total_buildings",
            "totalBuildings",
            "total_buildings",
        ],
    );

    pub const ACTIVE_BUILDINGS: ReconciliationRule = ReconciliationRule::new(
        "activeBuildings",
        &[
            "buildings.active",
            "summary.activeBuildings",
            "summary.active_buildings",
            "activeBuildings",
            "active_buildings",
        ],
    );

    pub const COMPLIANCE_RATE: ReconciliationRule = ReconciliationRule::new(
        "complianceRate",
        &[
            "compliance.complianceRate",
            "compliance.compliance_rate",
            "compliance.overallRate",
            "complianceRate",
            "compliance_rate",
        ],
    );

    pub const ACTIVE_ALERTS: ReconciliationRule = ReconciliationRule::new(
        "activeAlerts",
        &[
            "alerts.active",
            "alerts.activeCount",
            "alerts.active_count",
            "activeAlerts",
            "active_alerts",
        ],
    );

    pub const CRITICAL_ALERTS: ReconciliationRule = ReconciliationRule::new(
        "criticalAlerts",
        &[
            "alerts.critical",
            "alerts.criticalCount",
            "alerts.critical_count",
            "criticalAlerts",
            "critical_alerts",
        ],
    );

    pub const CURRENT_CONSUMPTION: ReconciliationRule = ReconciliationRule::new(
        "currentConsumption",
        &[
            "energy.currentConsumption",
            "energy.current_consumption",
            "currentConsumption",
            "current_consumption",
            "totalConsumption",
            "total_consumption",
        ],
    );

    pub const PREVIOUS_CONSUMPTION: ReconciliationRule = ReconciliationRule::new(
        "previousConsumption",
        &[
            "energy.previousConsumption",
            "energy.previous_consumption",
            "previousConsumption",
            "previous_consumption",
        ],
    );

    pub const CONSUMPTION_TREND: ReconciliationRule = ReconciliationRule::new(
        "consumptionTrend",
        &[
            "energy.trendPercentage",
            "energy.trend_percentage",
            "consumptionTrend",
            "consumption_trend",
            "trend.change",
        ],
    );

    pub const AUDIT_COMPLETION_RATE: ReconciliationRule = ReconciliationRule::new(
        "auditCompletionRate",
        &[
            "audits.completionRate",
            "audits.completion_rate",
            "auditCompletionRate",
            "audit_completion_rate",
        ],
    );

    pub const POWER_QUALITY: ReconciliationRule = ReconciliationRule::new(
        "powerQuality",
        &[
            "powerQuality.score",
            "power_quality.score",
            "powerQualityScore",
            "power_quality_score",
        ],
    );

    /// Where list endpoints keep their rows when the body is not a bare array.
    pub const LIST_ITEMS: ReconciliationRule = ReconciliationRule::new(
        "items",
        &["items", "data", "results", "rows"],
    );

    pub const COMPLIANCE_CHECKS: ReconciliationRule = ReconciliationRule::new(
        "checks",
        &["checks", "complianceChecks", "compliance_checks", "items", "data"],
    );

    pub const TOTAL_CHECKS: ReconciliationRule = ReconciliationRule::new(
        "totalChecks",
        &["totalChecks", "total_checks", "summary.total", "total"],
    );

    pub const COMPLIANT_CHECKS: ReconciliationRule = ReconciliationRule::new(
        "compliantChecks",
        &[
            "compliantChecks",
            "compliant_checks",
            "passedChecks",
            "passed_checks",
            "summary.compliant",
        ],
    );

    pub const RECORD_STATUS: ReconciliationRule =
        ReconciliationRule::new("status", &["status", "state"]);

    pub const RECORD_SEVERITY: ReconciliationRule =
        ReconciliationRule::new("severity", &["severity", "priority", "level"]);

    pub const RECORD_HEALTH: ReconciliationRule = ReconciliationRule::new(
        "healthScore",
        &[
            "healthScore",
            "health_score",
            "efficiencyScore",
            "efficiency_score",
        ],
    );

    pub const RECORD_CONSUMPTION: ReconciliationRule = ReconciliationRule::new(
        "consumption",
        &[
            "currentConsumption",
            "current_consumption",
            "energyConsumption",
            "energy_consumption",
            "consumption",
        ],
    );
}
