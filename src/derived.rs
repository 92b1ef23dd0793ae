use std::collections::BTreeMap;

use serde_json::Value;

use crate::coerce;
use crate::reconcile::{self, rules, ReconciliationRule};
use crate::source::source_ids::{ALERTS, AUDITS, BUILDINGS, COMPLIANCE, OVERVIEW, REALTIME};
use crate::types::metric::{Band, Confidence, DerivedMetric, MetricUnit, Trend};
use crate::types::payload::Payload;
use crate::types::source::SourceState;

pub const DEFAULT_HEALTH_SCORE: f64 = 85.0;
pub const DEFAULT_POWER_QUALITY: f64 = 95.0;

/// Metric names as published in the snapshot.
pub mod metric_names {
    pub const HEALTH_SCORE: &str = "health_score";
    pub const TOTAL_BUILDINGS: &str = "total_buildings";
    pub const ACTIVE_BUILDINGS: &str = "active_buildings";
    pub const COMPLIANCE_RATE: &str = "compliance_rate";
    pub const ACTIVE_ALERTS: &str = "active_alerts";
    pub const CRITICAL_ALERTS: &str = "critical_alerts";
    pub const ENERGY_CONSUMPTION: &str = "energy_consumption";
    pub const CONSUMPTION_TREND: &str = "consumption_trend";
    pub const AUDIT_COMPLETION_RATE: &str = "audit_completion_rate";
    pub const POWER_QUALITY: &str = "power_quality";
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Computed {
    pub value: f64,
    pub confidence: Confidence,
}

/// Read-only view over source states. Stale data of a failing source is still usable.
pub struct MetricInputs<'a> {
    states: &'a BTreeMap<String, SourceState>,
}

impl<'a> MetricInputs<'a> {
    pub fn new(states: &'a BTreeMap<String, SourceState>) -> Self {
        Self { states }
    }

    fn payload(&self, id: &str) -> Option<&'a Payload> {
        self.states.get(id)?.data.as_ref()
    }

    fn body(&self, id: &str) -> Option<&'a Value> {
        self.payload(id).map(|p| &p.body)
    }

    fn number(&self, id: &str, rule: &ReconciliationRule) -> Option<f64> {
        reconcile::resolve_number(self.body(id)?, rule)
    }

    /// First hit across several sources, in order.
    fn number_from(&self, ids: &[&str], rule: &ReconciliationRule) -> Option<f64> {
        ids.iter().find_map(|id| self.number(id, rule))
    }

    fn list(&self, id: &str) -> Option<&'a Vec<Value>> {
        reconcile::resolve_list(self.body(id)?, &rules::LIST_ITEMS)
    }
}

/// Apply the fallback chain: reported, then recomputed, then the static default.
pub fn fallback_chain(
    reported: Option<f64>,
    recomputed: impl FnOnce() -> Option<f64>,
    default: f64,
) -> Computed {
    if let Some(value) = reported {
        return Computed {
            value,
            confidence: Confidence::Reported,
        };
    }
    if let Some(value) = recomputed() {
        return Computed {
            value,
            confidence: Confidence::Recomputed,
        };
    }
    Computed {
        value: default,
        confidence: Confidence::Default,
    }
}

fn text_lower(record: &Value, rule: &ReconciliationRule) -> Option<String> {
    reconcile::resolve(record, rule)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase())
}

fn count_matching(items: &[Value], rule: &ReconciliationRule, accepted: &[&str]) -> usize {
    items
        .iter()
        .filter(|item| text_lower(item, rule).is_some_and(|s| accepted.contains(&s.as_str())))
        .count()
}

pub fn health_score(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number(OVERVIEW, &rules::HEALTH_SCORE),
        || {
            let scores: Vec<f64> = inputs
                .list(BUILDINGS)?
                .iter()
                .filter_map(|b| reconcile::resolve_number(b, &rules::RECORD_HEALTH))
                .collect();
            if scores.is_empty() {
                return None;
            }
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            Some(coerce::round_to(mean, 2))
        },
        DEFAULT_HEALTH_SCORE,
    )
}

/// The overview's own status text for system health, if it reports one.
pub fn health_status_label(inputs: &MetricInputs) -> Option<String> {
    let raw = reconcile::resolve(inputs.body(OVERVIEW)?, &rules::HEALTH_STATUS)?;
    let text = coerce::to_text(Some(raw), "");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub fn total_buildings(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number(OVERVIEW, &rules::TOTAL_BUILDINGS),
        || {
            let paged_total = inputs
                .payload(BUILDINGS)
                .and_then(|p| p.pagination.as_ref())
                .and_then(|p| p.total);
            match paged_total {
                Some(total) => Some(total as f64),
                None => inputs.list(BUILDINGS).map(|l| l.len() as f64),
            }
        },
        0.0,
    )
}

pub fn active_buildings(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number(OVERVIEW, &rules::ACTIVE_BUILDINGS),
        || {
            let buildings = inputs.list(BUILDINGS)?;
            Some(count_matching(buildings, &rules::RECORD_STATUS, &["active"]) as f64)
        },
        0.0,
    )
}

pub fn compliance_rate(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number(OVERVIEW, &rules::COMPLIANCE_RATE),
        || {
            let body = inputs.body(COMPLIANCE)?;
            if let Some(rate) = reconcile::resolve_number(body, &rules::COMPLIANCE_RATE) {
                return Some(rate);
            }
            let summary = reconcile::resolve_number(body, &rules::COMPLIANT_CHECKS)
                .zip(reconcile::resolve_number(body, &rules::TOTAL_CHECKS))
                .and_then(|(ok, total)| coerce::ratio_percent(ok, total));
            if summary.is_some() {
                return summary.map(|r| coerce::round_to(r, 2));
            }
            let checks = reconcile::resolve_list(body, &rules::COMPLIANCE_CHECKS)?;
            let compliant = count_matching(
                checks,
                &rules::RECORD_STATUS,
                &["compliant", "passed", "pass"],
            );
            coerce::ratio_percent(compliant as f64, checks.len() as f64)
                .map(|r| coerce::round_to(r, 2))
        },
        0.0,
    )
}

fn is_active_alert(alert: &Value) -> bool {
    match text_lower(alert, &rules::RECORD_STATUS) {
        Some(status) => status == "active" || status == "open",
        None => true,
    }
}

pub fn active_alerts(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number(OVERVIEW, &rules::ACTIVE_ALERTS),
        || {
            let paged_total = inputs
                .payload(ALERTS)
                .and_then(|p| p.pagination.as_ref())
                .and_then(|p| p.total);
            if let Some(total) = paged_total {
                return Some(total as f64);
            }
            let alerts = inputs.list(ALERTS)?;
            Some(alerts.iter().filter(|a| is_active_alert(a)).count() as f64)
        },
        0.0,
    )
}

/// The recomputed count only sees the rows of the fetched page. Unlike
/// `active_alerts` there is no upstream total to fall back on, so a paginated
/// alerts source yields a lower bound.
pub fn critical_alerts(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number(OVERVIEW, &rules::CRITICAL_ALERTS),
        || {
            let alerts = inputs.list(ALERTS)?;
            let critical = alerts
                .iter()
                .filter(|a| is_active_alert(a))
                .filter(|a| text_lower(a, &rules::RECORD_SEVERITY).as_deref() == Some("critical"))
                .count();
            Some(critical as f64)
        },
        0.0,
    )
}

pub fn energy_consumption(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number_from(&[REALTIME, OVERVIEW], &rules::CURRENT_CONSUMPTION),
        || {
            let readings: Vec<f64> = inputs
                .list(BUILDINGS)?
                .iter()
                .filter_map(|b| reconcile::resolve_number(b, &rules::RECORD_CONSUMPTION))
                .collect();
            (!readings.is_empty()).then(|| coerce::round_to(readings.iter().sum::<f64>(), 2))
        },
        0.0,
    )
}

pub fn consumption_trend(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number_from(&[OVERVIEW, REALTIME], &rules::CONSUMPTION_TREND),
        || {
            let current = inputs.number(REALTIME, &rules::CURRENT_CONSUMPTION)?;
            let previous = inputs.number(REALTIME, &rules::PREVIOUS_CONSUMPTION)?;
            coerce::ratio_percent(current - previous, previous).map(|r| coerce::round_to(r, 2))
        },
        0.0,
    )
}

pub fn audit_completion_rate(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number(OVERVIEW, &rules::AUDIT_COMPLETION_RATE),
        || {
            let audits = inputs.list(AUDITS)?;
            let completed = count_matching(audits, &rules::RECORD_STATUS, &["completed", "complete"]);
            coerce::ratio_percent(completed as f64, audits.len() as f64)
                .map(|r| coerce::round_to(r, 2))
        },
        0.0,
    )
}

pub fn power_quality(inputs: &MetricInputs) -> Computed {
    fallback_chain(
        inputs.number_from(&[REALTIME, OVERVIEW], &rules::POWER_QUALITY),
        || None,
        DEFAULT_POWER_QUALITY,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoration {
    None,
    Band,
    Trend,
}

struct MetricDef {
    name: &'static str,
    unit: MetricUnit,
    depends_on: &'static [&'static str],
    compute: fn(&MetricInputs) -> Computed,
    decoration: Decoration,
    label: Option<fn(&MetricInputs) -> Option<String>>,
}

const METRICS: &[MetricDef] = &[
    MetricDef {
        name: metric_names::HEALTH_SCORE,
        unit: MetricUnit::Score,
        depends_on: &[OVERVIEW, BUILDINGS],
        compute: health_score,
        decoration: Decoration::Band,
        label: Some(health_status_label),
    },
    MetricDef {
        name: metric_names::TOTAL_BUILDINGS,
        unit: MetricUnit::Count,
        depends_on: &[OVERVIEW, BUILDINGS],
        compute: total_buildings,
        decoration: Decoration::None,
        label: None,
    },
    MetricDef {
        name: metric_names::ACTIVE_BUILDINGS,
        unit: MetricUnit::Count,
        depends_on: &[OVERVIEW, BUILDINGS],
        compute: active_buildings,
        decoration: Decoration::None,
        label: None,
    },
    MetricDef {
        name: metric_names::COMPLIANCE_RATE,
        unit: MetricUnit::Percent,
        depends_on: &[OVERVIEW, COMPLIANCE],
        compute: compliance_rate,
        decoration: Decoration::Band,
        label: None,
    },
    MetricDef {
        name: metric_names::ACTIVE_ALERTS,
        unit: MetricUnit::Count,
        depends_on: &[OVERVIEW, ALERTS],
        compute: active_alerts,
        decoration: Decoration::None,
        label: None,
    },
    MetricDef {
        name: metric_names::CRITICAL_ALERTS,
        unit: MetricUnit::Count,
        depends_on: &[OVERVIEW, ALERTS],
        compute: critical_alerts,
        decoration: Decoration::None,
        label: None,
    },
    MetricDef {
        name: metric_names::ENERGY_CONSUMPTION,
        unit: MetricUnit::KilowattHours,
        depends_on: &[REALTIME, OVERVIEW, BUILDINGS],
        compute: energy_consumption,
        decoration: Decoration::None,
        label: None,
    },
    MetricDef {
        name: metric_names::CONSUMPTION_TREND,
        unit: MetricUnit::Percent,
        depends_on: &[OVERVIEW, REALTIME],
        compute: consumption_trend,
        decoration: Decoration::Trend,
        label: None,
    },
    MetricDef {
        name: metric_names::AUDIT_COMPLETION_RATE,
        unit: MetricUnit::Percent,
        depends_on: &[OVERVIEW, AUDITS],
        compute: audit_completion_rate,
        decoration: Decoration::None,
        label: None,
    },
    MetricDef {
        name: metric_names::POWER_QUALITY,
        unit: MetricUnit::Score,
        depends_on: &[REALTIME, OVERVIEW],
        compute: power_quality,
        decoration: Decoration::Band,
        label: None,
    },
];

/// Compute every derived metric from the current source states.
pub fn compute_all(states: &BTreeMap<String, SourceState>) -> BTreeMap<String, DerivedMetric> {
    let inputs = MetricInputs::new(states);
    METRICS
        .iter()
        .map(|def| {
            let Computed { value, confidence } = (def.compute)(&inputs);
            let metric = DerivedMetric {
                name: def.name.to_string(),
                value,
                unit: def.unit,
                confidence,
                depends_on: def.depends_on.iter().map(|s| s.to_string()).collect(),
                band: (def.decoration == Decoration::Band).then(|| Band::for_score(value)),
                trend: (def.decoration == Decoration::Trend).then(|| Trend::from_delta(value)),
                label: def.label.and_then(|label| label(&inputs)),
            };
            (def.name.to_string(), metric)
        })
        .collect()
}
