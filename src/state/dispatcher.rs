//! Message dispatcher
//!
//! Resolves each inbound envelope into the mutations the store must apply.
//! Resolution is pure: no I/O, no clock, no identifier minting.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::{
    AlertCategory, AlertDraft, AlertLevel, MonitorStatus, Opportunity, OpportunityId,
    OpportunityStatus, Statistics,
};
use crate::error::{Result, SyncError};
use crate::protocol::{Envelope, ExecutionReport, SystemNotice};

/// A state change produced by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Replace the opportunity with the same id in place, or prepend it
    UpsertOpportunity(Opportunity),
    /// Update the status of an existing opportunity; no-op when absent
    SetOpportunityStatus {
        id: OpportunityId,
        status: OpportunityStatus,
    },
    /// Prepend alerts as a block; the first draft ends up at the head
    PushAlerts(Vec<AlertDraft>),
    ReplaceMonitorStatus(MonitorStatus),
    MergePrices(Map<String, Value>),
    ReplaceStatistics(Statistics),
    RemoveAlert(String),
    ClearAlerts,
}

/// Alert severity for a detected spread
pub fn severity_for_spread(spread: Decimal) -> AlertLevel {
    if spread >= Decimal::ONE {
        AlertLevel::High
    } else if spread >= Decimal::new(5, 1) {
        AlertLevel::Medium
    } else {
        AlertLevel::Low
    }
}

/// Resolve an envelope into mutations
///
/// Unknown types and liveness acknowledgements resolve to no mutations. A payload
/// that does not match the shape its type requires is an error; the caller drops
/// that message and carries on.
pub fn resolve(envelope: &Envelope) -> Result<Vec<Mutation>> {
    match envelope.kind.as_str() {
        "opportunity_detected" | "new_opportunity" => {
            let opportunity: Opportunity = envelope.payload()?;
            let alert = AlertDraft::new(
                AlertCategory::Opportunity,
                format!(
                    "New opportunity: {} - spread {:.2}%",
                    opportunity.trading_pair, opportunity.spread_percentage
                ),
                envelope.data.clone(),
                severity_for_spread(opportunity.spread_percentage),
            );

            Ok(vec![
                Mutation::UpsertOpportunity(opportunity),
                Mutation::PushAlerts(vec![alert]),
            ])
        }
        "opportunity_executed" | "execution_result" => {
            let report: ExecutionReport = envelope.payload()?;
            let (status, level) = if report.success {
                (OpportunityStatus::Executed, AlertLevel::Success)
            } else {
                (OpportunityStatus::Failed, AlertLevel::Error)
            };
            let message = report.message.unwrap_or_else(|| {
                let outcome = if report.success { "executed" } else { "failed" };
                match &report.opportunity_id {
                    Some(id) => format!("Opportunity {} {}", id, outcome),
                    None => format!("Opportunity {}", outcome),
                }
            });

            let mut mutations = Vec::with_capacity(2);
            if let Some(id) = report.opportunity_id {
                mutations.push(Mutation::SetOpportunityStatus { id, status });
            }
            mutations.push(Mutation::PushAlerts(vec![AlertDraft::new(
                AlertCategory::Execution,
                message,
                envelope.data.clone(),
                level,
            )]));

            Ok(mutations)
        }
        "monitor_status" | "monitor_status_update" => Ok(vec![Mutation::ReplaceMonitorStatus(
            MonitorStatus::new(object_payload(envelope)?),
        )]),
        "price_update" => Ok(vec![Mutation::MergePrices(object_payload(envelope)?)]),
        "monitor_statistics" => Ok(vec![Mutation::ReplaceStatistics(Statistics::new(
            object_payload(envelope)?,
        ))]),
        "system_alert" => {
            let notice: SystemNotice = envelope.payload()?;
            let level = notice
                .level
                .as_deref()
                .map(AlertLevel::parse_lenient)
                .unwrap_or(AlertLevel::Info);

            Ok(vec![Mutation::PushAlerts(vec![AlertDraft::new(
                AlertCategory::System,
                notice.message.unwrap_or_else(|| "System alert".to_string()),
                envelope.data.clone(),
                level,
            )])])
        }
        "active_alerts" => {
            let entries: Vec<&Value> = match &envelope.data {
                Value::Object(map) => map.values().collect(),
                Value::Array(items) => items.iter().collect(),
                other => {
                    return Err(SyncError::ParseError(format!(
                        "active_alerts payload must be an object or array, got {}",
                        json_kind(other)
                    )))
                }
            };

            let drafts: Vec<AlertDraft> = entries.into_iter().filter_map(normalize_alert).collect();
            if drafts.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![Mutation::PushAlerts(drafts)])
        }
        "pong" | "heartbeat" => Ok(Vec::new()),
        other => {
            tracing::debug!(kind = %other, "Ignoring unknown message type");
            Ok(Vec::new())
        }
    }
}

/// Normalize one pre-existing alert from a bulk sync
fn normalize_alert(entry: &Value) -> Option<AlertDraft> {
    let Some(fields) = entry.as_object() else {
        tracing::debug!(entry = %entry, "Skipping non-object active alert");
        return None;
    };

    let payload = fields.get("data").cloned().unwrap_or(Value::Null);
    let id = payload
        .get("id")
        .and_then(id_string)
        .or_else(|| fields.get("id").and_then(id_string));

    Some(AlertDraft {
        id,
        category: fields
            .get("type")
            .and_then(Value::as_str)
            .map(AlertCategory::parse_lenient)
            .unwrap_or(AlertCategory::System),
        message: fields
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        timestamp: fields
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        level: fields
            .get("level")
            .and_then(Value::as_str)
            .map(AlertLevel::parse_lenient)
            .unwrap_or(AlertLevel::Info),
        payload,
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339, or a naive ISO timestamp assumed to be UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn object_payload(envelope: &Envelope) -> Result<Map<String, Value>> {
    match &envelope.data {
        Value::Object(fields) => Ok(fields.clone()),
        other => Err(SyncError::ParseError(format!(
            "{} payload must be an object, got {}",
            envelope.kind,
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
