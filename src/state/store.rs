//! Bounded state store
//!
//! Holds the five projections. Capacity is enforced here for every insert path,
//! whichever message type produced the insert.

use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

use super::{
    resolve, Alert, AlertDraft, MonitorStatus, Mutation, Opportunity, OpportunityId,
    PriceSnapshot, Statistics,
};
use crate::error::Result;
use crate::protocol::Envelope;

/// Maximum number of opportunities retained
pub const OPPORTUNITY_CAPACITY: usize = 50;
/// Maximum number of alerts retained
pub const ALERT_CAPACITY: usize = 100;

/// Projected application state, most recent entries first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateStore {
    opportunities: VecDeque<Opportunity>,
    alerts: VecDeque<Alert>,
    monitor_status: MonitorStatus,
    prices: PriceSnapshot,
    statistics: Statistics,
    #[serde(skip)]
    opportunity_capacity: usize,
    #[serde(skip)]
    alert_capacity: usize,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_capacity(OPPORTUNITY_CAPACITY, ALERT_CAPACITY)
    }

    /// Create with custom capacities
    pub fn with_capacity(opportunity_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            opportunities: VecDeque::with_capacity(opportunity_capacity),
            alerts: VecDeque::with_capacity(alert_capacity),
            monitor_status: MonitorStatus::default(),
            prices: PriceSnapshot::default(),
            statistics: Statistics::default(),
            opportunity_capacity,
            alert_capacity,
        }
    }

    /// Resolve an envelope and apply the resulting mutations
    ///
    /// Returns true if any mutation was applied.
    pub fn apply_envelope(&mut self, envelope: &Envelope) -> Result<bool> {
        let mutations = resolve(envelope)?;
        let changed = !mutations.is_empty();
        for mutation in mutations {
            self.apply(mutation);
        }
        Ok(changed)
    }

    /// Apply a single mutation
    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::UpsertOpportunity(opportunity) => self.upsert_opportunity(opportunity),
            Mutation::SetOpportunityStatus { id, status } => {
                if let Some(existing) = self.find_opportunity_mut(&id) {
                    existing.status = status;
                }
            }
            Mutation::PushAlerts(drafts) => self.push_alerts(drafts),
            Mutation::ReplaceMonitorStatus(status) => self.monitor_status = status,
            Mutation::MergePrices(update) => self.prices.merge(update),
            Mutation::ReplaceStatistics(statistics) => self.statistics = statistics,
            Mutation::RemoveAlert(id) => self.alerts.retain(|alert| alert.id != id),
            Mutation::ClearAlerts => self.alerts.clear(),
        }
    }

    fn upsert_opportunity(&mut self, opportunity: Opportunity) {
        if let Some(existing) = self.find_opportunity_mut(&opportunity.id) {
            *existing = opportunity;
            return;
        }
        self.opportunities.push_front(opportunity);
        self.opportunities.truncate(self.opportunity_capacity);
    }

    fn push_alerts(&mut self, drafts: Vec<AlertDraft>) {
        let now = Utc::now();
        for draft in drafts.into_iter().rev() {
            self.alerts.push_front(Alert {
                id: draft.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                category: draft.category,
                message: draft.message,
                payload: draft.payload,
                timestamp: draft.timestamp.unwrap_or(now),
                level: draft.level,
            });
        }
        self.alerts.truncate(self.alert_capacity);
    }

    fn find_opportunity_mut(&mut self, id: &OpportunityId) -> Option<&mut Opportunity> {
        self.opportunities.iter_mut().find(|opp| &opp.id == id)
    }

    pub fn opportunities(&self) -> &VecDeque<Opportunity> {
        &self.opportunities
    }

    pub fn opportunity(&self, id: &OpportunityId) -> Option<&Opportunity> {
        self.opportunities.iter().find(|opp| &opp.id == id)
    }

    pub fn alerts(&self) -> &VecDeque<Alert> {
        &self.alerts
    }

    pub fn monitor_status(&self) -> &MonitorStatus {
        &self.monitor_status
    }

    pub fn prices(&self) -> &PriceSnapshot {
        &self.prices
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}
