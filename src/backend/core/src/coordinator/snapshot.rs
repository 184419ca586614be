//! The combined dashboard view served to the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ActivityEntry, ComplianceStatus, DashboardMetrics, Insight, Notification};

/// Cache key of the combined snapshot.
pub const SNAPSHOT_CACHE_KEY: &str = "dashboard:snapshot";

/// Prefix of every dashboard cache key; cleared after each action.
pub const DASHBOARD_CACHE_PREFIX: &str = "dashboard:";

/// Live items kept per list when pushed over the socket.
pub const MAX_LIVE_ITEMS: usize = 50;

/// Status, metrics, activity, notifications and insights in one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub status: ComplianceStatus,
    pub metrics: DashboardMetrics,
    pub events: Vec<ActivityEntry>,
    pub notifications: Vec<Notification>,
    pub insights: Vec<Insight>,
    pub fetched_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn new(
        status: ComplianceStatus,
        metrics: DashboardMetrics,
        events: Vec<ActivityEntry>,
        notifications: Vec<Notification>,
        insights: Vec<Insight>,
    ) -> Self {
        Self {
            status,
            metrics,
            events,
            notifications,
            insights,
            fetched_at: Utc::now(),
        }
    }

    /// Newest first; the oldest items fall off past [`MAX_LIVE_ITEMS`].
    pub fn push_notification(&mut self, notification: Notification) {
        self.notifications.retain(|n| n.id != notification.id);
        self.notifications.insert(0, notification);
        self.notifications.truncate(MAX_LIVE_ITEMS);
    }

    pub fn push_insight(&mut self, insight: Insight) {
        self.insights.retain(|i| i.id != insight.id);
        self.insights.insert(0, insight);
        self.insights.truncate(MAX_LIVE_ITEMS);
    }

    pub fn unread_notifications(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}
