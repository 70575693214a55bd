//! Operator-facing alerts.
//!
//! Queries and mutations report outcomes through an [`AlertSink`] carried by the session. The
//! alert is a side effect: it never changes what the call returns.

use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

/// Destination for alerts raised while serving one operator.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: Alert);

    fn success(&self, message: &str) {
        self.notify(Alert {
            level: AlertLevel::Success,
            message: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.notify(Alert {
            level: AlertLevel::Error,
            message: message.to_string(),
        });
    }
}

/// Writes alerts to the log and nowhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn notify(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Error => tracing::warn!(alert = %alert.message, "operator alert"),
            AlertLevel::Success => tracing::info!(alert = %alert.message, "operator alert"),
        }
    }
}

/// Collects alerts so they can be returned with a response.
#[derive(Debug, Default)]
pub struct AlertLog {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every alert recorded so far, oldest first.
    pub fn snapshot(&self) -> Vec<Alert> {
        match self.alerts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|a| a.message).collect()
    }
}

impl AlertSink for AlertLog {
    fn notify(&self, alert: Alert) {
        tracing::debug!(level = ?alert.level, alert = %alert.message, "alert recorded");
        match self.alerts.lock() {
            Ok(mut guard) => guard.push(alert),
            Err(poisoned) => poisoned.into_inner().push(alert),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_log_keeps_order() {
        let log = AlertLog::new();
        log.error("first");
        log.success("second");

        let alerts = log.snapshot();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, AlertLevel::Error);
        assert_eq!(alerts[1].message, "second");
    }
}
