//! Alert types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    RiskThreshold,
    PriceMovement,
    HedgeRecommendation,
    System,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::RiskThreshold => "RISK_THRESHOLD",
            AlertType::PriceMovement => "PRICE_MOVEMENT",
            AlertType::HedgeRecommendation => "HEDGE_RECOMMENDATION",
            AlertType::System => "SYSTEM",
        }
    }
}

impl FromStr for AlertType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RISK_THRESHOLD" => Ok(AlertType::RiskThreshold),
            "PRICE_MOVEMENT" => Ok(AlertType::PriceMovement),
            "HEDGE_RECOMMENDATION" => Ok(AlertType::HedgeRecommendation),
            "SYSTEM" => Ok(AlertType::System),
            other => Err(Error::Decode(format!("unknown alert type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(AlertSeverity::Info),
            "WARNING" => Ok(AlertSeverity::Warning),
            "CRITICAL" => Ok(AlertSeverity::Critical),
            other => Err(Error::Decode(format!("unknown alert severity '{}'", other))),
        }
    }
}

/// A notification addressed to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub portfolio_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an alert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAlert {
    pub user_id: Uuid,
    pub portfolio_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
}

impl NewAlert {
    pub fn validate(&self) -> crate::Result<()> {
        if self.title.trim().is_empty() || self.message.trim().is_empty() {
            return Err(Error::Validation("Alert title and message are required".into()));
        }
        Ok(())
    }

    pub fn into_alert(self) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            portfolio_id: self.portfolio_id,
            alert_type: self.alert_type,
            severity: self.severity,
            title: self.title,
            message: self.message,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::Warning);
        assert!(AlertSeverity::Warning > AlertSeverity::Info);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&AlertType::HedgeRecommendation).unwrap(),
            "\"HEDGE_RECOMMENDATION\""
        );
        assert_eq!("CRITICAL".parse::<AlertSeverity>().unwrap(), AlertSeverity::Critical);
        assert!("LOUD".parse::<AlertSeverity>().is_err());
    }
}
