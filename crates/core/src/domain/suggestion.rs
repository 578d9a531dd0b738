use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::store::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionId(pub String);

impl SuggestionId {
    pub fn generate() -> Self {
        Self(format!("sg-{}", uuid::Uuid::new_v4()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Expiry,
    Rupture,
    Surstock,
    Anomaly,
    Trend,
    Weather,
    ReorderReminder,
    Idea,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expiry => "expiry",
            Self::Rupture => "rupture",
            Self::Surstock => "surstock",
            Self::Anomaly => "anomaly",
            Self::Trend => "trend",
            Self::Weather => "weather",
            Self::ReorderReminder => "reorder_reminder",
            Self::Idea => "idea",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "expiry" => Some(Self::Expiry),
            "rupture" => Some(Self::Rupture),
            "surstock" => Some(Self::Surstock),
            "anomaly" => Some(Self::Anomaly),
            "trend" => Some(Self::Trend),
            "weather" => Some(Self::Weather),
            "reorder_reminder" => Some(Self::ReorderReminder),
            "idea" => Some(Self::Idea),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionDomain {
    Stock,
    Sales,
    Finance,
    Operations,
}

impl SuggestionDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Sales => "sales",
            Self::Finance => "finance",
            Self::Operations => "operations",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stock" => Some(Self::Stock),
            "sales" => Some(Self::Sales),
            "finance" => Some(Self::Finance),
            "operations" => Some(Self::Operations),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl SuggestionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Viewed,
    Dismissed,
    Acted,
    Expired,
}

impl SuggestionStatus {
    /// Statuses covered by the one-active-row-per-fingerprint rule.
    pub const ACTIVE: [SuggestionStatus; 2] = [SuggestionStatus::Pending, SuggestionStatus::Viewed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Viewed => "viewed",
            Self::Dismissed => "dismissed",
            Self::Acted => "acted",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "viewed" => Some(Self::Viewed),
            "dismissed" => Some(Self::Dismissed),
            "acted" => Some(Self::Acted),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Viewed)
    }

    pub fn can_transition_to(&self, to: SuggestionStatus) -> bool {
        match (self, to) {
            (Self::Pending, Self::Viewed) => true,
            (Self::Pending | Self::Viewed, Self::Dismissed) => true,
            (Self::Pending | Self::Viewed, Self::Acted) => true,
            (Self::Pending | Self::Viewed, Self::Expired) => true,
            _ => false,
        }
    }
}

/// Follow-up the user can trigger straight from a suggestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Reorder,
    CreatePromotion,
    UseBeforeExpiry,
    ReviewSales,
    PrepareStock,
    ContactSupplier,
    ApplyIdea,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reorder => "reorder",
            Self::CreatePromotion => "create_promotion",
            Self::UseBeforeExpiry => "use_before_expiry",
            Self::ReviewSales => "review_sales",
            Self::PrepareStock => "prepare_stock",
            Self::ContactSupplier => "contact_supplier",
            Self::ApplyIdea => "apply_idea",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reorder" => Some(Self::Reorder),
            "create_promotion" => Some(Self::CreatePromotion),
            "use_before_expiry" => Some(Self::UseBeforeExpiry),
            "review_sales" => Some(Self::ReviewSales),
            "prepare_stock" => Some(Self::PrepareStock),
            "contact_supplier" => Some(Self::ContactSupplier),
            "apply_idea" => Some(Self::ApplyIdea),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    pub user_id: UserId,
    pub suggestion_type: SuggestionType,
    pub domain: SuggestionDomain,
    pub priority: SuggestionPriority,
    pub severity_score: u8,
    pub title: String,
    pub message: String,
    pub action_type: Option<ActionType>,
    pub action_data: serde_json::Value,
    /// Advisory reference; the product may have been deleted since.
    pub product_id: Option<ProductId>,
    pub content_hash: String,
    pub status: SuggestionStatus,
    pub is_read: bool,
    pub impact_value: Option<Decimal>,
    pub action_result: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub acted_at: Option<DateTime<Utc>>,
}

impl Suggestion {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Validates a lifecycle move and returns the updated record.
    pub fn transitioned(
        &self,
        to: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> Result<Suggestion, DomainError> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidSuggestionTransition { from: self.status, to });
        }

        let mut next = self.clone();
        next.status = to;
        next.updated_at = at;
        match to {
            SuggestionStatus::Viewed => {
                next.is_read = true;
                next.viewed_at = Some(at);
            }
            SuggestionStatus::Dismissed => next.is_read = true,
            SuggestionStatus::Acted => {
                next.is_read = true;
                next.acted_at = Some(at);
            }
            SuggestionStatus::Pending | SuggestionStatus::Expired => {}
        }
        Ok(next)
    }
}
