use serde::{Deserialize, Serialize};

use crate::audit::AuditCategory;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteState {
    Received,
    Validated,
    Priced,
    ContactResolved,
    DealCreated,
    Associated,
    StageConfirmed,
    NotificationSent,
    Complete,
    Failed,
}

impl QuoteState {
    /// The single successor on the happy path. Terminal states have none.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Validated),
            Self::Validated => Some(Self::Priced),
            Self::Priced => Some(Self::ContactResolved),
            Self::ContactResolved => Some(Self::DealCreated),
            Self::DealCreated => Some(Self::Associated),
            Self::Associated => Some(Self::StageConfirmed),
            Self::StageConfirmed => Some(Self::NotificationSent),
            Self::NotificationSent => Some(Self::Complete),
            Self::Complete | Self::Failed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Priced => "priced",
            Self::ContactResolved => "contact_resolved",
            Self::DealCreated => "deal_created",
            Self::Associated => "associated",
            Self::StageConfirmed => "stage_confirmed",
            Self::NotificationSent => "notification_sent",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Category of the step that leaves this state.
    pub fn step_category(&self) -> AuditCategory {
        match self {
            Self::Received => AuditCategory::Intake,
            Self::Validated => AuditCategory::Pricing,
            Self::Priced | Self::ContactResolved | Self::DealCreated | Self::Associated => {
                AuditCategory::Crm
            }
            Self::StageConfirmed | Self::NotificationSent | Self::Complete | Self::Failed => {
                AuditCategory::Notification
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptState {
    Requested,
    TokenVerified,
    StageUpdated,
    Complete,
    Rejected,
    Failed,
}

impl AcceptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::TokenVerified => "token_verified",
            Self::StageUpdated => "stage_updated",
            Self::Complete => "complete",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}
