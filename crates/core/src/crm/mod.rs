//! CRM boundary: contacts, deals, their association and pipeline stage.
//!
//! Calls are independent, unretried and never compensated. A deal that was
//! created before a later step failed stays in the CRM for an operator to
//! reconcile.

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryCrm;

/// HubSpot's built-in deal-to-contact association type.
pub const DEAL_TO_CONTACT_ASSOCIATION_TYPE: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactRef {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealRef {
    pub id: String,
}

/// Contact fields written on upsert. `email` is the exact, case-sensitive key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub phone: String,
}

pub type DealProperties = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStages {
    pub pipeline_id: String,
    pub new: String,
    pub quote_sent: String,
    pub accepted: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CrmError {
    #[error("crm unavailable: {0}")]
    Unavailable(String),
    #[error("crm rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected crm response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CrmOperation {
    UpsertContact,
    CreateDeal,
    Associate,
    SetStage,
}

impl CrmOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpsertContact => "upsert_contact",
            Self::CreateDeal => "create_deal",
            Self::Associate => "associate",
            Self::SetStage => "set_stage",
        }
    }
}

#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Finds the contact by email and patches it, or creates a new one.
    async fn upsert_contact(&self, details: &ContactDetails) -> Result<ContactRef, CrmError>;

    /// Always creates a new deal, placed in `pipeline_id` at `initial_stage`.
    async fn create_deal(
        &self,
        properties: &DealProperties,
        pipeline_id: &str,
        initial_stage: &str,
    ) -> Result<DealRef, CrmError>;

    async fn associate(&self, deal: &DealRef, contact: &ContactRef) -> Result<(), CrmError>;

    /// Idempotent: setting the stage a deal is already in succeeds.
    async fn set_stage(
        &self,
        deal: &DealRef,
        pipeline_id: &str,
        stage_id: &str,
    ) -> Result<(), CrmError>;
}

#[async_trait]
impl<T> CrmGateway for Arc<T>
where
    T: CrmGateway + ?Sized,
{
    async fn upsert_contact(&self, details: &ContactDetails) -> Result<ContactRef, CrmError> {
        (**self).upsert_contact(details).await
    }

    async fn create_deal(
        &self,
        properties: &DealProperties,
        pipeline_id: &str,
        initial_stage: &str,
    ) -> Result<DealRef, CrmError> {
        (**self).create_deal(properties, pipeline_id, initial_stage).await
    }

    async fn associate(&self, deal: &DealRef, contact: &ContactRef) -> Result<(), CrmError> {
        (**self).associate(deal, contact).await
    }

    async fn set_stage(
        &self,
        deal: &DealRef,
        pipeline_id: &str,
        stage_id: &str,
    ) -> Result<(), CrmError> {
        (**self).set_stage(deal, pipeline_id, stage_id).await
    }
}
