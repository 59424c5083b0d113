use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    ContactDetails, ContactRef, CrmError, CrmGateway, CrmOperation, DealProperties, DealRef,
};

const FIRST_ID: u64 = 1001;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredContact {
    pub id: String,
    pub details: ContactDetails,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDeal {
    pub id: String,
    pub properties: DealProperties,
    pub pipeline_id: String,
    pub stage: String,
    pub contacts: Vec<String>,
}

#[derive(Default)]
struct CrmState {
    next_id: u64,
    contacts: BTreeMap<String, StoredContact>,
    deals: BTreeMap<String, StoredDeal>,
    failures: HashMap<CrmOperation, CrmError>,
    calls: Vec<CrmOperation>,
}

impl CrmState {
    fn allocate_id(&mut self) -> String {
        let id = FIRST_ID + self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    fn record(&mut self, operation: CrmOperation) -> Result<(), CrmError> {
        self.calls.push(operation);
        match self.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Process-local CRM with observable state and per-operation failure injection.
#[derive(Clone, Default)]
pub struct InMemoryCrm {
    state: Arc<Mutex<CrmState>>,
}

impl InMemoryCrm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later call of `operation` fails with `error` until cleared.
    pub fn fail_on(&self, operation: CrmOperation, error: CrmError) {
        self.lock().failures.insert(operation, error);
    }

    pub fn clear_failure(&self, operation: CrmOperation) {
        self.lock().failures.remove(&operation);
    }

    pub fn calls(&self) -> Vec<CrmOperation> {
        self.lock().calls.clone()
    }

    pub fn contacts(&self) -> Vec<StoredContact> {
        self.lock().contacts.values().cloned().collect()
    }

    pub fn deals(&self) -> Vec<StoredDeal> {
        self.lock().deals.values().cloned().collect()
    }

    pub fn deal(&self, id: &str) -> Option<StoredDeal> {
        self.lock().deals.get(id).cloned()
    }

    /// Inserts a deal directly, bypassing the call log and failure injection.
    pub fn seed_deal(&self, pipeline_id: &str, stage: &str) -> DealRef {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.deals.insert(
            id.clone(),
            StoredDeal {
                id: id.clone(),
                properties: DealProperties::new(),
                pipeline_id: pipeline_id.to_string(),
                stage: stage.to_string(),
                contacts: Vec::new(),
            },
        );
        DealRef { id }
    }

    fn lock(&self) -> MutexGuard<'_, CrmState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn not_found(kind: &str, id: &str) -> CrmError {
    CrmError::Rejected { status: 404, body: format!("{kind} {id} not found") }
}

#[async_trait]
impl CrmGateway for InMemoryCrm {
    async fn upsert_contact(&self, details: &ContactDetails) -> Result<ContactRef, CrmError> {
        let mut state = self.lock();
        state.record(CrmOperation::UpsertContact)?;

        let existing = state
            .contacts
            .values_mut()
            .find(|contact| contact.details.email == details.email);
        if let Some(contact) = existing {
            contact.details = details.clone();
            return Ok(ContactRef { id: contact.id.clone() });
        }

        let id = state.allocate_id();
        let contact = StoredContact { id: id.clone(), details: details.clone() };
        state.contacts.insert(id.clone(), contact);
        Ok(ContactRef { id })
    }

    async fn create_deal(
        &self,
        properties: &DealProperties,
        pipeline_id: &str,
        initial_stage: &str,
    ) -> Result<DealRef, CrmError> {
        let mut state = self.lock();
        state.record(CrmOperation::CreateDeal)?;

        let id = state.allocate_id();
        state.deals.insert(
            id.clone(),
            StoredDeal {
                id: id.clone(),
                properties: properties.clone(),
                pipeline_id: pipeline_id.to_string(),
                stage: initial_stage.to_string(),
                contacts: Vec::new(),
            },
        );
        Ok(DealRef { id })
    }

    async fn associate(&self, deal: &DealRef, contact: &ContactRef) -> Result<(), CrmError> {
        let mut state = self.lock();
        state.record(CrmOperation::Associate)?;

        if !state.contacts.contains_key(&contact.id) {
            return Err(not_found("contact", &contact.id));
        }
        let stored = state.deals.get_mut(&deal.id).ok_or_else(|| not_found("deal", &deal.id))?;
        if !stored.contacts.contains(&contact.id) {
            stored.contacts.push(contact.id.clone());
        }
        Ok(())
    }

    async fn set_stage(
        &self,
        deal: &DealRef,
        pipeline_id: &str,
        stage_id: &str,
    ) -> Result<(), CrmError> {
        let mut state = self.lock();
        state.record(CrmOperation::SetStage)?;

        let stored = state.deals.get_mut(&deal.id).ok_or_else(|| not_found("deal", &deal.id))?;
        stored.pipeline_id = pipeline_id.to_string();
        stored.stage = stage_id.to_string();
        Ok(())
    }
}
