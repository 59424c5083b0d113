use std::sync::Arc;

use secrecy::ExposeSecret;
use thiserror::Error;

use super::states::QuoteState;
use super::{accept_url, WorkflowSettings};
use crate::audit::{AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use crate::crm::{ContactDetails, ContactRef, CrmError, CrmGateway, DealProperties, DealRef};
use crate::lead::{LeadSubmission, ValidatedLead, ValidationError};
use crate::notify::{NotificationError, Notifier, QuoteEmail, QuoteTemplateData};
use crate::pricing::{PricingError, Quote};
use crate::token;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    Crm(#[from] CrmError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteReceipt {
    pub contact: ContactRef,
    pub deal: DealRef,
    pub quote: Quote,
    pub accept_url: String,
    pub trail: Vec<QuoteState>,
}

/// A run that stopped early. `failed_at` is the state whose step did not
/// complete and `last_reached` the one before it. Records already written
/// to the CRM are kept for reconciliation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("quote workflow failed at {}: {error}", .failed_at.as_str())]
pub struct QuoteFailure {
    pub failed_at: QuoteState,
    pub last_reached: QuoteState,
    #[source]
    pub error: QuoteError,
    pub contact: Option<ContactRef>,
    pub deal: Option<DealRef>,
    pub trail: Vec<QuoteState>,
}

pub struct QuoteWorkflow<C, N> {
    crm: C,
    notifier: N,
    settings: WorkflowSettings,
    audit: Arc<dyn AuditSink>,
}

impl<C, N> QuoteWorkflow<C, N>
where
    C: CrmGateway,
    N: Notifier,
{
    pub fn new(crm: C, notifier: N, settings: WorkflowSettings) -> Self {
        Self { crm, notifier, settings, audit: Arc::new(NoopAuditSink) }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn submit(
        &self,
        submission: &LeadSubmission,
        correlation_id: &str,
    ) -> Result<QuoteReceipt, QuoteFailure> {
        let stages = &self.settings.stages;
        let mut run = QuoteRun::start(correlation_id, self.audit.as_ref());

        let lead = submission.validate().map_err(|error| run.fail(error.into()))?;
        run.advance();

        let quote = self
            .settings
            .prices
            .quote(lead.service_type.as_str(), lead.bedroom_tier.as_str())
            .map_err(|error| run.fail(error.into()))?;
        run.advance();

        let contact = self
            .crm
            .upsert_contact(&contact_details(&lead))
            .await
            .map_err(|error| run.fail(error.into()))?;
        run.contact = Some(contact.clone());
        run.advance();

        let deal = self
            .crm
            .create_deal(&deal_properties(&lead, &quote), &stages.pipeline_id, &stages.new)
            .await
            .map_err(|error| run.fail(error.into()))?;
        run.deal = Some(deal.clone());
        run.advance();

        self.crm.associate(&deal, &contact).await.map_err(|error| run.fail(error.into()))?;
        run.advance();

        self.crm
            .set_stage(&deal, &stages.pipeline_id, &stages.quote_sent)
            .await
            .map_err(|error| run.fail(error.into()))?;
        run.advance();

        let token = token::mint(
            &deal.id,
            self.settings.token_ttl_secs,
            self.settings.token_secret.expose_secret().as_bytes(),
        );
        let accept_url = accept_url(&self.settings.accept_url_base, &deal.id, &token);
        let email = quote_email(&lead, &quote, &accept_url);
        self.notifier.send_quote(&email).await.map_err(|error| run.fail(error.into()))?;
        run.advance();

        Ok(QuoteReceipt { contact, deal, quote, accept_url, trail: run.complete() })
    }
}

struct QuoteRun<'a> {
    state: QuoteState,
    trail: Vec<QuoteState>,
    contact: Option<ContactRef>,
    deal: Option<DealRef>,
    correlation_id: &'a str,
    audit: &'a dyn AuditSink,
}

impl<'a> QuoteRun<'a> {
    fn start(correlation_id: &'a str, audit: &'a dyn AuditSink) -> Self {
        let run = Self {
            state: QuoteState::Received,
            trail: vec![QuoteState::Received],
            contact: None,
            deal: None,
            correlation_id,
            audit,
        };
        run.emit("quote.received", AuditOutcome::Success, run.state);
        run
    }

    fn advance(&mut self) {
        let from = self.state;
        let Some(to) = from.next() else {
            return;
        };
        self.state = to;
        self.trail.push(to);
        self.audit.emit(
            self.event(format!("quote.{}", to.as_str()), AuditOutcome::Success, from)
                .with_metadata("from", from.as_str())
                .with_metadata("to", to.as_str()),
        );
    }

    fn complete(mut self) -> Vec<QuoteState> {
        self.advance();
        self.trail
    }

    fn fail(&mut self, error: QuoteError) -> QuoteFailure {
        let last_reached = self.state;
        let failed_at = last_reached.next().unwrap_or(last_reached);
        let outcome = match &error {
            QuoteError::Validation(_) => AuditOutcome::Rejected,
            _ => AuditOutcome::Failed,
        };
        self.state = QuoteState::Failed;
        self.trail.push(QuoteState::Failed);
        self.audit.emit(
            self.event("quote.failed".to_string(), outcome, last_reached)
                .with_metadata("failed_at", failed_at.as_str())
                .with_metadata("last_reached", last_reached.as_str())
                .with_metadata("error", error.to_string()),
        );

        QuoteFailure {
            failed_at,
            last_reached,
            error,
            contact: self.contact.clone(),
            deal: self.deal.clone(),
            trail: std::mem::take(&mut self.trail),
        }
    }

    fn emit(&self, event_type: &str, outcome: AuditOutcome, step: QuoteState) {
        self.audit.emit(self.event(event_type.to_string(), outcome, step));
    }

    fn event(&self, event_type: String, outcome: AuditOutcome, step: QuoteState) -> AuditEvent {
        let event = AuditEvent::new(
            self.deal.as_ref().map(|deal| deal.id.clone()),
            self.correlation_id,
            event_type,
            step.step_category(),
            outcome,
        );
        match &self.contact {
            Some(contact) => event.with_metadata("contact_id", contact.id.clone()),
            None => event,
        }
    }
}

fn contact_details(lead: &ValidatedLead) -> ContactDetails {
    ContactDetails {
        email: lead.email.clone(),
        firstname: lead.firstname.clone(),
        lastname: lead.lastname.clone(),
        phone: lead.phone.clone(),
    }
}

fn deal_properties(lead: &ValidatedLead, quote: &Quote) -> DealProperties {
    let mut properties = DealProperties::new();
    properties.insert(
        "dealname".to_string(),
        format!("Quote {} - {}", lead.full_name(), lead.service_type.as_str()),
    );
    properties.insert("amount".to_string(), format!("{:.2}", quote.amount));
    properties.insert("service_address".to_string(), lead.service_address.clone());
    properties.insert("service_type".to_string(), lead.service_type.as_str().to_string());
    properties.insert("number_of_bedrooms".to_string(), lead.bedroom_tier.as_str().to_string());
    properties.insert("preferred_date".to_string(), lead.preferred_date.clone());
    if let Some(time_slot) = &lead.time_slot {
        properties.insert("time_slot".to_string(), time_slot.clone());
    }
    if let Some(instructions) = &lead.special_instructions {
        properties.insert("special_instructions".to_string(), instructions.clone());
    }
    properties
}

fn quote_email(lead: &ValidatedLead, quote: &Quote, accept_url: &str) -> QuoteEmail {
    QuoteEmail {
        recipient: lead.email.clone(),
        template: QuoteTemplateData {
            full_name: lead.full_name(),
            service_type: lead.service_type.as_str().to_string(),
            bedrooms: lead.bedroom_tier.label(),
            address: lead.service_address.clone(),
            date_label: lead.date_label(),
            total_formatted: quote.formatted(),
            accept_url: accept_url.to_string(),
        },
    }
}
