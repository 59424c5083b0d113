use std::sync::Arc;

use secrecy::ExposeSecret;
use thiserror::Error;

use super::states::AcceptState;
use super::WorkflowSettings;
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use crate::crm::{CrmError, CrmGateway, DealRef};
use crate::token::{self, TokenError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("missing deal id or token")]
    MissingParameters,
    #[error(transparent)]
    InvalidToken(#[from] TokenError),
    #[error("token was issued for another deal")]
    DealMismatch,
}

/// `Rejected` is the customer's problem (bad or stale link), `Failed` is ours.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AcceptError {
    #[error("acceptance rejected: {0}")]
    Rejected(RejectReason),
    #[error("acceptance failed: {0}")]
    Failed(CrmError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub deal: DealRef,
    pub trail: Vec<AcceptState>,
}

pub struct AcceptWorkflow<C> {
    crm: C,
    settings: WorkflowSettings,
    audit: Arc<dyn AuditSink>,
}

impl<C> AcceptWorkflow<C>
where
    C: CrmGateway,
{
    pub fn new(crm: C, settings: WorkflowSettings) -> Self {
        Self { crm, settings, audit: Arc::new(NoopAuditSink) }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Verifies the link and moves the deal to the accepted stage. Accepting
    /// the same link twice re-applies the same stage and succeeds again.
    pub async fn accept(
        &self,
        deal_id: Option<&str>,
        token: Option<&str>,
        correlation_id: &str,
    ) -> Result<AcceptOutcome, AcceptError> {
        let present = |value: &&str| !value.trim().is_empty();
        let deal_id = deal_id.filter(present);
        let token = token.map(str::trim).filter(|value| !value.is_empty());
        let (Some(deal_id), Some(token)) = (deal_id, token) else {
            return Err(self.reject(None, RejectReason::MissingParameters, correlation_id));
        };

        let secret = self.settings.token_secret.expose_secret();
        let claims = token::verify(token, secret.as_bytes())
            .map_err(|error| self.reject(Some(deal_id), error.into(), correlation_id))?;
        if claims.deal_id != deal_id {
            return Err(self.reject(Some(deal_id), RejectReason::DealMismatch, correlation_id));
        }
        self.emit(
            AuditEvent::new(
                Some(deal_id.to_string()),
                correlation_id,
                "accept.token_verified",
                AuditCategory::Token,
                AuditOutcome::Success,
            )
            .with_metadata("expires_at", claims.expires_at.to_string()),
        );

        let deal = DealRef { id: deal_id.to_string() };
        let stages = &self.settings.stages;
        if let Err(error) = self.crm.set_stage(&deal, &stages.pipeline_id, &stages.accepted).await
        {
            self.emit(
                AuditEvent::new(
                    Some(deal.id.clone()),
                    correlation_id,
                    "accept.failed",
                    AuditCategory::Crm,
                    AuditOutcome::Failed,
                )
                .with_metadata("failed_at", AcceptState::TokenVerified.as_str())
                .with_metadata("error", error.to_string()),
            );
            return Err(AcceptError::Failed(error));
        }

        for state in [AcceptState::StageUpdated, AcceptState::Complete] {
            self.emit(AuditEvent::new(
                Some(deal.id.clone()),
                correlation_id,
                format!("accept.{}", state.as_str()),
                AuditCategory::Acceptance,
                AuditOutcome::Success,
            ));
        }

        Ok(AcceptOutcome {
            deal,
            trail: vec![
                AcceptState::Requested,
                AcceptState::TokenVerified,
                AcceptState::StageUpdated,
                AcceptState::Complete,
            ],
        })
    }

    fn reject(
        &self,
        deal_id: Option<&str>,
        reason: RejectReason,
        correlation_id: &str,
    ) -> AcceptError {
        let category = match &reason {
            RejectReason::MissingParameters => AuditCategory::Acceptance,
            RejectReason::InvalidToken(_) | RejectReason::DealMismatch => AuditCategory::Token,
        };
        self.emit(
            AuditEvent::new(
                deal_id.map(str::to_string),
                correlation_id,
                "accept.rejected",
                category,
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", reason.to_string()),
        );
        AcceptError::Rejected(reason)
    }

    fn emit(&self, event: AuditEvent) {
        self.audit.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{AcceptError, AcceptOutcome, AcceptWorkflow, RejectReason};
    use crate::audit::{AuditOutcome, InMemoryAuditSink};
    use crate::crm::{CrmError, CrmOperation, InMemoryCrm};
    use crate::token::{self, TokenError};
    use crate::workflow::fixtures::{settings, SECRET};
    use crate::workflow::states::AcceptState;

    fn seeded() -> (InMemoryCrm, String) {
        let crm = InMemoryCrm::new();
        let deal = crm.seed_deal("default", "quote_sent");
        (crm, deal.id)
    }

    async fn accept(
        workflow: &AcceptWorkflow<InMemoryCrm>,
        deal_id: &str,
        token: &str,
    ) -> Result<AcceptOutcome, AcceptError> {
        workflow.accept(Some(deal_id), Some(token), "req").await
    }

    #[tokio::test]
    async fn valid_link_moves_deal_to_accepted() {
        let (crm, deal_id) = seeded();
        let audit = InMemoryAuditSink::default();
        let workflow =
            AcceptWorkflow::new(crm.clone(), settings()).with_audit_sink(Arc::new(audit.clone()));
        let token = token::mint(&deal_id, 3_600, SECRET.as_bytes());

        let outcome = accept(&workflow, &deal_id, &token).await.expect("accepted");

        assert_eq!(outcome.deal.id, deal_id);
        assert_eq!(outcome.trail.last(), Some(&AcceptState::Complete));
        assert_eq!(crm.deal(&deal_id).map(|deal| deal.stage), Some("accepted".to_string()));
        assert_eq!(
            audit.event_types(),
            vec!["accept.token_verified", "accept.stage_updated", "accept.complete"]
        );
        assert!(audit.events().iter().all(|event| event.correlation_id == "req"));
    }

    #[tokio::test]
    async fn accepting_twice_is_idempotent() {
        let (crm, deal_id) = seeded();
        let workflow = AcceptWorkflow::new(crm.clone(), settings());
        let token = token::mint(&deal_id, 3_600, SECRET.as_bytes());

        accept(&workflow, &deal_id, &token).await.expect("first acceptance");
        accept(&workflow, &deal_id, &token).await.expect("second acceptance");

        assert_eq!(crm.deal(&deal_id).map(|deal| deal.stage), Some("accepted".to_string()));
        assert_eq!(crm.calls(), vec![CrmOperation::SetStage, CrmOperation::SetStage]);
    }

    #[tokio::test]
    async fn missing_parameters_are_rejected_without_crm_calls() {
        let (crm, deal_id) = seeded();
        let workflow = AcceptWorkflow::new(crm.clone(), settings());

        let cases = [(None, Some("x.y.z")), (Some(deal_id.as_str()), None), (Some(" "), Some(""))];
        for (deal, token) in cases {
            let error = workflow.accept(deal, token, "req").await.expect_err("missing");
            assert_eq!(error, AcceptError::Rejected(RejectReason::MissingParameters));
        }
        assert!(crm.calls().is_empty());
    }

    #[tokio::test]
    async fn token_for_another_deal_is_a_mismatch() {
        let (crm, deal_id) = seeded();
        let other = crm.seed_deal("default", "quote_sent");
        let audit = InMemoryAuditSink::default();
        let workflow =
            AcceptWorkflow::new(crm.clone(), settings()).with_audit_sink(Arc::new(audit.clone()));
        let token = token::mint(&deal_id, 3_600, SECRET.as_bytes());

        let error = accept(&workflow, &other.id, &token).await.expect_err("mismatch");

        assert_eq!(error, AcceptError::Rejected(RejectReason::DealMismatch));
        assert_eq!(crm.deal(&other.id).map(|deal| deal.stage), Some("quote_sent".to_string()));
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
    }

    #[tokio::test]
    async fn deal_id_must_match_the_claim_exactly() {
        let (crm, deal_id) = seeded();
        let workflow = AcceptWorkflow::new(crm.clone(), settings());
        let token = token::mint(&deal_id, 3_600, SECRET.as_bytes());

        let padded = format!(" {deal_id} ");
        let error = accept(&workflow, &padded, &token).await.expect_err("padded id");

        assert_eq!(error, AcceptError::Rejected(RejectReason::DealMismatch));
        assert!(crm.calls().is_empty());
    }

    #[tokio::test]
    async fn expired_and_forged_tokens_are_rejected() {
        let (crm, deal_id) = seeded();
        let workflow = AcceptWorkflow::new(crm.clone(), settings());

        let expired = token::mint(&deal_id, -1, SECRET.as_bytes());
        let error = accept(&workflow, &deal_id, &expired).await.expect_err("expired");
        assert_eq!(error, AcceptError::Rejected(RejectReason::InvalidToken(TokenError::Expired)));

        let forged = token::mint(&deal_id, 3_600, b"someone-elses-secret-value");
        let error = accept(&workflow, &deal_id, &forged).await.expect_err("forged");
        assert_eq!(
            error,
            AcceptError::Rejected(RejectReason::InvalidToken(TokenError::BadSignature))
        );
        assert!(crm.calls().is_empty());
    }

    #[tokio::test]
    async fn crm_failure_after_verification_is_a_failure_not_a_rejection() {
        let (crm, deal_id) = seeded();
        crm.fail_on(CrmOperation::SetStage, CrmError::Unavailable("timed out".to_string()));
        let workflow = AcceptWorkflow::new(crm.clone(), settings());
        let token = token::mint(&deal_id, 3_600, SECRET.as_bytes());

        let error = accept(&workflow, &deal_id, &token).await.expect_err("crm fails");

        assert_eq!(error, AcceptError::Failed(CrmError::Unavailable("timed out".to_string())));
        assert_eq!(crm.deal(&deal_id).map(|deal| deal.stage), Some("quote_sent".to_string()));
    }
}
