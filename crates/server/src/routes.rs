//! Public HTTP surface.
//!
//! - `POST /api/lead`   validate, price, record in the CRM and email the quote (JSON)
//! - `GET  /api/accept` verify an accept link and advance the deal (HTML)

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use qnc_core::audit::AuditSink;
use qnc_core::crm::CrmGateway;
use qnc_core::lead::LeadSubmission;
use qnc_core::notify::Notifier;
use qnc_core::workflow::{
    AcceptError, AcceptWorkflow, QuoteFailure, QuoteWorkflow, RejectReason, WorkflowSettings,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tera::{Context, Tera};
use tracing::{error, info, warn};
use uuid::Uuid;

pub type SharedCrm = Arc<dyn CrmGateway>;
pub type SharedNotifier = Arc<dyn Notifier>;

const ACCEPT_TEMPLATE: &str = "accept.html";

#[derive(Clone)]
pub struct AppState {
    quotes: Arc<QuoteWorkflow<SharedCrm, SharedNotifier>>,
    acceptance: Arc<AcceptWorkflow<SharedCrm>>,
    templates: Arc<Tera>,
}

impl AppState {
    pub fn new(
        crm: SharedCrm,
        notifier: SharedNotifier,
        settings: WorkflowSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, tera::Error> {
        let quotes = QuoteWorkflow::new(crm.clone(), notifier, settings.clone())
            .with_audit_sink(audit.clone());
        let acceptance = AcceptWorkflow::new(crm, settings).with_audit_sink(audit);
        Ok(Self {
            quotes: Arc::new(quotes),
            acceptance: Arc::new(acceptance),
            templates: Arc::new(init_templates()?),
        })
    }
}

fn init_templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(ACCEPT_TEMPLATE, include_str!("../templates/accept.html"))?;
    Ok(tera)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/lead", post(submit_lead))
        .route("/api/accept", get(accept_quote))
        .with_state(state)
}

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

pub async fn submit_lead(
    State(state): State<AppState>,
    payload: Result<Json<LeadSubmission>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let correlation_id = new_correlation_id();

    let submission = match payload {
        Ok(Json(submission)) => submission,
        Err(rejection) => {
            warn!(
                event_name = "http.lead.malformed_body",
                correlation_id = %correlation_id,
                deal_id = "unknown",
                error = %rejection.body_text(),
                "lead request body could not be parsed"
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "Invalid JSON body" })),
            );
        }
    };

    match state.quotes.submit(&submission, &correlation_id).await {
        Ok(receipt) => {
            info!(
                event_name = "http.lead.quoted",
                correlation_id = %correlation_id,
                deal_id = %receipt.deal.id,
                contact_id = %receipt.contact.id,
                amount = %receipt.quote.formatted(),
                "lead quoted and emailed"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "ok": true,
                    "dealId": receipt.deal.id,
                    "contactId": receipt.contact.id,
                })),
            )
        }
        Err(failure) => lead_failure(failure, &correlation_id),
    }
}

fn lead_failure(failure: QuoteFailure, correlation_id: &str) -> (StatusCode, Json<Value>) {
    let QuoteFailure { failed_at, last_reached, error, deal, .. } = failure;
    let deal_id = deal.map(|deal| deal.id).unwrap_or_else(|| "unknown".to_string());
    let detail = error.to_string();
    let interface = error.into_interface(correlation_id);

    let status = if interface.is_client_error() {
        warn!(
            event_name = "http.lead.rejected",
            correlation_id,
            deal_id = %deal_id,
            error = %detail,
            "lead rejected"
        );
        StatusCode::BAD_REQUEST
    } else {
        error!(
            event_name = "http.lead.failed",
            correlation_id,
            deal_id = %deal_id,
            failed_at = failed_at.as_str(),
            last_reached = last_reached.as_str(),
            error = %detail,
            "lead workflow failed"
        );
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, Json(json!({ "ok": false, "error": interface.user_message() })))
}

#[derive(Debug, Default, Deserialize)]
pub struct AcceptQuery {
    pub d: Option<String>,
    pub t: Option<String>,
}

struct Page<'a> {
    title: &'a str,
    heading: &'a str,
    message: &'a str,
    tone: &'a str,
    reference: Option<&'a str>,
}

pub async fn accept_quote(
    State(state): State<AppState>,
    query: Result<Query<AcceptQuery>, QueryRejection>,
) -> (StatusCode, Html<String>) {
    let correlation_id = new_correlation_id();
    let query = query.map(|Query(query)| query).unwrap_or_default();

    let result =
        state.acceptance.accept(query.d.as_deref(), query.t.as_deref(), &correlation_id).await;

    match result {
        Ok(outcome) => {
            info!(
                event_name = "http.accept.completed",
                correlation_id = %correlation_id,
                deal_id = %outcome.deal.id,
                "quote accepted"
            );
            render(
                &state.templates,
                StatusCode::OK,
                Page {
                    title: "Quote accepted",
                    heading: "Thank you, Quote accepted",
                    message: "Your booking request has been confirmed. \
                              We'll be in touch shortly to finalize the schedule.",
                    tone: "ok",
                    reference: None,
                },
            )
        }
        Err(error) => {
            let deal_id = query.d.as_deref().unwrap_or("unknown");
            let (status, title, heading) = match &error {
                AcceptError::Rejected(RejectReason::MissingParameters) => {
                    (StatusCode::BAD_REQUEST, "Invalid request", "Invalid request")
                }
                AcceptError::Rejected(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid token", "Invalid token")
                }
                AcceptError::Failed(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Server error", "Something went wrong")
                }
            };
            if status.is_server_error() {
                error!(
                    event_name = "http.accept.failed",
                    correlation_id = %correlation_id,
                    deal_id,
                    error = %error,
                    "quote acceptance failed"
                );
            } else {
                warn!(
                    event_name = "http.accept.rejected",
                    correlation_id = %correlation_id,
                    deal_id,
                    error = %error,
                    "quote acceptance rejected"
                );
            }

            let interface = error.into_interface(correlation_id.as_str());
            let reference =
                (!interface.is_client_error()).then_some(interface.correlation_id());
            render(
                &state.templates,
                status,
                Page {
                    title,
                    heading,
                    message: interface.user_message(),
                    tone: "err",
                    reference,
                },
            )
        }
    }
}

fn render(templates: &Tera, status: StatusCode, page: Page<'_>) -> (StatusCode, Html<String>) {
    let mut context = Context::new();
    context.insert("title", page.title);
    context.insert("heading", page.heading);
    context.insert("message", page.message);
    context.insert("tone", page.tone);
    context.insert("reference", &page.reference);

    match templates.render(ACCEPT_TEMPLATE, &context) {
        Ok(html) => (status, Html(html)),
        Err(error) => {
            error!(
                event_name = "http.accept.template_error",
                correlation_id = "unknown",
                deal_id = "unknown",
                error = ?error,
                "accept page failed to render"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Something went wrong</h1>".to_string()))
        }
    }
}
