//! Quote and acceptance workflows.
//!
//! Both are strictly sequential: each step awaits the previous one, the first
//! failing step aborts the run and nothing is compensated. Every transition
//! is reported to an [`AuditSink`](crate::audit::AuditSink).

pub mod accept;
pub mod quote;
pub mod states;

use secrecy::SecretString;

use crate::config::AppConfig;
use crate::crm::PipelineStages;
use crate::pricing::PriceTable;

pub use accept::{AcceptError, AcceptOutcome, AcceptWorkflow, RejectReason};
pub use quote::{QuoteError, QuoteFailure, QuoteReceipt, QuoteWorkflow};
pub use states::{AcceptState, QuoteState};

/// Immutable inputs shared by both workflows, built once at startup.
#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub prices: PriceTable,
    pub stages: PipelineStages,
    pub token_secret: SecretString,
    pub token_ttl_secs: i64,
    pub accept_url_base: String,
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            prices: config.pricing.clone(),
            stages: config.crm.stages(),
            token_secret: config.token.secret.clone(),
            token_ttl_secs: config.token.ttl_secs,
            accept_url_base: config.token.accept_url_base.clone(),
        }
    }
}

/// `<base>?d=<deal>&t=<token>`, appending with `&` when the base already
/// carries a query string.
pub fn accept_url(base: &str, deal_id: &str, token: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{separator}d={}&t={}",
        urlencoding::encode(deal_id),
        urlencoding::encode(token)
    )
}
