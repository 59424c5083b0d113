pub mod audit;
pub mod config;
pub mod crm;
pub mod errors;
pub mod lead;
pub mod notify;
pub mod pricing;
pub mod token;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use crm::{
    ContactDetails, ContactRef, CrmError, CrmGateway, DealProperties, DealRef, InMemoryCrm,
    PipelineStages,
};
pub use errors::InterfaceError;
pub use lead::{BedroomTier, LeadSubmission, ServiceType, ValidatedLead, ValidationError};
pub use notify::{NotificationError, Notifier, QuoteEmail, QuoteTemplateData, RecordingNotifier};
pub use pricing::{PriceTable, PricingError, Quote};
pub use token::{AcceptClaims, TokenError};
pub use workflow::{
    AcceptError, AcceptOutcome, AcceptWorkflow, QuoteError, QuoteFailure, QuoteReceipt,
    QuoteWorkflow, RejectReason, WorkflowSettings,
};
