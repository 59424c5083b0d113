use qnc_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{error, info, warn, Level};

/// Forwards workflow transitions to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

fn level_for(outcome: AuditOutcome) -> Level {
    match outcome {
        AuditOutcome::Success => Level::INFO,
        AuditOutcome::Rejected => Level::WARN,
        AuditOutcome::Failed => Level::ERROR,
    }
}

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let deal_id = event.deal_id.as_deref().unwrap_or("unknown");
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match level_for(event.outcome) {
            Level::ERROR => error!(
                event_name = event.event_type.as_str(),
                correlation_id = event.correlation_id.as_str(),
                deal_id,
                category = event.category.as_str(),
                metadata = %metadata,
                "workflow step failed"
            ),
            Level::WARN => warn!(
                event_name = event.event_type.as_str(),
                correlation_id = event.correlation_id.as_str(),
                deal_id,
                category = event.category.as_str(),
                metadata = %metadata,
                "workflow request rejected"
            ),
            _ => info!(
                event_name = event.event_type.as_str(),
                correlation_id = event.correlation_id.as_str(),
                deal_id,
                category = event.category.as_str(),
                metadata = %metadata,
                "workflow state reached"
            ),
        }
    }
}
