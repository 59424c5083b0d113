use std::sync::Arc;

use axum::Router;
use qnc_core::config::{AppConfig, ConfigError};
use qnc_core::workflow::WorkflowSettings;
use thiserror::Error;
use tracing::info;

use crate::audit_log::TracingAuditSink;
use crate::health::{self, HealthState};
use crate::hubspot::HubSpotCrm;
use crate::routes::{self, AppState};
use crate::sendgrid::SendGridNotifier;

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("page templates failed to compile: {0}")]
    Templates(#[source] tera::Error),
}

/// Builds the application from an already loaded config. The config is
/// loaded first so logging can start before anything else runs.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        deal_id = "unknown",
        "starting application bootstrap"
    );
    config.validate()?;
    let crm = HubSpotCrm::new(&config.crm).map_err(BootstrapError::HttpClient)?;
    let notifier = SendGridNotifier::new(&config.email).map_err(BootstrapError::HttpClient)?;
    info!(
        event_name = "system.bootstrap.clients_ready",
        correlation_id = "bootstrap",
        deal_id = "unknown",
        crm_base_url = %config.crm.base_url,
        email_sandbox = config.email.sandbox,
        "crm and email clients constructed"
    );

    let state = AppState::new(
        Arc::new(crm),
        Arc::new(notifier),
        WorkflowSettings::from_config(&config),
        Arc::new(TracingAuditSink),
    )
    .map_err(BootstrapError::Templates)?;

    let router =
        routes::router(state).merge(health::router(HealthState::new(config.email.sandbox)));

    Ok(Application { config, router })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use qnc_core::config::{AppConfig, LoadOptions};
    use tower::ServiceExt;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.crm.access_token = "pat-test".to_string().into();
        config.crm.pipeline_id = "default".to_string();
        config.crm.stage_new = "appointmentscheduled".to_string();
        config.crm.stage_quote_sent = "presentationscheduled".to_string();
        config.crm.stage_accepted = "closedwon".to_string();
        config.email.api_key = "SG.test".to_string().into();
        config.email.from_email = "quotes@example.com".to_string();
        config.email.template_id = "d-123".to_string();
        config.token.secret = "bootstrap-test-secret-0123".to_string().into();
        config
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_crm_credentials() {
        let mut config = valid_config();
        config.crm.access_token = String::new().into();

        let result = bootstrap_with_config(config).await;

        let error = result.err().expect("error");
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("crm.access_token"), "unexpected message: {error}");
    }

    #[test]
    fn config_load_without_a_file_reports_the_missing_key() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/qnc.toml".into()),
            ..LoadOptions::default()
        })
        .map_err(BootstrapError::from)
        .err()
        .expect("error");

        assert!(error.to_string().contains("crm.access_token"), "unexpected message: {error}");
    }

    #[tokio::test]
    async fn bootstrapped_router_serves_health_and_api_routes() {
        let config = valid_config();
        config.validate().expect("fixture config is valid");

        let app = bootstrap_with_config(config).await.expect("bootstrap succeeds");

        let health = Request::builder().uri("/health").body(Body::empty()).expect("request");
        let response = app.router.clone().oneshot(health).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let accept = Request::builder().uri("/api/accept").body(Body::empty()).expect("request");
        let response = app.router.oneshot(accept).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
