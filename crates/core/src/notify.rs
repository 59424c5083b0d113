use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Variables handed to the provider-side dynamic template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTemplateData {
    pub full_name: String,
    pub service_type: String,
    pub bedrooms: String,
    pub address: String,
    pub date_label: String,
    pub total_formatted: String,
    pub accept_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteEmail {
    pub recipient: String,
    pub template: QuoteTemplateData,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("email provider unavailable: {0}")]
    Unavailable(String),
    #[error("email provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_quote(&self, email: &QuoteEmail) -> Result<(), NotificationError>;
}

#[async_trait]
impl<T> Notifier for Arc<T>
where
    T: Notifier + ?Sized,
{
    async fn send_quote(&self, email: &QuoteEmail) -> Result<(), NotificationError> {
        (**self).send_quote(email).await
    }
}

#[derive(Default)]
struct Outbox {
    sent: Vec<QuoteEmail>,
    failure: Option<NotificationError>,
}

/// Keeps every accepted message in memory; optionally fails every send.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    outbox: Arc<Mutex<Outbox>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: NotificationError) -> Self {
        let notifier = Self::default();
        notifier.lock().failure = Some(error);
        notifier
    }

    pub fn sent(&self) -> Vec<QuoteEmail> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Outbox> {
        match self.outbox.lock() {
            Ok(outbox) => outbox,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_quote(&self, email: &QuoteEmail) -> Result<(), NotificationError> {
        let mut outbox = self.lock();
        if let Some(error) = &outbox.failure {
            return Err(error.clone());
        }
        outbox.sent.push(email.clone());
        Ok(())
    }
}
