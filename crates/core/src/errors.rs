use thiserror::Error;

use crate::token::TokenError;
use crate::workflow::{AcceptError, QuoteError, RejectReason};

/// What a caller is told. Full error detail stays in logs; only `message`
/// crosses the boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn internal(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }
}

impl QuoteError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        match self {
            Self::Validation(error) => {
                InterfaceError::bad_request(error.to_string(), correlation_id)
            }
            Self::Pricing(_) => InterfaceError::internal(
                "We could not price this service right now. Please contact us directly.",
                correlation_id,
            ),
            Self::Crm(_) => InterfaceError::internal(
                "We could not record your request. Please try again later.",
                correlation_id,
            ),
            Self::Notification(_) => InterfaceError::internal(
                "Your quote was created but the email could not be sent. We will contact you shortly.",
                correlation_id,
            ),
        }
    }
}

impl AcceptError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        match self {
            Self::Rejected(RejectReason::MissingParameters) => {
                InterfaceError::bad_request("Missing parameters.", correlation_id)
            }
            Self::Rejected(RejectReason::InvalidToken(TokenError::Expired)) => {
                InterfaceError::bad_request(
                    "This quote link has expired. Please ask us for a new quote link.",
                    correlation_id,
                )
            }
            Self::Rejected(RejectReason::InvalidToken(_) | RejectReason::DealMismatch) => {
                InterfaceError::bad_request(
                    "Please ask us for a new quote link.",
                    correlation_id,
                )
            }
            Self::Failed(_) => InterfaceError::internal("Please try again later.", correlation_id),
        }
    }
}
