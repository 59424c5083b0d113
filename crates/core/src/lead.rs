use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Standard,
    Deep,
}

impl ServiceType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "standard" => Some(Self::Standard),
            "deep" => Some(Self::Deep),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BedroomTier {
    #[serde(rename = "studio")]
    Studio,
    #[serde(rename = "1br", alias = "p_1br")]
    OneBedroom,
    #[serde(rename = "2br", alias = "p_2br")]
    TwoBedroom,
    #[serde(rename = "3br", alias = "p_3br")]
    ThreeBedroom,
    #[serde(rename = "4br", alias = "p_4br")]
    FourBedroom,
}

impl BedroomTier {
    /// Accepts the canonical identifiers and the older `p_`-prefixed form values.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.strip_prefix("p_").unwrap_or(raw) {
            "studio" => Some(Self::Studio),
            "1br" => Some(Self::OneBedroom),
            "2br" => Some(Self::TwoBedroom),
            "3br" => Some(Self::ThreeBedroom),
            "4br" => Some(Self::FourBedroom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Studio => "studio",
            Self::OneBedroom => "1br",
            Self::TwoBedroom => "2br",
            Self::ThreeBedroom => "3br",
            Self::FourBedroom => "4br",
        }
    }

    pub fn label(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing: {0}")]
    Missing(&'static str),
    #[error("Invalid service_type")]
    InvalidServiceType,
    #[error("Invalid number_of_bedrooms")]
    InvalidBedroomTier,
}

/// Raw form submission. Fields are kept as JSON values so that validation,
/// not decoding, reports what is missing. Strings and numbers are accepted;
/// unknown keys are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub fullname: Option<Value>,
    pub email: Option<Value>,
    pub phone: Option<Value>,
    pub service_address: Option<Value>,
    pub service_type: Option<Value>,
    pub number_of_bedrooms: Option<Value>,
    pub preferred_date: Option<Value>,
    pub time_slot: Option<Value>,
    pub special_instructions: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedLead {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
    pub service_address: String,
    pub service_type: ServiceType,
    pub bedroom_tier: BedroomTier,
    pub preferred_date: String,
    pub time_slot: Option<String>,
    pub special_instructions: Option<String>,
}

impl LeadSubmission {
    pub fn validate(&self) -> Result<ValidatedLead, ValidationError> {
        let fullname = required("fullname", &self.fullname)?;
        let email = required("email", &self.email)?;
        let phone = required("phone", &self.phone)?;
        let service_address = required("service_address", &self.service_address)?;
        let service_type = required("service_type", &self.service_type)?;
        let bedrooms = required("number_of_bedrooms", &self.number_of_bedrooms)?;
        let preferred_date = required("preferred_date", &self.preferred_date)?;

        let service_type =
            ServiceType::parse(&service_type).ok_or(ValidationError::InvalidServiceType)?;
        let bedroom_tier =
            BedroomTier::parse(&bedrooms).ok_or(ValidationError::InvalidBedroomTier)?;
        let (firstname, lastname) = split_name(&fullname);

        Ok(ValidatedLead {
            firstname,
            lastname,
            email,
            phone,
            service_address,
            service_type,
            bedroom_tier,
            preferred_date,
            time_slot: optional(&self.time_slot),
            special_instructions: optional(&self.special_instructions),
        })
    }
}

impl ValidatedLead {
    pub fn full_name(&self) -> String {
        if self.lastname.is_empty() {
            self.firstname.clone()
        } else {
            format!("{} {}", self.firstname, self.lastname)
        }
    }

    pub fn date_label(&self) -> String {
        match &self.time_slot {
            Some(slot) => format!("{} ({slot})", self.preferred_date),
            None => self.preferred_date.clone(),
        }
    }
}

/// First word becomes the first name; the rest, single-spaced, the last name.
pub fn split_name(fullname: &str) -> (String, String) {
    let mut parts = fullname.split_whitespace();
    let firstname = parts.next().unwrap_or_default().to_string();
    let lastname = parts.collect::<Vec<_>>().join(" ");
    (firstname, lastname)
}

/// Trimmed text of a string or number. Anything else reads as absent.
fn scalar_text(value: &Option<Value>) -> Option<String> {
    let text = match value.as_ref()? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn required(field: &'static str, value: &Option<Value>) -> Result<String, ValidationError> {
    scalar_text(value).ok_or(ValidationError::Missing(field))
}

fn optional(value: &Option<Value>) -> Option<String> {
    scalar_text(value)
}
