//! HubSpot REST implementation of [`CrmGateway`].
//!
//! One bearer-authenticated `reqwest::Client` with a client-wide timeout;
//! no retries. Non-2xx answers keep their body for operator logs.

use std::time::Duration;

use async_trait::async_trait;
use qnc_core::config::CrmConfig;
use qnc_core::crm::{ContactDetails, ContactRef, CrmError, CrmGateway, DealProperties, DealRef};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Clone)]
pub struct HubSpotCrm {
    client: Client,
    base_url: String,
    access_token: SecretString,
    association_type_id: u32,
}

#[derive(Debug, Deserialize)]
struct ObjectId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ObjectId>,
}

impl HubSpotCrm {
    pub fn new(config: &CrmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            association_type_id: config.association_type_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.access_token.expose_secret())
    }

    async fn execute(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Response, CrmError> {
        let response = self.authorized(request).send().await.map_err(|error| {
            CrmError::Unavailable(format!("hubspot {operation} request failed: {error}"))
        })?;

        let status = response.status();
        debug!(event_name = "crm.hubspot.response", operation, status = status.as_u16());
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CrmError::Rejected { status: status.as_u16(), body })
    }

    async fn execute_json<T>(&self, operation: &str, request: RequestBuilder) -> Result<T, CrmError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.execute(operation, request).await?;
        response.json::<T>().await.map_err(|error| {
            CrmError::UnexpectedResponse(format!("hubspot {operation} response: {error}"))
        })
    }

    async fn find_contact(&self, email: &str) -> Result<Option<ContactRef>, CrmError> {
        let body = json!({
            "filterGroups": [{
                "filters": [{ "propertyName": "email", "operator": "EQ", "value": email }]
            }],
            "properties": ["email"],
            "limit": 1,
        });
        let request = self.client.post(self.url("/crm/v3/objects/contacts/search")).json(&body);
        let found: SearchResponse = self.execute_json("contact search", request).await?;

        Ok(found.results.into_iter().next().map(|contact| ContactRef { id: contact.id }))
    }
}

fn contact_properties(details: &ContactDetails) -> Value {
    json!({
        "email": details.email,
        "firstname": details.firstname,
        "lastname": details.lastname,
        "phone": details.phone,
    })
}

#[async_trait]
impl CrmGateway for HubSpotCrm {
    async fn upsert_contact(&self, details: &ContactDetails) -> Result<ContactRef, CrmError> {
        if let Some(existing) = self.find_contact(&details.email).await? {
            let body = json!({ "properties": {
                "firstname": details.firstname,
                "lastname": details.lastname,
                "phone": details.phone,
            }});
            let request = self
                .client
                .patch(self.url(&format!("/crm/v3/objects/contacts/{}", existing.id)))
                .json(&body);
            self.execute("contact update", request).await?;
            return Ok(existing);
        }

        let body = json!({ "properties": contact_properties(details) });
        let request = self.client.post(self.url("/crm/v3/objects/contacts")).json(&body);
        let created: ObjectId = self.execute_json("contact create", request).await?;
        Ok(ContactRef { id: created.id })
    }

    async fn create_deal(
        &self,
        properties: &DealProperties,
        pipeline_id: &str,
        initial_stage: &str,
    ) -> Result<DealRef, CrmError> {
        let mut properties = properties.clone();
        properties.insert("pipeline".to_string(), pipeline_id.to_string());
        properties.insert("dealstage".to_string(), initial_stage.to_string());

        let request = self
            .client
            .post(self.url("/crm/v3/objects/deals"))
            .json(&json!({ "properties": properties }));
        let created: ObjectId = self.execute_json("deal create", request).await?;
        Ok(DealRef { id: created.id })
    }

    async fn associate(&self, deal: &DealRef, contact: &ContactRef) -> Result<(), CrmError> {
        let body = json!([{
            "associationCategory": "HUBSPOT_DEFINED",
            "associationTypeId": self.association_type_id,
        }]);
        let path =
            format!("/crm/v4/objects/deals/{}/associations/contacts/{}", deal.id, contact.id);
        let request = self.client.put(self.url(&path)).json(&body);
        self.execute("deal association", request).await?;
        Ok(())
    }

    async fn set_stage(
        &self,
        deal: &DealRef,
        pipeline_id: &str,
        stage_id: &str,
    ) -> Result<(), CrmError> {
        let body = json!({ "properties": { "pipeline": pipeline_id, "dealstage": stage_id } });
        let request =
            self.client.patch(self.url(&format!("/crm/v3/objects/deals/{}", deal.id))).json(&body);
        self.execute("deal stage update", request).await?;
        Ok(())
    }
}
