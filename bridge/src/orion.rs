use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::config::BrokerConfig;
use crate::errors::{Error, Result};
use crate::model::{AttributeSet, EntityPayload, Subscription};

pub const HEADER_SERVICE: &str = "Fiware-Service";
pub const HEADER_SERVICE_PATH: &str = "Fiware-ServicePath";
pub const HEADER_CORRELATOR: &str = "Fiware-Correlator";

/// Orion caps `limit` at 1000 per page.
pub const SUBSCRIPTION_PAGE_SIZE: usize = 1000;

/// Listing stops with an error past this many full pages.
pub const MAX_SUBSCRIPTION_PAGES: usize = 20;

/// Thin NGSI v2 client scoped to one tenant.
///
/// Each method issues exactly one request (the subscription listing may
/// page) and maps non-2xx statuses onto [`Error`].
#[derive(Debug, Clone)]
pub struct OrionClient {
    http: Client,
    config: BrokerConfig,
}

impl OrionClient {
    pub fn new(config: BrokerConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn scoped(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(HEADER_SERVICE, &self.config.service)
            .header(HEADER_SERVICE_PATH, &self.config.service_path)
    }

    /// `PATCH /v2/entities/{id}/attrs`. A 404 comes back as [`Error::NotFound`].
    pub async fn update_attrs(
        &self,
        entity_id: &str,
        attrs: &AttributeSet,
        correlator: &str,
    ) -> Result<()> {
        let url = self.config.entity_attrs_url(entity_id);
        debug!("PATCH {}", url);

        let response = self
            .scoped(self.http.patch(&url))
            .header(HEADER_CORRELATOR, correlator)
            .json(attrs)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(entity_id.to_string()));
        }
        ensure_success(response).await.map(|_| ())
    }

    /// `POST /v2/entities`.
    pub async fn create_entity(&self, payload: &EntityPayload<'_>, correlator: &str) -> Result<()> {
        let url = self.config.entities_url();
        debug!("POST {} id={}", url, payload.id);

        let response = self
            .scoped(self.http.post(&url))
            .header(HEADER_CORRELATOR, correlator)
            .json(payload)
            .send()
            .await?;

        ensure_success(response).await.map(|_| ())
    }

    /// Lists every subscription in the tenant, following pagination.
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let url = self.config.subscriptions_url();
        let mut all = Vec::new();
        let mut offset = 0;

        for _ in 0..MAX_SUBSCRIPTION_PAGES {
            debug!("GET {} offset={}", url, offset);
            let response = self
                .scoped(self.http.get(&url))
                .query(&[("limit", SUBSCRIPTION_PAGE_SIZE), ("offset", offset)])
                .send()
                .await?;

            let response = ensure_success(response).await?;
            let body = response.text().await?;
            let page: Vec<Subscription> = serde_json::from_str(&body)?;
            let page_len = page.len();
            all.extend(page);

            if page_len < SUBSCRIPTION_PAGE_SIZE {
                return Ok(all);
            }
            offset += page_len;
        }

        Err(Error::Data(format!(
            "subscription listing did not end after {} pages of {}",
            MAX_SUBSCRIPTION_PAGES, SUBSCRIPTION_PAGE_SIZE
        )))
    }

    /// `POST /v2/subscriptions`, returning the new id from `Location` when
    /// the broker sends one.
    pub async fn create_subscription(&self, subscription: &Subscription) -> Result<Option<String>> {
        let url = self.config.subscriptions_url();
        debug!("POST {}", url);

        let response = self
            .scoped(self.http.post(&url))
            .json(subscription)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(subscription_id_from(&response));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || body.contains("Already Exists") {
            return Err(Error::Conflict { status, body });
        }
        Err(Error::Http { status, body })
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Could not read error body".to_string());
    Err(Error::Http { status, body })
}

fn subscription_id_from(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|location| location.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
