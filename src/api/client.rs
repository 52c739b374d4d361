//! HTTP implementation of the resource-listing boundary.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use url::Url;

use crate::config::Config;

use super::{ApiRecord, ResourceApi, ResourceType};

const PAGE_SIZE: usize = 100;
/// Hard stop for runaway pagination on misbehaving endpoints.
const MAX_PAGES: usize = 50;

/// Resource lister over a JSON:API-flavored HTTP surface.
#[derive(Clone)]
pub struct HttpResourceApi {
  http: reqwest::Client,
  base: Url,
  token: String,
  organization_id: String,
}

#[derive(Deserialize)]
struct ListResponse {
  #[serde(default)]
  data: Vec<ApiRecord>,
}

impl HttpResourceApi {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let base = Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.api.base_url, e))?;

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      token,
      organization_id: config.api.organization_id.clone(),
    })
  }

  async fn fetch_page(
    &self,
    kind: ResourceType,
    filter: &[(&str, &str)],
    page: usize,
  ) -> Result<Vec<ApiRecord>> {
    let url = self
      .base
      .join(kind.api_path())
      .map_err(|e| eyre!("Failed to build URL for {}: {}", kind.api_path(), e))?;

    let mut query: Vec<(String, String)> = filter
      .iter()
      .map(|(field, value)| (format!("filter[{}]", field), (*value).to_string()))
      .collect();
    query.push(("page[number]".to_string(), page.to_string()));
    query.push(("page[size]".to_string(), PAGE_SIZE.to_string()));

    let response = self
      .http
      .get(url)
      .bearer_auth(&self.token)
      .header("X-Organization-Id", &self.organization_id)
      .query(&query)
      .send()
      .await
      .map_err(|e| eyre!("Failed to list {}: {}", kind.api_path(), e))?
      .error_for_status()
      .map_err(|e| eyre!("Listing {} failed: {}", kind.api_path(), e))?;

    let body: ListResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {} response: {}", kind.api_path(), e))?;

    Ok(body.data)
  }
}

#[async_trait]
impl ResourceApi for HttpResourceApi {
  async fn list(&self, kind: ResourceType, filter: &[(&str, &str)]) -> Result<Vec<ApiRecord>> {
    let mut all = Vec::new();

    for page in 1..=MAX_PAGES {
      let batch = self.fetch_page(kind, filter, page).await?;
      let full_page = batch.len() >= PAGE_SIZE;
      all.extend(batch);

      if !full_page {
        break;
      }
    }

    Ok(all)
  }
}
