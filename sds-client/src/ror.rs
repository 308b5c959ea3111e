//! ROR organisation registry client.

use std::time::Duration;

use reqwest::Method;
use sds_core::config::RorConfig;
use sds_core::{AppError, Health};
use url::Url;

use crate::cache::TtlCache;
use crate::client::ServiceClient;

const LOOKUP_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct RorClient {
    client: ServiceClient,
    lookups: TtlCache<String, Option<String>>,
}

fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

impl RorClient {
    pub fn new(config: &RorConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AppError::Config(format!("Invalid ROR_URL: {e}")))?;
        let health_url = crate::client::join_url(&base_url, "heartbeat");

        let client = ServiceClient::builder("ror", base_url)
            .health_url(health_url)
            .health_callback(|body| body == "OK")
            .build();
        Ok(Self {
            client,
            lookups: TtlCache::new(LOOKUP_TTL),
        })
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub async fn health(&self) -> Health {
        self.client.health().await
    }

    /// Check whether the organisation is registered in ROR and return its
    /// preferred (`ror_display`) name.
    ///
    /// The query phrase is quoted because words separated by a space would
    /// otherwise be searched with OR. A single hit wins directly; multiple
    /// hits are accepted only when exactly one display name matches the
    /// input after normalisation. Results are cached for a week.
    pub async fn is_ror_organisation(
        &self,
        organisation: &str,
    ) -> Result<Option<String>, AppError> {
        let organisation = organisation.to_string();
        self.lookups
            .get_or_load(organisation.clone(), || async move {
                let response = self
                    .client
                    .request(Method::GET, "/organizations")
                    .query("query", format!("\"{organisation}\""))
                    .send()
                    .await?
                    .into_json()?;

                let items = response
                    .get("items")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();

                let display_names = |item: &serde_json::Value| -> Vec<String> {
                    item.get("names")
                        .and_then(|v| v.as_array())
                        .map(|names| {
                            names
                                .iter()
                                .filter(|name| {
                                    name.get("types")
                                        .and_then(|t| t.as_array())
                                        .is_some_and(|types| {
                                            types.iter().any(|t| t.as_str() == Some("ror_display"))
                                        })
                                })
                                .filter_map(|name| name.get("value")?.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default()
                };

                if items.len() == 1 {
                    return Ok(display_names(&items[0]).into_iter().next());
                }

                let normalized_organisation = normalize(&organisation);
                let matched: Vec<String> = items
                    .iter()
                    .flat_map(|item| display_names(item))
                    .filter(|value| normalize(value) == normalized_organisation)
                    .collect();

                if matched.len() == 1 {
                    Ok(matched.into_iter().next())
                } else {
                    Ok(None)
                }
            })
            .await
    }
}


impl sds_core::health::HealthProbe for RorClient {
    fn name(&self) -> &str {
        "ror"
    }
    fn health(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(RorClient::health(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_matches_display_names() {
        assert_eq!(normalize("Academy of Medicine"), "academyofmedicine");
        assert_eq!(normalize("academy-of-medicine!"), "academyofmedicine");
    }
}
