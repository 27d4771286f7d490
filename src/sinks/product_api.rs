use reqwest::{Client, StatusCode};
use std::path::Path;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{IngestError, Result};
use crate::sinks::UpdateSink;

/// Inventory API client announcing new product photos.
///
/// The product id is the output file stem; the call is an idempotent
/// `PUT <base>/<product_id>/photo`.
#[derive(Clone)]
pub struct ProductPhotoApi {
    client: Client,
    base_url: Url,
}

impl ProductPhotoApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            IngestError::Config(format!("API_BASE_URL is not a valid URL: {}", e))
        })?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::RemoteUpdate(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Build from config when updates are switched on
    pub fn from_config(config: &ApiConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        match Self::new(config) {
            Ok(api) => Some(api),
            Err(e) => {
                log::warn!("Product API updates disabled: {}", e);
                None
            }
        }
    }

    /// Endpoint for one product
    pub fn photo_url(&self, product_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                IngestError::RemoteUpdate(format!("{} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .push(product_id)
            .push("photo");
        Ok(url)
    }
}

impl UpdateSink for ProductPhotoApi {
    async fn photo_updated(&self, output: &Path) -> Result<()> {
        let product_id = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| {
                IngestError::RemoteUpdate(format!("{} has no file name", output.display()))
            })?;
        let url = self.photo_url(&product_id)?;

        let response = self.client.put(url).send().await.map_err(|e| {
            IngestError::RemoteUpdate(format!("Product {} update failed: {}", product_id, e))
        })?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                log::debug!("Product {} photo updated", product_id);
                Ok(())
            }
            status => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                Err(IngestError::RemoteUpdate(format!(
                    "Product {} update returned {}: {}",
                    product_id, status, body
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn api(base: &str) -> Result<ProductPhotoApi> {
        ProductPhotoApi::new(&ApiConfig {
            enabled: true,
            base_url: base.to_string(),
            timeout: Duration::from_secs(15),
        })
    }

    #[test]
    fn test_photo_url() {
        let api = api("https://erp.example.com/api/v1/products").unwrap();
        assert_eq!(
            api.photo_url("4711").unwrap().as_str(),
            "https://erp.example.com/api/v1/products/4711/photo"
        );

        let trailing = self::api("https://erp.example.com/products/").unwrap();
        assert_eq!(
            trailing.photo_url("4711").unwrap().as_str(),
            "https://erp.example.com/products/4711/photo"
        );
    }

    #[test]
    fn test_photo_url_escapes_product_id() {
        let api = api("https://erp.example.com/products").unwrap();
        assert_eq!(
            api.photo_url("12 34").unwrap().as_str(),
            "https://erp.example.com/products/12%2034/photo"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(api("not a url"), Err(IngestError::Config(_))));
    }
}
