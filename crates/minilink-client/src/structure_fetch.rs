//! Structure document fetch
//!
//! The structure file is not served over the WebSocket: it is a separate
//! HTTP document protected by basic auth, fetched once per session after
//! authentication. The source is a trait so deployments (and tests) can
//! supply the document some other way.

use async_trait::async_trait;
use tracing::info;

use minilink_core::{StructureFile, STRUCTURE_PATH};

use crate::error::{ClientError, Result};

/// Supplier of the miniserver structure document.
#[async_trait]
pub trait StructureSource: Send + Sync {
    async fn fetch(&self) -> Result<StructureFile>;
}

/// Default source: HTTP GET with basic authentication.
pub struct HttpStructureSource {
    host: String,
    user: String,
    password: String,
}

impl HttpStructureSource {
    pub fn new(host: &str, user: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }
}

#[async_trait]
impl StructureSource for HttpStructureSource {
    async fn fetch(&self) -> Result<StructureFile> {
        let url = format!("http://{}{}", self.host, STRUCTURE_PATH);
        info!("Fetching structure file from {}", url);

        let response = reqwest::Client::new()
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| ClientError::StructureFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClientError::StructureFetch(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json::<StructureFile>()
            .await
            .map_err(|e| ClientError::StructureFetch(e.to_string()))
    }
}
