//! REST clients for the face recognition and palm-vein services.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Base URLs of the biometric services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    /// Face service root; users live under `/users/{id}`
    pub face_api: String,
    /// Palm service delete endpoint
    pub palm_api: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct PalmReply {
    status: Option<String>,
    message: Option<String>,
}

/// Calls made to external biometric services during user cleanup.
#[derive(Debug, Clone)]
pub struct BiometricServices {
    client: Client,
    urls: ServiceUrls,
}

impl BiometricServices {
    pub fn new(urls: ServiceUrls) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, urls })
    }

    /// `DELETE {face_api}/users/{face_api_id}`
    pub async fn delete_face(&self, face_api_id: &str) -> Result<(), ServiceError> {
        let url = format!("{}/users/{face_api_id}", self.urls.face_api);
        debug!(%url, "Deleting face record");

        let response = self.client.delete(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            warn!(%url, status, "Face service rejected delete");
            return Err(ServiceError::Status(status));
        }
        Ok(())
    }

    /// Ask the palm service to drop the templates of `user_id`.
    ///
    /// The service answers `{"status": "ok"}` on success.
    pub async fn delete_palm(&self, user_id: &str) -> Result<(), ServiceError> {
        debug!(url = %self.urls.palm_api, user_id, "Deleting palm data");

        let reply: PalmReply = self
            .client
            .post(&self.urls.palm_api)
            .json(&json!({ "command": "delete", "user_id": user_id }))
            .send()
            .await?
            .json()
            .await?;

        if reply.status.as_deref() == Some("ok") {
            Ok(())
        } else {
            let message = reply
                .message
                .unwrap_or_else(|| "Failed to delete palm data".to_string());
            warn!(user_id, %message, "Palm service rejected delete");
            Err(ServiceError::Rejected(message))
        }
    }
}
