//! services/dispatcher/src/adapters/whatsapp.rs
//!
//! This module contains the adapter for the Whapi-style WhatsApp gateway.
//! It implements the `MessageSender` port from the `core` crate.
//!
//! The port contract is deliberately infallible: every transport problem
//! (connection error, timeout, non-2xx status) is logged here and reported
//! as an unsuccessful send, so a flaky gateway can never abort the dispatch
//! loop.

use async_trait::async_trait;
use promo_core::ports::MessageSender;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `MessageSender` port using the Whapi
/// HTTP gateway.
#[derive(Clone)]
pub struct WhapiSender {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl WhapiSender {
    /// Creates a new `WhapiSender`.
    ///
    /// `send_timeout` bounds every gateway call; the engine itself applies no
    /// timeout of its own.
    pub fn new(base_url: String, token: String, send_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(send_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

//=========================================================================================
// `MessageSender` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessageSender for WhapiSender {
    async fn send(&self, destination: &str, caption: &str, image_url: Option<&str>) -> bool {
        // Image sends carry the caption alongside the media; plain sends go
        // through the text endpoint.
        let (endpoint, payload) = match image_url {
            Some(media) => (
                format!("{}/messages/image", self.base_url),
                json!({ "to": destination, "caption": caption, "media": media }),
            ),
            None => (
                format!("{}/messages/text", self.base_url),
                json!({ "to": destination, "body": caption }),
            ),
        };

        debug!(destination, endpoint = %endpoint, "Sending message to gateway");

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                info!(destination, "Message accepted by gateway");
                true
            }
            Ok(response) => {
                error!(
                    destination,
                    status = %response.status(),
                    "Gateway rejected message"
                );
                false
            }
            Err(e) => {
                error!(destination, error = %e, "Error sending message to gateway");
                false
            }
        }
    }
}
