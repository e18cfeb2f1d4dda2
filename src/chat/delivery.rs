use super::{ChatSink, MediaCache, OutboundMessage};
use crate::config::ChatConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// HMAC signature generator for delivery authentication
pub struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Generate HMAC signature for a delivery payload
    pub fn sign_payload(&self, timestamp: &str, body: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Acknowledgment body the transport may return on success
#[derive(Debug, Deserialize)]
struct DeliveryAck {
    /// Transport identifier assigned to media uploaded with this message
    #[serde(default)]
    media_id: Option<String>,
}

/// HTTP chat sink
///
/// Posts each outbound message to the configured transport endpoint, signed
/// with HMAC-SHA256 over `"{timestamp}.{body}"`. Media references are resolved
/// through the media cache; an identifier the transport reports back for a
/// fresh upload is memoized for the next render.
#[derive(Clone)]
pub struct HttpChatSink {
    client: reqwest::Client,
    delivery_url: String,
    signature_generator: Option<Arc<SignatureGenerator>>,
    media_cache: Arc<MediaCache>,
    max_retries: u32,
}

impl HttpChatSink {
    pub fn new(
        delivery_url: String,
        signing_secret: Option<String>,
        timeout: Duration,
        media_cache: Arc<MediaCache>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap(),
            delivery_url,
            signature_generator: signing_secret.map(|secret| Arc::new(SignatureGenerator::new(secret))),
            media_cache,
            max_retries: 3,
        }
    }

    /// Builds the sink from configuration; `None` when no delivery URL is set
    pub fn from_config(config: &ChatConfig, media_cache: Arc<MediaCache>) -> Option<Self> {
        let url = config.delivery_url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(Self::new(
            url.to_string(),
            config.signing_secret.clone(),
            Duration::from_secs(config.timeout_secs),
            media_cache,
        ))
    }

    /// Send one message with retry logic
    async fn send_with_retry(&self, message: OutboundMessage) -> Result<(), ServiceError> {
        let mut message = message;
        let original_reference = message.media.clone();
        let mut cache_hit = false;
        if let Some(reference) = original_reference.as_deref() {
            if let Some(cached) = self.media_cache.get(reference) {
                message.media = Some(cached);
                cache_hit = true;
            }
        }

        let body = serde_json::to_string(&message)?;
        let timestamp = chrono::Utc::now().to_rfc3339();

        // Generate signature if secret available
        let signature = self
            .signature_generator
            .as_ref()
            .map(|gen| gen.sign_payload(&timestamp, &body));

        // Retry logic with exponential backoff
        for attempt in 1..=self.max_retries {
            let mut request = self
                .client
                .post(&self.delivery_url)
                .header("Content-Type", "application/json")
                .header("Timestamp", &timestamp)
                .body(body.clone());

            if let Some(ref sig) = signature {
                request = request.header("Chat-Signature", sig);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    // Memoize the id the transport assigned to a fresh upload
                    if !cache_hit {
                        if let Some(reference) = original_reference {
                            if let Ok(ack) = response.json::<DeliveryAck>().await {
                                if let Some(media_id) = ack.media_id {
                                    self.media_cache.insert(reference, media_id);
                                }
                            }
                        }
                    }
                    info!(user_id = message.user_id, "Chat message delivered");
                    return Ok(());
                }
                Ok(response) => {
                    warn!(
                        "Chat delivery failed with status: {} (attempt {}/{})",
                        response.status(),
                        attempt,
                        self.max_retries
                    );
                }
                Err(e) => {
                    warn!(
                        "Chat delivery error: {} (attempt {}/{})",
                        e, attempt, self.max_retries
                    );
                }
            }

            // Exponential backoff: 1s, 2s, 4s
            if attempt < self.max_retries {
                let backoff = Duration::from_secs(2_u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }
        }

        error!(
            "Chat delivery failed after {} attempts",
            self.max_retries
        );
        Err(ServiceError::ExternalServiceError(format!(
            "Failed to deliver chat message after {} retries",
            self.max_retries
        )))
    }
}

#[async_trait]
impl ChatSink for HttpChatSink {
    #[instrument(skip(self, message), fields(user_id = message.user_id))]
    async fn deliver(&self, message: OutboundMessage) -> Result<(), ServiceError> {
        self.send_with_retry(message).await
    }
}
