use crate::format::AlertPayload;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SinkError {
    /// The post never reached the sink (connect failure, timeout, TLS).
    /// Distinct from a non-2xx status, which the sink did return.
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct SinkResponse {
    pub status: u16,
    pub body: String,
}

impl SinkResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote endpoint receiving formatted alert payloads.
pub trait Sink {
    async fn post(&self, payload: &AlertPayload) -> Result<SinkResponse, SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink acknowledged the payload.
    Delivered { attempts: u32 },
    /// Every attempt failed; the payload is lost.
    Exhausted { attempts: u32 },
    /// Shutdown was observed mid-delivery. Not a delivery verdict.
    Cancelled,
}

/// Bounded-retry delivery with a fixed wait between attempts.
///
/// One attempt per transition: sink-acknowledged status ends in
/// `Delivered`; a non-2xx status or transport error is logged with its
/// cause and retried until the attempt budget runs out, ending in
/// `Exhausted`. The shutdown token is observed during inter-attempt waits
/// so the daemon can stop promptly.
pub struct DeliveryClient {
    max_attempts: u32,
    retry_delay: Duration,
}

impl DeliveryClient {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub async fn deliver<S: Sink>(
        &self,
        sink: &S,
        payload: &AlertPayload,
        shutdown: &mut watch::Receiver<bool>,
    ) -> DeliveryOutcome {
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            match sink.post(payload).await {
                Ok(response) if response.is_success() => {
                    debug!(attempts, title = %payload.title, "payload delivered");
                    return DeliveryOutcome::Delivered { attempts };
                }
                Ok(response) => {
                    warn!(
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        status = response.status,
                        "sink rejected payload"
                    );
                }
                Err(err) => {
                    warn!(
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "payload post failed"
                    );
                }
            }

            if attempts >= self.max_attempts {
                return DeliveryOutcome::Exhausted { attempts };
            }

            if *shutdown.borrow() {
                return DeliveryOutcome::Cancelled;
            }
            tokio::select! {
                _ = shutdown.changed() => return DeliveryOutcome::Cancelled,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }
}
