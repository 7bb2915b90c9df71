use crate::delivery::{Sink, SinkError, SinkResponse};
use crate::format::AlertPayload;
use reqwest::Client;
use serde::Serialize;

/// Slack-compatible message sink: one JSON post per payload, bearer-token
/// authenticated.
pub struct SlackSink {
    client: Client,
    endpoint: String,
    token: String,
    channel: String,
}

#[derive(Serialize)]
struct SlackMessage<'a> {
    channel: &'a str,
    text: String,
}

impl SlackSink {
    pub fn new(endpoint: String, token: String, channel: String) -> Self {
        let client = Client::builder()
            .user_agent("hostmond/0.1.0")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint,
            token,
            channel,
        }
    }
}

impl Sink for SlackSink {
    async fn post(&self, payload: &AlertPayload) -> Result<SinkResponse, SinkError> {
        let message = SlackMessage {
            channel: &self.channel,
            text: render_text(payload),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&message)
            .send()
            .await
            .map_err(|err| SinkError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(SinkResponse { status, body })
    }
}

fn render_text(payload: &AlertPayload) -> String {
    if payload.title.is_empty() {
        payload.body.clone()
    } else {
        format!(
            "*{}*\n---------------------\n{}",
            payload.title, payload.body
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryClient, DeliveryOutcome};
    use httpmock::{Method::POST, MockServer};
    use std::time::Duration;
    use tokio::sync::watch;

    fn payload() -> AlertPayload {
        AlertPayload {
            title: "Server Monitor LIMIT (cpu_usage) REACHED".to_string(),
            body: "*cpu_usage* : `95`\n".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_channel_and_titled_text_with_bearer_auth() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/chat.postMessage")
                .header("authorization", "Bearer xoxb-test")
                .body_contains("\"channel\":\"#ops\"")
                .body_contains("Server Monitor LIMIT (cpu_usage) REACHED")
                .body_contains("cpu_usage");
            then.status(200).body("ok");
        });

        let sink = SlackSink::new(
            server.url("/api/chat.postMessage"),
            "xoxb-test".to_string(),
            "#ops".to_string(),
        );

        let response = sink.post(&payload()).await.expect("post must succeed");
        mock.assert();
        assert!(response.is_success());
        assert_eq!(response.body, "ok");
    }

    #[tokio::test]
    async fn non_2xx_status_is_reported_not_a_transport_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/chat.postMessage");
            then.status(429).body("rate limited");
        });

        let sink = SlackSink::new(
            server.url("/api/chat.postMessage"),
            "xoxb-test".to_string(),
            "#ops".to_string(),
        );

        let response = sink.post(&payload()).await.expect("transport must be fine");
        assert!(!response.is_success());
        assert_eq!(response.status, 429);
        assert_eq!(response.body, "rate limited");
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_a_transport_error() {
        // Nothing listens here.
        let sink = SlackSink::new(
            "http://127.0.0.1:9/api/chat.postMessage".to_string(),
            "xoxb-test".to_string(),
            "#ops".to_string(),
        );

        let err = sink.post(&payload()).await.unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }

    #[tokio::test]
    async fn delivery_client_exhausts_against_a_failing_sink() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/chat.postMessage");
            then.status(500).body("internal error");
        });

        let sink = SlackSink::new(
            server.url("/api/chat.postMessage"),
            "xoxb-test".to_string(),
            "#ops".to_string(),
        );
        let client = DeliveryClient::new(3, Duration::from_millis(1));
        let (_tx, mut shutdown) = watch::channel(false);

        let outcome = client.deliver(&sink, &payload(), &mut shutdown).await;

        assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 3 });
        mock.assert_hits(3);
    }
}
