use futures::{SinkExt, StreamExt};
use std::{future::Future, time::Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use super::{
    protocol::{ClientMessage, Filter, RelayMessage},
    utils::subscription_id,
};
use crate::{config::CrawlerConfig, error::ProbeError, models::NostrEvent};

/// Outcome of probing one relay
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub url: String,
    pub is_alive: bool,
    /// Events received before EOSE. Always empty for a dead relay.
    pub events: Vec<NostrEvent>,
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn alive(url: impl Into<String>, events: Vec<NostrEvent>) -> Self {
        Self {
            url: url.into(),
            is_alive: true,
            events,
            error: None,
        }
    }

    pub fn dead(url: impl Into<String>, error: ProbeError) -> Self {
        Self {
            url: url.into(),
            is_alive: false,
            events: Vec::new(),
            error: Some(error),
        }
    }
}

/// Liveness check of a single relay.
///
/// Implementations must not fail: every problem is reported as a dead
/// [`ProbeResult`].
pub trait Probe: Send + Sync + 'static {
    fn probe(
        &self,
        url: String,
        cancel: CancellationToken,
    ) -> impl Future<Output = ProbeResult> + Send;
}

/// Where a probe session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Subscribed,
    Collecting,
}

/// Probes relays over websocket with a REQ for relay-bearing events.
///
/// A relay is alive when it answers with EOSE inside the probe timeout.
#[derive(Debug, Clone)]
pub struct RelayProbe {
    timeout: Duration,
    filter: Filter,
}

impl RelayProbe {
    pub fn new(timeout: Duration, event_limit: usize) -> Self {
        Self {
            timeout,
            filter: Filter::relay_references(event_limit),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.probe_timeout, config.event_limit)
    }

    async fn run_session(
        &self,
        url: &str,
        cancel: &CancellationToken,
        state: &mut SessionState,
    ) -> Result<Vec<NostrEvent>, ProbeError> {
        let (mut socket, _) = connect_async(url)
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let sub_id = subscription_id();
        let request = ClientMessage::Req {
            subscription_id: &sub_id,
            filter: &self.filter,
        }
        .to_json()
        .map_err(|e| ProbeError::Send(e.to_string()))?;

        socket
            .send(Message::Text(request))
            .await
            .map_err(|e| ProbeError::Send(e.to_string()))?;
        *state = SessionState::Subscribed;

        let mut events = Vec::new();

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                frame = socket.next() => frame,
            };

            let text = match frame {
                None => return Err(ProbeError::Closed),
                Some(Err(e)) => return Err(ProbeError::Read(e.to_string())),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Some(Ok(Message::Close(_))) => return Err(ProbeError::Closed),
                Some(Ok(_)) => continue,
            };
            *state = SessionState::Collecting;

            match RelayMessage::parse(&text) {
                Ok(RelayMessage::Event { event, .. }) => events.push(*event),
                Ok(RelayMessage::Eose { .. }) => break,
                Ok(RelayMessage::Notice(notice)) => {
                    tracing::info!("Notice from {}: {}", url, notice);
                }
                Ok(RelayMessage::Unknown(kind)) => {
                    tracing::trace!("Ignoring {} frame from {}", kind, url);
                }
                Err(e) => {
                    tracing::debug!("Skipping undecodable frame from {}: {}", url, e);
                }
            }
        }

        if let Err(e) = socket.close(None).await {
            tracing::trace!("Error closing connection to {}: {}", url, e);
        }

        Ok(events)
    }
}

impl Probe for RelayProbe {
    async fn probe(&self, url: String, cancel: CancellationToken) -> ProbeResult {
        let mut state = SessionState::Connecting;

        let outcome =
            tokio::time::timeout(self.timeout, self.run_session(&url, &cancel, &mut state)).await;

        match outcome {
            Ok(Ok(events)) => {
                tracing::debug!("Relay {} is alive, returned {} events", url, events.len());
                ProbeResult::alive(url, events)
            }
            Ok(Err(e)) => {
                tracing::debug!("Relay {} is dead while {:?}: {}", url, state, e);
                ProbeResult::dead(url, e)
            }
            Err(_) => {
                tracing::debug!("Relay {} timed out while {:?}", url, state);
                ProbeResult::dead(url, ProbeError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// What the in-process relay does after reading the REQ
    #[derive(Clone)]
    enum Script {
        /// Send these frames, then keep the connection open
        Frames(Vec<String>),
        /// Close immediately without answering
        Hangup,
    }

    const EVENT_FRAME: &str = r#"["EVENT","x",{"id":"1","pubkey":"pk","kind":10002,"tags":[["r","wss://relay.next"]],"content":"","sig":"s","created_at":1}]"#;

    /// Start a single-connection relay on a random local port.
    /// Returns its URL and a receiver for the request frame it saw.
    async fn spawn_relay(script: Script) -> (String, tokio::sync::oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (req_tx, req_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            if let Some(Ok(Message::Text(req))) = ws.next().await {
                let _ = req_tx.send(req);
            }

            match script {
                Script::Frames(frames) => {
                    for frame in frames {
                        if ws.send(Message::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                    // Hold the socket open until the client goes away
                    while let Some(Ok(_)) = ws.next().await {}
                }
                Script::Hangup => {
                    let _ = ws.close(None).await;
                }
            }
        });

        (format!("ws://{}", addr), req_rx)
    }

    fn probe_with_timeout(millis: u64) -> RelayProbe {
        RelayProbe::new(Duration::from_millis(millis), 100)
    }

    #[tokio::test]
    async fn test_eose_without_events_is_alive() {
        let (url, _) = spawn_relay(Script::Frames(vec![r#"["EOSE","x"]"#.to_string()])).await;

        let result = probe_with_timeout(2000)
            .probe(url.clone(), CancellationToken::new())
            .await;

        assert!(result.is_alive);
        assert!(result.events.is_empty());
        assert!(result.error.is_none());
        assert_eq!(result.url, url);
    }

    #[tokio::test]
    async fn test_sends_req_for_relay_kinds() {
        let (url, req_rx) = spawn_relay(Script::Frames(vec![r#"["EOSE","x"]"#.to_string()])).await;

        probe_with_timeout(2000)
            .probe(url, CancellationToken::new())
            .await;

        let req: serde_json::Value = serde_json::from_str(&req_rx.await.unwrap()).unwrap();
        assert_eq!(req[0], "REQ");
        assert_eq!(req[1].as_str().unwrap().len(), 32);
        assert_eq!(req[2]["kinds"], serde_json::json!([3, 10002]));
        assert_eq!(req[2]["limit"], 100);
    }

    #[tokio::test]
    async fn test_collects_events_and_skips_noise() {
        let (url, _) = spawn_relay(Script::Frames(vec![
            r#"["NOTICE","welcome"]"#.to_string(),
            "garbage".to_string(),
            r#"["EVENT","x",{"tags":"broken"}]"#.to_string(),
            r#"["AUTH","challenge"]"#.to_string(),
            EVENT_FRAME.to_string(),
            r#"["EOSE","x"]"#.to_string(),
        ]))
        .await;

        let result = probe_with_timeout(2000)
            .probe(url, CancellationToken::new())
            .await;

        assert!(result.is_alive);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].tags[0][1], "wss://relay.next");
    }

    #[tokio::test]
    async fn test_timeout_before_eose_is_dead() {
        let (url, _) = spawn_relay(Script::Frames(vec![EVENT_FRAME.to_string()])).await;

        let result = probe_with_timeout(200)
            .probe(url, CancellationToken::new())
            .await;

        assert!(!result.is_alive);
        assert!(result.events.is_empty());
        assert_eq!(result.error, Some(ProbeError::Timeout(Duration::from_millis(200))));
    }

    #[tokio::test]
    async fn test_hangup_is_dead() {
        let (url, _) = spawn_relay(Script::Hangup).await;

        let result = probe_with_timeout(2000)
            .probe(url, CancellationToken::new())
            .await;

        assert!(!result.is_alive);
        assert!(matches!(
            result.error,
            Some(ProbeError::Closed) | Some(ProbeError::Read(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_dead() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = probe_with_timeout(2000)
            .probe(format!("ws://127.0.0.1:{}", port), CancellationToken::new())
            .await;

        assert!(!result.is_alive);
        assert!(matches!(result.error, Some(ProbeError::Connect(_))));
    }

    #[tokio::test]
    async fn test_cancellation_stops_collection() {
        let (url, _) = spawn_relay(Script::Frames(vec![])).await;
        let cancel = CancellationToken::new();

        let probe = probe_with_timeout(5000);
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { probe.probe(url, cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("probe should stop after cancellation")
            .unwrap();
        assert!(!result.is_alive);
        assert_eq!(result.error, Some(ProbeError::Cancelled));
    }
}
