//! Competitor roster, fetched once from `GET /api/players`.

use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::model::Competitor;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RosterResponse {
    #[serde(default)]
    players: Option<Vec<Competitor>>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode a roster response body. An `error` field wins over everything else.
pub fn parse_roster(status: u16, body: &str) -> Result<Vec<Competitor>, FetchError> {
    let parsed = serde_json::from_str::<RosterResponse>(body);
    if let Ok(RosterResponse {
        error: Some(msg), ..
    }) = &parsed
    {
        return Err(FetchError::Server(msg.clone()));
    }
    if !(200..300).contains(&status) {
        return Err(FetchError::Status { status });
    }
    match parsed {
        Ok(RosterResponse {
            players: Some(players),
            ..
        }) => Ok(players),
        Ok(_) => Err(FetchError::Decode("response has no players list".into())),
        Err(e) => Err(FetchError::Decode(e.to_string())),
    }
}

pub async fn fetch_roster(cfg: &ClientConfig) -> Result<Vec<Competitor>, FetchError> {
    let http = reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .timeout(cfg.request_timeout)
        .build()
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    let url = cfg.players_url();
    tracing::debug!(%url, "fetching roster");
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    parse_roster(status, &body)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RosterState {
    Pending,
    Ready(Vec<Competitor>),
    Failed(FetchError),
}

/// Holds the roster in server order. A failed load stays failed until `retry`.
#[derive(Debug, Clone)]
pub struct RosterCache {
    state: RosterState,
}

impl Default for RosterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RosterCache {
    pub fn new() -> Self {
        Self {
            state: RosterState::Pending,
        }
    }

    pub fn state(&self) -> &RosterState {
        &self.state
    }

    /// Fetch once; later calls are no-ops when the roster is already loaded,
    /// and return the stored error after a failure. Only `retry` fetches again.
    pub async fn load(&mut self, cfg: &ClientConfig) -> Result<&[Competitor], FetchError> {
        if let RosterState::Failed(e) = &self.state {
            return Err(e.clone());
        }
        if !self.is_ready() {
            match fetch_roster(cfg).await {
                Ok(players) => {
                    tracing::info!(count = players.len(), "roster loaded");
                    self.set_loaded(players);
                }
                Err(e) => {
                    tracing::error!(error = %e, "roster load failed");
                    self.set_failed(e.clone());
                    return Err(e);
                }
            }
        }
        Ok(self.competitors())
    }

    /// User-triggered reload after a failure.
    pub async fn retry(&mut self, cfg: &ClientConfig) -> Result<&[Competitor], FetchError> {
        if let RosterState::Failed(_) = self.state {
            self.state = RosterState::Pending;
        }
        self.load(cfg).await
    }

    pub fn set_loaded(&mut self, players: Vec<Competitor>) {
        self.state = RosterState::Ready(players);
    }

    pub fn set_failed(&mut self, err: FetchError) {
        self.state = RosterState::Failed(err);
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, RosterState::Ready(_))
    }

    pub fn failure(&self) -> Option<&FetchError> {
        match &self.state {
            RosterState::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Empty unless loaded.
    pub fn competitors(&self) -> &[Competitor] {
        match &self.state {
            RosterState::Ready(players) => players,
            _ => &[],
        }
    }

    pub fn find(&self, name: &str) -> Option<&Competitor> {
        self.competitors().iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn keeps_server_order() {
        let players = parse_roster(
            200,
            r#"{"players":[{"name":"Zverev","ranking":3},{"name":"Alcaraz","ranking":2.0}]}"#,
        )
        .unwrap();
        let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Zverev", "Alcaraz"]);
    }

    #[test]
    fn error_field_takes_precedence() {
        assert_matches!(
            parse_roster(500, r#"{"error":"No such file: serve.csv"}"#),
            Err(FetchError::Server(m)) if m.contains("serve.csv")
        );
        assert_matches!(
            parse_roster(200, r#"{"players":[],"error":"stale"}"#),
            Err(FetchError::Server(_))
        );
        assert_matches!(parse_roster(502, "<html>"), Err(FetchError::Status { status: 502 }));
        assert_matches!(parse_roster(200, "{}"), Err(FetchError::Decode(_)));
    }

    /// Answers every connection with the same response and counts them.
    async fn serve(status_line: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 2048];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        (format!("http://{addr}"), hits)
    }

    #[tokio::test]
    async fn load_over_http() {
        let (base, hits) = serve(
            "200 OK",
            r#"{"players":[{"name":"Sinner","ranking":1},{"name":"Alcaraz","ranking":2}]}"#,
        )
        .await;
        let cfg = ClientConfig {
            base_url: base,
            ..ClientConfig::default()
        };
        let mut cache = RosterCache::new();
        let players = cache.load(&cfg).await.unwrap();
        assert_eq!(players.len(), 2);
        assert!(cache.find("Alcaraz").is_some());
        assert_eq!(cache.load(&cfg).await.unwrap().len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_leaves_cache_empty() {
        let (base, hits) = serve("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let cfg = ClientConfig {
            base_url: base,
            ..ClientConfig::default()
        };
        let mut cache = RosterCache::new();
        assert!(cache.load(&cfg).await.is_err());
        assert!(cache.competitors().is_empty());
        assert_matches!(cache.failure(), Some(FetchError::Server(_)));

        // Loading again reports the stored failure without another request.
        assert_matches!(cache.load(&cfg).await, Err(FetchError::Server(m)) if m == "boom");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(cache.retry(&cfg).await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
