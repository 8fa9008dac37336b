//! Wolfram|Alpha knowledge-engine client.
//!
//! Uses the v2 query API with JSON output and plaintext pods. The answer is
//! the primary pod's text, falling back to a pod titled "Result" and then to
//! the first pod that is not just the echoed input.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

const DEFAULT_ENDPOINT: &str = "https://api.wolframalpha.com/v2/query";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    queryresult: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: serde_json::Value,
    #[serde(default)]
    pods: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    title: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    subpods: Vec<SubPod>,
}

#[derive(Debug, Deserialize)]
struct SubPod {
    #[serde(default)]
    plaintext: String,
}

impl Pod {
    fn text(&self) -> Option<&str> {
        self.subpods
            .iter()
            .map(|s| s.plaintext.trim())
            .find(|t| !t.is_empty())
    }
}

/// Wolfram|Alpha API client.
pub struct WolframClient {
    app_id: String,
    endpoint: String,
    http: reqwest::Client,
}

impl WolframClient {
    pub fn new(app_id: String) -> Self {
        Self {
            app_id,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Ask a question and return the best plaintext answer.
    pub async fn query(&self, question: &str) -> Result<String> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("appid", self.app_id.as_str()),
                ("input", question),
                ("output", "json"),
                ("format", "plaintext"),
            ])
            .send()
            .await
            .context("Wolfram|Alpha request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Wolfram|Alpha returned {status}: {}", body.trim());
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .context("Wolfram|Alpha returned invalid JSON")?;
        tracing::debug!(question, "Wolfram|Alpha answered");
        answer_from(body)
    }
}

/// Pick the answer text out of a query response.
pub fn answer_from(body: serde_json::Value) -> Result<String> {
    let response: QueryResponse =
        serde_json::from_value(body).context("Unexpected Wolfram|Alpha response shape")?;
    let result = response.queryresult;

    if let Some(msg) = result.error.get("msg").and_then(|m| m.as_str()) {
        bail!("Wolfram|Alpha error: {msg}");
    }
    if !result.success {
        bail!("Wolfram|Alpha did not understand the question");
    }

    result
        .pods
        .iter()
        .filter(|p| p.primary)
        .chain(result.pods.iter().filter(|p| p.title == "Result"))
        .chain(result.pods.iter().filter(|p| p.id != "Input"))
        .find_map(|p| p.text())
        .map(str::to_string)
        .context("Wolfram|Alpha had no answer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primary_pod_wins() {
        let body = json!({
            "queryresult": {
                "success": true,
                "error": false,
                "pods": [
                    {"title": "Input interpretation", "id": "Input", "subpods": [{"plaintext": "2+2"}]},
                    {"title": "Number line", "id": "NumberLine", "subpods": [{"plaintext": ""}]},
                    {"title": "Result", "id": "Result", "primary": true, "subpods": [{"plaintext": "4"}]}
                ]
            }
        });
        assert_eq!(answer_from(body).unwrap(), "4");
    }

    #[test]
    fn falls_back_past_the_input_pod() {
        let body = json!({
            "queryresult": {
                "success": true,
                "pods": [
                    {"title": "Input", "id": "Input", "subpods": [{"plaintext": "capital of France"}]},
                    {"title": "Answer", "id": "Answer", "subpods": [{"plaintext": "Paris"}]}
                ]
            }
        });
        assert_eq!(answer_from(body).unwrap(), "Paris");
    }

    #[test]
    fn unsuccessful_query_is_an_error() {
        let body = json!({"queryresult": {"success": false, "error": false, "pods": []}});
        assert!(answer_from(body).is_err());
    }

    #[test]
    fn api_error_message_is_surfaced() {
        let body = json!({
            "queryresult": {"success": false, "error": {"code": "1", "msg": "Invalid appid"}}
        });
        let err = answer_from(body).unwrap_err().to_string();
        assert!(err.contains("Invalid appid"));
    }

    #[tokio::test]
    async fn query_sends_app_id_and_question() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let _ = seen_tx.send(String::from_utf8_lossy(&buf[..n]).to_string());
            let body = r#"{"queryresult":{"success":true,"pods":[{"id":"Result","title":"Result","primary":true,"subpods":[{"plaintext":"4"}]}]}}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let client =
            WolframClient::new("TEST-ID".to_string()).with_endpoint(&format!("http://{addr}/v2/query"));
        assert_eq!(client.query("2+2").await.unwrap(), "4");

        let request = seen_rx.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /v2/query?"));
        assert!(request_line.contains("appid=TEST-ID"));
        assert!(request_line.contains("input=2%2B2"));
        assert!(request_line.contains("output=json"));
    }

    #[test]
    fn no_text_anywhere() {
        let body = json!({
            "queryresult": {"success": true, "pods": [{"id": "Plot", "subpods": [{"plaintext": ""}]}]}
        });
        assert!(answer_from(body).is_err());
    }
}
