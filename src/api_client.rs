use anyhow::{anyhow, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::config::ApiConfig;
use crate::running_notes::{NoteType, RunningNoteRequest};

/// Body of `POST /api/v1/internal_costs/{id}`
#[derive(Debug, Serialize)]
pub struct InternalCostsRequest<'a> {
    pub text: &'a str,
}

/// Blocking client for the status web application's REST API
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client: Client::new(),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get_presets(&self) -> Result<Value> {
        self.get_json("presets?presets_list=sv_presets")
    }

    pub fn get_project_samples(&self, project_id: &str) -> Result<Value> {
        self.get_json(&format!("project/{}", project_id))
    }

    pub fn get_project_summary(&self, project_id: &str) -> Result<Value> {
        self.get_json(&format!("project_summary/{}", project_id))
    }

    pub fn get_projects_fields(&self) -> Result<Value> {
        self.get_json("projects_fields?undefined=true")
    }

    pub fn get_project_tickets(&self, project_id: &str) -> Result<Value> {
        self.get_json(&format!("project/{}/tickets", project_id))
    }

    pub fn get_charon_summary(&self, project_id: &str) -> Result<Value> {
        self.get_json(&format!("charon_summary/{}", project_id))
    }

    pub fn get_closed_worksets(&self) -> Result<Value> {
        self.get_json("closed_worksets")
    }

    pub fn get_workset_notes(&self, kind: &str) -> Result<Value> {
        self.get_json(&format!("workset_notes/{}", kind))
    }

    /// Notes of a project, flowcell or workset, keyed by creation time
    pub fn get_running_notes(&self, partition: &str) -> Result<Value> {
        self.get_json(&format!("running_notes/{}", partition))
    }

    /// Latest sticky note; `Value::Null` when there is none
    pub fn get_latest_sticky_note(&self, partition: &str) -> Result<Value> {
        self.get_json(&format!("latest_sticky_run_note/{}", partition))
    }

    pub fn post_running_note(
        &self,
        partition: &str,
        note: &str,
        categories: &[String],
        note_type: NoteType,
    ) -> Result<Value> {
        if note.trim().is_empty() {
            return Err(anyhow!("A running note needs some text"));
        }
        self.post_json(
            &format!("running_notes/{}", partition),
            &RunningNoteRequest {
                note,
                categories,
                note_type,
            },
        )
    }

    pub fn get_flowcells(&self) -> Result<Value> {
        self.get_json("flowcells")
    }

    pub fn get_flowcell_info(&self, flowcell: &str) -> Result<Value> {
        self.get_json(&format!("flowcell_info2/{}", flowcell))
    }

    pub fn search_flowcells(&self, query: &str) -> Result<Value> {
        self.get_json(&format!("flowcell_search/{}", query))
    }

    pub fn get_flowcell_links(&self, flowcell: &str) -> Result<Value> {
        self.get_json(&format!("links/{}", flowcell))
    }

    /// Delivered base pairs per month; the server defaults `start` to 2012
    pub fn get_delivered_monthly(&self, start: Option<&str>, end: Option<&str>) -> Result<Value> {
        self.get_json_with_query("delivered_monthly", &date_range(start, end))
    }

    pub fn get_delivered_quarterly(
        &self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Value> {
        self.get_json_with_query("delivered_quarterly", &date_range(start, end))
    }

    pub fn post_internal_costs(&self, project_id: &str, text: &str) -> Result<Value> {
        self.post_json(
            &format!("internal_costs/{}", project_id),
            &InternalCostsRequest { text },
        )
    }

    pub fn post_draft_cost_calculator(&self, body: &Value) -> Result<Value> {
        self.post_json("draft_cost_calculator", body)
    }

    pub fn post_pricing_publish_draft(&self, body: &Value) -> Result<Value> {
        self.post_json("pricing_publish_draft", body)
    }

    pub fn post_pricing_reassign_lock(&self, body: &Value) -> Result<Value> {
        self.post_json("pricing_reassign_lock", body)
    }

    /// GET `/api/v1/{path}` and decode the JSON body
    pub fn get_json(&self, path: &str) -> Result<Value> {
        self.get_json_with_query(path, &[])
    }

    pub fn get_json_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = self.endpoint(path);
        debug!(target: "api", "GET {}", url);
        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }
        self.send(request, &url)
    }

    fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value> {
        let url = self.endpoint(path);
        debug!(target: "api", "POST {}", url);
        self.send(self.client.post(&url).json(body), &url)
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<Value> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!("API Error ({}) from {}: {}", status, url, error_text));
        }

        // Some endpoints answer with an empty body
        let text = response.text()?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = serde_json::from_str(&text)?;
        info!(target: "api", "{} -> {} bytes", url, text.len());
        Ok(value)
    }
}

fn date_range<'a>(start: Option<&'a str>, end: Option<&'a str>) -> Vec<(&'static str, &'a str)> {
    let mut query = Vec::new();
    if let Some(start) = start {
        query.push(("start", start));
    }
    if let Some(end) = end {
        query.push(("end", end));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    #[derive(Debug)]
    struct Received {
        method: String,
        target: String,
        authorization: Option<String>,
        body: String,
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    /// Serves one canned (status, body) per connection, in order
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<Received>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let mut received = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();

                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = stream.read(&mut chunk).unwrap();
                    assert!(n > 0, "connection closed before headers");
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = find(&buf, b"\r\n\r\n") {
                        break pos + 4;
                    }
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let mut lines = head.lines();
                let mut request_line = lines.next().unwrap().split_whitespace();
                let method = request_line.next().unwrap().to_string();
                let target = request_line.next().unwrap().to_string();

                let mut content_length = 0;
                let mut authorization = None;
                for line in lines {
                    if let Some((name, value)) = line.split_once(':') {
                        match name.trim().to_lowercase().as_str() {
                            "content-length" => content_length = value.trim().parse().unwrap(),
                            "authorization" => authorization = Some(value.trim().to_string()),
                            _ => {}
                        }
                    }
                }

                while buf.len() < header_end + content_length {
                    let n = stream.read(&mut chunk).unwrap();
                    assert!(n > 0, "connection closed before body");
                    buf.extend_from_slice(&chunk[..n]);
                }
                let request_body =
                    String::from_utf8_lossy(&buf[header_end..header_end + content_length])
                        .to_string();

                let reply = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).unwrap();
                stream.flush().unwrap();

                received.push(Received {
                    method,
                    target,
                    authorization,
                    body: request_body,
                });
            }
            received
        });

        (base_url, handle)
    }

    #[test]
    fn test_endpoint_building() {
        let client = ApiClient::new("http://localhost:9761/");
        assert_eq!(client.base_url(), "http://localhost:9761");
        assert_eq!(
            client.endpoint("presets?presets_list=sv_presets"),
            "http://localhost:9761/api/v1/presets?presets_list=sv_presets"
        );
        assert_eq!(
            client.endpoint("/project/P12345"),
            "http://localhost:9761/api/v1/project/P12345"
        );
    }

    #[test]
    fn test_from_config_keeps_token() {
        let config = ApiConfig {
            base_url: "https://status.example.org".to_string(),
            token: Some("secret".to_string()),
            timeout_secs: 5,
        };
        let client = ApiClient::from_config(&config).unwrap();
        assert_eq!(client.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_get_endpoints_hit_their_paths() {
        let calls: Vec<(&str, Box<dyn Fn(&ApiClient) -> Result<Value>>)> = vec![
            ("/api/v1/presets?presets_list=sv_presets", Box::new(|c: &ApiClient| c.get_presets())),
            ("/api/v1/project/P1", Box::new(|c: &ApiClient| c.get_project_samples("P1"))),
            ("/api/v1/project_summary/P1", Box::new(|c: &ApiClient| c.get_project_summary("P1"))),
            ("/api/v1/projects_fields?undefined=true", Box::new(|c: &ApiClient| c.get_projects_fields())),
            ("/api/v1/project/P1/tickets", Box::new(|c: &ApiClient| c.get_project_tickets("P1"))),
            ("/api/v1/charon_summary/P1", Box::new(|c: &ApiClient| c.get_charon_summary("P1"))),
            ("/api/v1/closed_worksets", Box::new(|c: &ApiClient| c.get_closed_worksets())),
            ("/api/v1/workset_notes/open", Box::new(|c: &ApiClient| c.get_workset_notes("open"))),
            ("/api/v1/running_notes/P1", Box::new(|c: &ApiClient| c.get_running_notes("P1"))),
            (
                "/api/v1/latest_sticky_run_note/P1",
                Box::new(|c: &ApiClient| c.get_latest_sticky_note("P1")),
            ),
            ("/api/v1/flowcells", Box::new(|c: &ApiClient| c.get_flowcells())),
            ("/api/v1/flowcell_info2/FC1", Box::new(|c: &ApiClient| c.get_flowcell_info("FC1"))),
            ("/api/v1/flowcell_search/HX3", Box::new(|c: &ApiClient| c.search_flowcells("HX3"))),
            ("/api/v1/links/FC1", Box::new(|c: &ApiClient| c.get_flowcell_links("FC1"))),
            (
                "/api/v1/delivered_monthly?start=2024-01-01&end=2024-06-30",
                Box::new(|c: &ApiClient| c.get_delivered_monthly(Some("2024-01-01"), Some("2024-06-30"))),
            ),
            (
                "/api/v1/delivered_quarterly",
                Box::new(|c: &ApiClient| c.get_delivered_quarterly(None, None)),
            ),
        ];

        let (base_url, server) = serve(calls.iter().map(|_| (200, r#"{"ok": true}"#)).collect());
        let client = ApiClient::new(&base_url);
        for (_, call) in &calls {
            assert_eq!(call(&client).unwrap(), json!({"ok": true}));
        }

        let received = server.join().unwrap();
        assert_eq!(received.len(), calls.len());
        for (request, (expected, _)) in received.iter().zip(&calls) {
            assert_eq!(request.method, "GET");
            assert_eq!(&request.target, expected);
            assert!(request.body.is_empty());
        }
    }

    #[test]
    fn test_post_endpoints_send_json_bodies() {
        let draft = json!({"products": {"1": 2}});
        let (base_url, server) = serve(vec![
            (200, r#"{"saved": 1}"#),
            (201, r#"{"note": "Sequencing done"}"#),
            (200, ""),
            (200, "{}"),
            (200, "{}"),
        ]);
        let client = ApiClient::new(&base_url);

        assert_eq!(
            client.post_internal_costs("P1", "Extra lane").unwrap(),
            json!({"saved": 1})
        );
        client
            .post_running_note("P1", "Sequencing done", &["Lab".to_string()], NoteType::Project)
            .unwrap();
        assert_eq!(client.post_draft_cost_calculator(&draft).unwrap(), Value::Null);
        client.post_pricing_publish_draft(&json!({"comment": "v2"})).unwrap();
        client.post_pricing_reassign_lock(&json!({"user": "ann"})).unwrap();

        let received = server.join().unwrap();
        let summary: Vec<(&str, &str, Value)> = received
            .iter()
            .map(|r| {
                (
                    r.method.as_str(),
                    r.target.as_str(),
                    serde_json::from_str(&r.body).unwrap(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("POST", "/api/v1/internal_costs/P1", json!({"text": "Extra lane"})),
                (
                    "POST",
                    "/api/v1/running_notes/P1",
                    json!({"note": "Sequencing done", "categories": ["Lab"], "note_type": "project"})
                ),
                ("POST", "/api/v1/draft_cost_calculator", draft.clone()),
                ("POST", "/api/v1/pricing_publish_draft", json!({"comment": "v2"})),
                ("POST", "/api/v1/pricing_reassign_lock", json!({"user": "ann"})),
            ]
        );
    }

    #[test]
    fn test_error_status_carries_body_text() {
        let (base_url, server) = serve(vec![(500, "database unavailable")]);
        let err = ApiClient::new(&base_url)
            .get_project_samples("P1")
            .unwrap_err()
            .to_string();
        server.join().unwrap();

        assert!(err.contains("500"));
        assert!(err.contains("/api/v1/project/P1"));
        assert!(err.contains("database unavailable"));
    }

    #[test]
    fn test_token_is_sent_as_bearer() {
        let (base_url, server) = serve(vec![(200, "")]);
        let config = ApiConfig {
            base_url,
            token: Some("secret".to_string()),
            timeout_secs: 5,
        };
        let value = ApiClient::from_config(&config)
            .unwrap()
            .get_latest_sticky_note("P1")
            .unwrap();
        assert_eq!(value, Value::Null);

        let received = server.join().unwrap();
        assert_eq!(received[0].authorization.as_deref(), Some("Bearer secret"));
    }

    #[test]
    fn test_empty_running_note_is_rejected_locally() {
        // Nothing listens here; the check happens before any request
        let client = ApiClient::new("http://127.0.0.1:9");
        assert!(client
            .post_running_note("P1", "  ", &[], NoteType::Project)
            .is_err());
    }

    #[test]
    fn test_internal_costs_body() {
        let body = serde_json::to_value(InternalCostsRequest { text: "note" }).unwrap();
        assert_eq!(body, json!({"text": "note"}));
    }
}
