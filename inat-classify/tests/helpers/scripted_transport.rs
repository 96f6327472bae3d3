//! Scripted in-memory Transport
//!
//! Replies are matched by URL fragment and, for multipart uploads, by file
//! name. Each route replays its queued replies in order; the last reply is
//! repeated once the queue is down to one.

use async_trait::async_trait;
use inat_classify::services::{Method, RequestBody, Transport, TransportResponse};
use inat_classify::TransportError;
use std::sync::Mutex;

pub type Reply = Result<TransportResponse, TransportError>;

/// One request seen by the transport
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub body: RequestBody,
}

impl RecordedCall {
    pub fn file_name(&self) -> Option<&str> {
        match &self.body {
            RequestBody::Multipart(file) => Some(file.file_name.as_str()),
            _ => None,
        }
    }
}

struct Route {
    url_fragment: String,
    file_name: Option<String>,
    replies: Vec<Reply>,
}

impl Route {
    fn matches(&self, url: &str, body: &RequestBody) -> bool {
        if !url.contains(&self.url_fragment) {
            return false;
        }
        match (&self.file_name, body) {
            (None, _) => true,
            (Some(name), RequestBody::Multipart(file)) => *name == file.file_name,
            (Some(_), _) => false,
        }
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for any request whose URL contains `url_fragment`
    pub fn on(self, url_fragment: &str, reply: Reply) -> Self {
        self.push(url_fragment, None, reply);
        self
    }

    /// Queue a reply for uploads of one file name; checked before plain routes
    pub fn on_upload_of(self, file_name: &str, reply: Reply) -> Self {
        self.push("/photos", Some(file_name.to_string()), reply);
        self
    }

    fn push(&self, url_fragment: &str, file_name: Option<String>, reply: Reply) {
        let mut routes = self.routes.lock().unwrap();
        match routes
            .iter_mut()
            .find(|r| r.url_fragment == url_fragment && r.file_name == file_name)
        {
            Some(route) => route.replies.push(reply),
            None => routes.push(Route {
                url_fragment: url_fragment.to_string(),
                file_name,
                replies: vec![reply],
            }),
        }
    }

    /// Canned replies for a successful upload/score/taxonomy round
    pub fn happy_path() -> Self {
        Self::new()
            .on("/photos", Ok(upload_body(1)))
            .on("/score_image", Ok(scores_body(&[(876427, "Bundletia moth", 0.95)])))
            .on("/taxa/", Ok(taxon_body()))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url_fragment: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.url.contains(url_fragment))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, method: Method, url: &str, body: RequestBody) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            url: url.to_string(),
            body: body.clone(),
        });

        let mut routes = self.routes.lock().unwrap();
        // File-specific routes first
        let index = routes
            .iter()
            .position(|r| r.file_name.is_some() && r.matches(url, &body))
            .or_else(|| routes.iter().position(|r| r.file_name.is_none() && r.matches(url, &body)));

        match index {
            Some(i) => {
                let route = &mut routes[i];
                if route.replies.len() > 1 {
                    route.replies.remove(0)
                } else {
                    route.replies[0].clone()
                }
            }
            None => http_status(404, "no scripted route"),
        }
    }
}

pub fn http_status(status: u16, body: &str) -> Reply {
    Err(TransportError::Status {
        status,
        body: body.to_string(),
    })
}

pub fn upload_body(id: u64) -> TransportResponse {
    TransportResponse::ok(format!(r#"{{"id": {}, "uuid": "x-{}"}}"#, id, id))
}

/// Flat candidate list of (taxon_id, name, score)
pub fn scores_body(candidates: &[(u64, &str, f64)]) -> TransportResponse {
    let list: Vec<serde_json::Value> = candidates
        .iter()
        .map(|(id, name, score)| serde_json::json!({"taxon_id": id, "name": name, "score": score}))
        .collect();
    TransportResponse::ok(serde_json::Value::Array(list).to_string())
}

/// Bundletia with subfamily and genus but no tribe
pub fn taxon_body() -> TransportResponse {
    TransportResponse::ok(
        serde_json::json!({
            "total_results": 1,
            "results": [{
                "id": 876427,
                "name": "Bundletia pulchra",
                "rank": "species",
                "ancestors": [
                    {"id": 47157, "name": "Lepidoptera", "rank": "order"},
                    {"id": 47607, "name": "Erebidae", "rank": "family"},
                    {"id": 47608, "name": "Arctiinae", "rank": "subfamily", "preferred_common_name": "Tiger Moths"},
                    {"id": 876400, "name": "Bundletia", "rank": "genus"}
                ]
            }]
        })
        .to_string(),
    )
}
