//! Recording [`Transport`] for client tests.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use genie_foundry::{FoundryConfig, FoundryError, HttpResponse, Result, Transport};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub method: &'static str,
    pub url: String,
    pub body: Option<Value>,
}

impl Recorded {
    pub fn params(&self) -> &Value {
        &self.body.as_ref().expect("request has a body")["parameters"]
    }
}

type Responder = dyn Fn(&Recorded, usize) -> Result<HttpResponse> + Send + Sync;

/// Records every request and answers with `respond(request, index)`, where
/// `index` counts earlier requests to the same URL.
pub struct FakeTransport {
    requests: Mutex<Vec<Recorded>>,
    respond: Box<Responder>,
}

impl FakeTransport {
    pub fn new(respond: impl Fn(&Recorded, usize) -> Result<HttpResponse> + Send + Sync + 'static) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// Every action answers with one created object; GETs and queries succeed.
    pub fn ok() -> Self {
        Self::new(|req, _| Ok(default_response(req)))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, fragment: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(fragment))
            .collect()
    }

    fn record(&self, request: Recorded) -> Result<HttpResponse> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.iter().filter(|r| r.url == request.url).count();
        requests.push(request.clone());
        drop(requests);
        (self.respond)(&request, index)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse> {
        self.record(Recorded {
            method: "POST",
            url: url.to_string(),
            body: Some(body.clone()),
        })
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.record(Recorded {
            method: "GET",
            url: url.to_string(),
            body: None,
        })
    }
}

pub fn created(key: &str) -> HttpResponse {
    HttpResponse::new(
        200,
        format!(
            r#"{{"validation":{{"result":"VALID"}},"edits":{{"type":"edits","edits":[{{"type":"addObject","primaryKey":"{key}"}}]}}}}"#
        ),
    )
}

pub fn valid() -> HttpResponse {
    HttpResponse::new(200, r#"{"validation":{"result":"VALID","submissionCriteria":[],"parameters":{}}}"#)
}

pub fn default_response(req: &Recorded) -> HttpResponse {
    if req.url.ends_with("/applyBatch") {
        return HttpResponse::new(200, "{}");
    }
    if req.url.ends_with("/apply") {
        let validate_only = req
            .body
            .as_ref()
            .is_some_and(|b| b["options"]["mode"] == "VALIDATE_ONLY");
        return if validate_only { valid() } else { created("pk-1") };
    }
    if req.url.contains("/objects/ExcelWorkbook/") {
        return HttpResponse::new(200, r#"{"agentPlan":"1. Sum the column"}"#);
    }
    HttpResponse::new(200, r#"{"value":[]}"#)
}

pub fn transport_error() -> FoundryError {
    FoundryError::InvalidArgument("connection reset".to_string())
}

pub fn config() -> FoundryConfig {
    FoundryConfig {
        base_url: "https://foundry.test/api".into(),
        ontology_id: "ont".into(),
        ..Default::default()
    }
}
