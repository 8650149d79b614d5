//! In-memory HTTP and DNS fakes that record every call

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::dns::TxtLookup;
use crate::error::{IdentityError, Result};
use crate::requests::{HttpClient, HttpResponse, RequestOptions};

enum Canned {
    Response(HttpResponse),
    Failure,
}

/// Answers 404 for any URL without a canned response
#[derive(Default)]
pub(crate) struct FakeHttp {
    responses: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, status: u16, content_type: Option<&str>, body: &str) {
        let headers = content_type
            .map(|ct| vec![("content-type".to_string(), ct.to_string())])
            .unwrap_or_default();
        let response = HttpResponse {
            url: url.to_string(),
            status,
            headers,
            body: body.to_string(),
        };
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Response(response));
    }

    pub(crate) fn fail(&self, url: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Failure);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str, _options: &RequestOptions) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(url.to_string());

        match self.responses.lock().unwrap().get(url) {
            Some(Canned::Response(response)) => Ok(response.clone()),
            Some(Canned::Failure) => Err(IdentityError::Transport("connection timed out".to_string())),
            None => Ok(HttpResponse {
                url: url.to_string(),
                status: 404,
                headers: Vec::new(),
                body: String::new(),
            }),
        }
    }
}

/// Answers with no records for any name without canned records
#[derive(Default)]
pub(crate) struct FakeDns {
    records: Mutex<HashMap<String, Vec<Vec<String>>>>,
    failures: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
}

impl FakeDns {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append one TXT record made of `strings` to `name`
    pub(crate) fn add(&self, name: &str, strings: &[&str]) {
        self.records
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(strings.iter().map(|s| s.to_string()).collect());
    }

    pub(crate) fn fail(&self, name: &str) {
        self.failures.lock().unwrap().push(name.to_string());
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TxtLookup for FakeDns {
    async fn txt_records(&self, name: &str) -> Result<Vec<Vec<String>>> {
        self.queries.lock().unwrap().push(name.to_string());

        if self.failures.lock().unwrap().iter().any(|n| n == name) {
            return Err(IdentityError::Dns(format!("SERVFAIL for {}", name)));
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}
