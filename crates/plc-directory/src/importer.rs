//! Paginated reader for the PLC directory export stream

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::Arc;

use atproto_identity::{
    get_json, get_response, Did, DidMethod, HttpClient, IdentityError, ReqwestClient,
    RequestOptions, Result, DEFAULT_PLC_DIRECTORY_URL,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::operation::PlcOperation;

/// Maximum number of rows the export endpoint returns per request
pub const PAGE_SIZE: usize = 1000;

/// Called with the raw JSON of a record that failed to parse. Returning discards the record.
pub type ErrorHandler = Box<dyn FnMut(&Value, &IdentityError) + Send>;

/// Where an import starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Since {
    /// Only entries created from now on
    Now,
    /// The whole directory history
    Beginning,
    /// Entries created after the given time
    At(DateTime<Utc>),
}

impl Since {
    /// Accepts `beginning`, `now` or an RFC 3339 timestamp
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "beginning" => Ok(Since::Beginning),
            "now" => Ok(Since::Now),
            _ => DateTime::parse_from_rfc3339(s)
                .map(|t| Since::At(t.with_timezone(&Utc)))
                .map_err(|e| IdentityError::format(format!("Invalid timestamp {:?}: {}", s, e))),
        }
    }
}

impl FromStr for Since {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        Since::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImporterState {
    /// Started at "now" and nothing fetched yet
    Fresh,
    /// Catching up on history
    Backfilling,
    /// Reached the end of the stream at least once
    Tailing,
}

/// Reads the export stream page by page, keeping a timestamp cursor.
///
/// The export API is queried with `after=<last createdAt>`, which returns the
/// boundary record again at the top of the next page; records whose CID was in
/// the previous page are dropped.
///
/// An importer is a single stream; it is not meant to be shared between tasks.
pub struct PlcImporter {
    http: Arc<dyn HttpClient>,
    plc_directory_url: String,
    request_options: RequestOptions,
    cursor: Option<DateTime<Utc>>,
    eof: bool,
    pages_fetched: usize,
    last_page_cids: HashSet<String>,
    error_handler: Option<ErrorHandler>,
}

impl PlcImporter {
    pub fn new(since: Since) -> Self {
        let (cursor, eof) = match since {
            Since::Now => (Some(Utc::now()), true),
            Since::Beginning => (None, false),
            Since::At(time) => (Some(time), false),
        };

        Self {
            http: Arc::new(ReqwestClient::new()),
            plc_directory_url: DEFAULT_PLC_DIRECTORY_URL.to_string(),
            request_options: RequestOptions::default(),
            cursor,
            eof,
            pages_fetched: 0,
            last_page_cids: HashSet::new(),
            error_handler: None,
        }
    }

    pub fn with_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    pub fn with_plc_directory(mut self, url: impl Into<String>) -> Self {
        self.plc_directory_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.request_options = options;
        self
    }

    /// Switch to lenient mode: malformed records go to `handler` instead of failing the page
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Value, &IdentityError) + Send + 'static,
    {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Fail the page on the first malformed record (the default)
    pub fn strict(mut self) -> Self {
        self.error_handler = None;
        self
    }

    /// Timestamp the next page starts after, `None` when starting from the beginning
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn state(&self) -> ImporterState {
        match (self.eof, self.pages_fetched) {
            (false, _) => ImporterState::Backfilling,
            (true, 0) => ImporterState::Fresh,
            (true, _) => ImporterState::Tailing,
        }
    }

    fn export_url(&self) -> String {
        match self.cursor {
            Some(cursor) => format!(
                "{}/export?after={}",
                self.plc_directory_url,
                urlencoding::encode(&cursor.to_rfc3339_opts(SecondsFormat::Micros, true))
            ),
            None => format!("{}/export", self.plc_directory_url),
        }
    }

    /// Fetch the next page of operations and advance the cursor
    #[instrument(skip(self), fields(cursor = ?self.cursor))]
    pub async fn fetch_page(&mut self) -> Result<Vec<PlcOperation>> {
        let request_time = Utc::now();
        let url = self.export_url();

        let response = get_response(self.http.as_ref(), &url, &self.request_options).await?;
        if !response.is_success() {
            return Err(response.to_api_error().into());
        }

        let rows: Vec<&str> = response
            .body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let mut operations = Vec::with_capacity(rows.len());
        for line in &rows {
            let parsed = serde_json::from_str::<Value>(line)
                .map_err(|e| {
                    (
                        Value::String(line.to_string()),
                        IdentityError::format(format!("Invalid JSON in export: {}", e)),
                    )
                })
                .and_then(|json| PlcOperation::from_json(json.clone()).map_err(|e| (json, e)));

            match parsed {
                Ok(op) => operations.push(op),
                Err((json, e)) => self.handle_error(&json, e)?,
            }
        }

        if let Some(last) = operations.last() {
            self.cursor = Some(last.created_at);
        } else if self.cursor.is_none() {
            self.cursor = Some(request_time);
        }

        let cids: HashSet<String> = operations.iter().map(|op| op.cid.clone()).collect();
        let previous = std::mem::replace(&mut self.last_page_cids, cids);
        let before = operations.len();
        operations.retain(|op| !previous.contains(&op.cid));
        if operations.len() < before {
            debug!("Dropped {} records repeated from the previous page", before - operations.len());
        }

        self.eof = rows.len() < PAGE_SIZE;
        self.pages_fetched += 1;

        info!(
            "Fetched {} rows, {} new operations, cursor {:?}, eof {}",
            rows.len(),
            operations.len(),
            self.cursor,
            self.eof
        );

        Ok(operations)
    }

    /// Fetch pages and pass each one to `sink` until the end of the stream,
    /// or until the sink breaks. At least one page is always fetched.
    pub async fn fetch<F>(&mut self, mut sink: F) -> Result<()>
    where
        F: FnMut(Vec<PlcOperation>) -> ControlFlow<()>,
    {
        loop {
            let operations = self.fetch_page().await?;
            if sink(operations).is_break() {
                debug!("Import stopped by caller");
                return Ok(());
            }
            if self.eof {
                return Ok(());
            }
        }
    }

    /// Complete operation history of one did:plc, oldest first
    #[instrument(skip(self), fields(did = %did))]
    pub async fn fetch_audit_log(&mut self, did: &Did) -> Result<Vec<PlcOperation>> {
        if did.method() != DidMethod::Plc {
            return Err(IdentityError::Did(format!(
                "Audit logs are only available for did:plc, got {}",
                did
            )));
        }

        let url = format!("{}/{}/log/audit", self.plc_directory_url, did);
        let json = get_json(self.http.as_ref(), &url, &self.request_options, None).await?;

        let Value::Array(entries) = json else {
            return Err(IdentityError::format(format!(
                "Audit log for {} is not a JSON array",
                did
            )));
        };

        let mut operations = Vec::with_capacity(entries.len());
        for entry in entries {
            match PlcOperation::from_json(entry.clone()) {
                Ok(op) => operations.push(op),
                Err(e) => self.handle_error(&entry, e)?,
            }
        }

        Ok(operations)
    }

    fn handle_error(&mut self, json: &Value, error: IdentityError) -> Result<()> {
        match self.error_handler.as_mut() {
            Some(handler) => {
                warn!("Skipping malformed record: {}", error);
                handler(json, &error);
                Ok(())
            }
            None => Err(error),
        }
    }
}
