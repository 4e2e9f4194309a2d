// Shared test harness for the behavior suites: a scripted transport that
// replays canned outcomes and records every request the client issued.
pub use tickbridge_core::{
    map_record, transforms, AdapterRegistry, CacheMode, FetchRequest, FieldMapping, HttpClient,
    HttpError, HttpTransport, RateLimiter, RecordKind, ResponseCache, RetryPolicy, SourceAdapter,
    TransportFailure, TransportRequest, TransportResponse,
};
pub use std::sync::Arc;

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Transport double that pops one scripted outcome per `send`.
///
/// Panics when the script runs dry, so a test that issues more transport
/// calls than it scripted fails loudly instead of hanging on a guess.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportFailure>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        script: impl IntoIterator<Item = Result<TransportResponse, TransportFailure>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Number of transport calls the client actually made.
    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("request log lock").len()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("request log lock").clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            self.requests.lock().expect("request log lock").push(request);
            self.script
                .lock()
                .expect("script lock")
                .pop_front()
                .expect("scripted transport ran out of responses")
        })
    }
}

pub fn ok_response(body: &str) -> Result<TransportResponse, TransportFailure> {
    Ok(TransportResponse {
        status: 200,
        headers: BTreeMap::new(),
        body: body.to_string(),
    })
}

pub fn status_response(status: u16, body: &str) -> Result<TransportResponse, TransportFailure> {
    Ok(TransportResponse {
        status,
        headers: BTreeMap::new(),
        body: body.to_string(),
    })
}

/// A 429 carrying a delay-seconds `Retry-After` header.
pub fn rate_limited_response(retry_after_secs: u64) -> Result<TransportResponse, TransportFailure> {
    let mut headers = BTreeMap::new();
    headers.insert("retry-after".to_string(), retry_after_secs.to_string());
    Ok(TransportResponse {
        status: 429,
        headers,
        body: "slow down".to_string(),
    })
}
