use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AppError;
use crate::technitium::{ApiCall, ApiResponse, DnsApi};

type Handler = Box<dyn Fn(&ApiCall) -> ApiResponse + Send + Sync>;

/// In-memory server that answers calls through a closure and records them.
pub struct FakeApi {
    handler: Handler,
    calls: Mutex<Vec<ApiCall>>,
}

impl FakeApi {
    pub fn new(handler: impl Fn(&ApiCall) -> ApiResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fixed responses by path. Unlisted paths answer with an error.
    pub fn routes(routes: Vec<(&'static str, ApiResponse)>) -> Self {
        Self::new(move |call| {
            routes
                .iter()
                .find(|(path, _)| *path == call.path)
                .map(|(_, resp)| resp.clone())
                .unwrap_or_else(|| ApiResponse::error(format!("unexpected call {}", call.path)))
        })
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.is_mutating())
            .collect()
    }
}

#[async_trait]
impl DnsApi for FakeApi {
    async fn call(&self, call: &ApiCall) -> Result<ApiResponse, AppError> {
        self.calls.lock().unwrap().push(call.clone());
        Ok((self.handler)(call))
    }
}
