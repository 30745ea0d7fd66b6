use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::{ProbeResult, SlotProbe};

/// Scriptable probe for tests. Replies are consumed oldest-first; with no
/// scripted reply the container agrees.
#[derive(Default)]
pub struct MockProbe {
    reserve_replies: Mutex<VecDeque<ProbeResult<bool>>>,
    verify_replies: Mutex<VecDeque<ProbeResult<bool>>>,
    reserve_calls: Mutex<Vec<(String, String, bool)>>,
    verify_calls: Mutex<Vec<(String, String)>>,
}

impl MockProbe {
    pub fn new() -> Self {
        MockProbe::default()
    }

    pub fn push_reserve(&self, reply: ProbeResult<bool>) {
        self.reserve_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_verify(&self, reply: ProbeResult<bool>) {
        self.verify_replies.lock().unwrap().push_back(reply);
    }

    /// `(address, request_id, retry)` per reserve call, oldest first.
    pub fn reserve_calls(&self) -> Vec<(String, String, bool)> {
        self.reserve_calls.lock().unwrap().clone()
    }

    /// `(address, request_id)` per verify call, oldest first.
    pub fn verify_calls(&self) -> Vec<(String, String)> {
        self.verify_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SlotProbe for MockProbe {
    async fn reserve(&self, address: &str, request_id: &str, retry: bool) -> ProbeResult<bool> {
        self.reserve_calls.lock().unwrap().push((
            address.to_string(),
            request_id.to_string(),
            retry,
        ));
        self.reserve_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(true))
    }

    async fn verify(&self, address: &str, request_id: &str) -> ProbeResult<bool> {
        self.verify_calls
            .lock()
            .unwrap()
            .push((address.to_string(), request_id.to_string()));
        self.verify_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(true))
    }
}
