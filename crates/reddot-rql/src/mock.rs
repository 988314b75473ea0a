//! In-memory transport with scripted replies.
//!
//! Rules match on a substring of the rendered request. One-shot rules are
//! consumed in registration order and take precedence over persistent rules;
//! among persistent rules the most recently registered match wins, so a test
//! can change what the "server" returns halfway through.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::{RawReply, Transport};

#[derive(Debug, Clone)]
enum MockResponse {
    Reply(RawReply),
    Unreachable,
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    response: MockResponse,
}

#[derive(Debug, Default)]
struct MockState {
    once: Vec<Rule>,
    persistent: Vec<Rule>,
    requests: Vec<String>,
}

/// A [`Transport`] that answers from a script and records every request.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, needle: &str, response: MockResponse, once: bool) -> &Self {
        let rule = Rule {
            needle: needle.to_string(),
            response,
        };
        let mut state = self.state();
        if once {
            state.once.push(rule);
        } else {
            state.persistent.push(rule);
        }
        drop(state);
        self
    }

    /// Answer every request containing `needle` with `body`.
    pub fn on(&self, needle: &str, body: &str) -> &Self {
        self.push(needle, MockResponse::Reply(RawReply::ok(body)), false)
    }

    /// Answer the next request containing `needle` with `body`.
    pub fn once(&self, needle: &str, body: &str) -> &Self {
        self.push(needle, MockResponse::Reply(RawReply::ok(body)), true)
    }

    /// Answer every request containing `needle` with a server error.
    pub fn on_error(&self, needle: &str, error: &str) -> &Self {
        self.push(needle, MockResponse::Reply(RawReply::error(error)), false)
    }

    /// Answer the next request containing `needle` with a server error.
    pub fn once_error(&self, needle: &str, error: &str) -> &Self {
        self.push(needle, MockResponse::Reply(RawReply::error(error)), true)
    }

    /// Answer with a full raw reply (body, error and result info).
    pub fn on_raw(&self, needle: &str, reply: RawReply) -> &Self {
        self.push(needle, MockResponse::Reply(reply), false)
    }

    /// Fail the next request containing `needle` as if the server were down.
    pub fn once_unreachable(&self, needle: &str) -> &Self {
        self.push(needle, MockResponse::Unreachable, true)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    /// Number of received requests containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.contains(needle))
            .count()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, command: &str) -> Result<RawReply, TransportError> {
        let mut state = self.state();
        state.requests.push(command.to_string());

        let response = if let Some(pos) = state.once.iter().position(|r| command.contains(&r.needle)) {
            Some(state.once.remove(pos).response)
        } else {
            state
                .persistent
                .iter()
                .rev()
                .find(|r| command.contains(&r.needle))
                .map(|r| r.response.clone())
        };

        match response {
            Some(MockResponse::Reply(reply)) => Ok(reply),
            Some(MockResponse::Unreachable) => {
                Err(TransportError::Unreachable("mock endpoint is down".into()))
            }
            None => Err(TransportError::Unreachable(format!(
                "no scripted reply for request: {command}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persistent_rule_latest_wins() {
        let mock = MockTransport::new();
        mock.on("LIST", "<A/>");
        assert_eq!(mock.execute("<LIST/>").await.unwrap().body, "<A/>");
        mock.on("LIST", "<B/>");
        assert_eq!(mock.execute("<LIST/>").await.unwrap().body, "<B/>");
        assert_eq!(mock.count("LIST"), 2);
    }

    #[tokio::test]
    async fn test_once_rules_take_precedence_and_are_consumed() {
        let mock = MockTransport::new();
        mock.on("X", "<persistent/>").once("X", "<first/>").once("X", "<second/>");
        assert_eq!(mock.execute("X").await.unwrap().body, "<first/>");
        assert_eq!(mock.execute("X").await.unwrap().body, "<second/>");
        assert_eq!(mock.execute("X").await.unwrap().body, "<persistent/>");
    }

    #[tokio::test]
    async fn test_errors_and_unmatched() {
        let mock = MockTransport::new();
        mock.on_error("BAD", "#RDError16").once_unreachable("DOWN");
        assert_eq!(
            mock.execute("BAD").await.unwrap().error.as_deref(),
            Some("#RDError16")
        );
        assert!(matches!(
            mock.execute("DOWN").await,
            Err(TransportError::Unreachable(_))
        ));
        assert!(mock.execute("OTHER").await.is_err());
        assert_eq!(mock.requests(), vec!["BAD", "DOWN", "OTHER"]);
    }
}
