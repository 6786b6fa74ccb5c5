//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent
///
/// Generation and repair prompts carry everything the model needs, so no
/// conversation state is kept between calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request (blocking until complete)
    ///
    /// Implementations retry transient transport failures themselves and
    /// return the last error once their retry budget is spent.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Short provider/model label for logs
    fn describe(&self) -> String {
        "llm".to_string()
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Mock LLM client for unit tests
    ///
    /// Returns canned responses in order and records every request it saw.
    pub struct MockLlmClient {
        responses: Vec<CompletionResponse>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            debug!(response_count = %responses.len(), "MockLlmClient::new: called");
            Self {
                responses,
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Mock that answers with the given texts in order
        pub fn with_texts(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| CompletionResponse::text(*t)).collect())
        }

        pub fn call_count(&self) -> usize {
            debug!("MockLlmClient::call_count: called");
            self.call_count.load(Ordering::SeqCst)
        }

        /// User text of every request received so far
        pub fn user_texts(&self) -> Vec<String> {
            self.requests
                .lock()
                .map(|reqs| reqs.iter().map(|r| r.user_text()).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::complete: called");
            if let Ok(mut reqs) = self.requests.lock() {
                reqs.push(request);
            }
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockLlmClient::complete: fetching response");
            self.responses.get(idx).cloned().ok_or_else(|| {
                debug!("MockLlmClient::complete: no more mock responses");
                LlmError::InvalidResponse("No more mock responses".to_string())
            })
        }

        fn describe(&self) -> String {
            "mock".to_string()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_client_returns_responses() {
            let client = MockLlmClient::with_texts(&["Response 1", "Response 2"]);
            let req = CompletionRequest::single("Test", "hello", 1000);

            let resp1 = client.complete(req.clone()).await.unwrap();
            assert_eq!(resp1.content, Some("Response 1".to_string()));

            let resp2 = client.complete(req.clone()).await.unwrap();
            assert_eq!(resp2.content, Some("Response 2".to_string()));

            assert_eq!(client.call_count(), 2);
            assert_eq!(client.user_texts(), vec!["hello", "hello"]);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            let result = client.complete(CompletionRequest::single("Test", "x", 1000)).await;
            assert!(result.is_err());
        }
    }
}
