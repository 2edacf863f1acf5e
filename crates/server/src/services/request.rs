// Request tracker service
//
// One request per submitted event, PENDING until it reaches exactly one
// terminal state. Unknown ids and transitions out of a terminal state are
// silent no-ops.

use std::sync::Arc;

use chrono::Utc;
use parley_core::ids::new_request_id;
use parley_core::{ChatRequest, RequestState, RequestStore, Result};

pub struct RequestService {
    store: Arc<dyn RequestStore>,
}

impl RequestService {
    pub fn new(store: Arc<dyn RequestStore>) -> Self {
        Self { store }
    }

    /// Open a PENDING request for a freshly recorded user event.
    pub async fn create(&self, conversation_id: &str, user_event_id: &str) -> Result<ChatRequest> {
        let request = ChatRequest::pending(
            new_request_id(),
            conversation_id.to_string(),
            user_event_id.to_string(),
            Utc::now(),
        );
        self.store.insert_request(request).await
    }

    pub async fn complete(&self, request_id: &str) -> Result<bool> {
        self.transition(request_id, RequestState::Completed).await
    }

    /// Advisory to the responder; takes effect on history immediately.
    pub async fn cancel(&self, request_id: &str) -> Result<bool> {
        self.transition(request_id, RequestState::CancelledByUser)
            .await
    }

    pub async fn fail(&self, request_id: &str) -> Result<bool> {
        self.transition(request_id, RequestState::ErroredAtMl).await
    }

    pub async fn time_out(&self, request_id: &str) -> Result<bool> {
        self.transition(request_id, RequestState::TimedOutByBe).await
    }

    pub async fn get(&self, request_id: &str) -> Result<Option<ChatRequest>> {
        self.store.get_request(request_id).await
    }

    pub async fn is_pending(&self, request_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get_request(request_id)
            .await?
            .is_some_and(|r| r.is_pending()))
    }

    pub async fn has_pending(&self, conversation_id: &str) -> Result<bool> {
        self.store.has_pending(conversation_id).await
    }

    async fn transition(&self, request_id: &str, to: RequestState) -> Result<bool> {
        let updated = self.store.transition_request(request_id, to).await?;
        match &updated {
            Some(request) => tracing::info!(
                request_id = %request_id,
                conversation_id = %request.conversation_id,
                state = %to,
                "Request transitioned"
            ),
            None => tracing::debug!(
                request_id = %request_id,
                state = %to,
                "Request transition ignored (unknown or terminal)"
            ),
        }
        Ok(updated.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryDatabase;

    fn service() -> RequestService {
        RequestService::new(Arc::new(InMemoryDatabase::new()))
    }

    #[tokio::test]
    async fn test_create_is_pending() {
        let service = service();
        let request = service.create("conv_1", "evt_1").await.unwrap();

        assert!(request.request_id.starts_with("req_"));
        assert_eq!(request.state, RequestState::Pending);
        assert!(service.is_pending(&request.request_id).await.unwrap());
        assert!(service.has_pending("conv_1").await.unwrap());
        assert!(!service.has_pending("conv_2").await.unwrap());
    }

    #[tokio::test]
    async fn test_each_request_reaches_one_terminal_state() {
        let service = service();
        let request = service.create("conv_1", "evt_1").await.unwrap();

        assert!(service.cancel(&request.request_id).await.unwrap());
        assert!(!service.complete(&request.request_id).await.unwrap());
        assert!(!service.fail(&request.request_id).await.unwrap());
        assert!(!service.time_out(&request.request_id).await.unwrap());

        let stored = service.get(&request.request_id).await.unwrap().unwrap();
        assert_eq!(stored.state, RequestState::CancelledByUser);
        assert!(!service.is_pending(&request.request_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_ignored() {
        let service = service();
        assert!(!service.cancel("req_missing").await.unwrap());
        assert!(!service.is_pending("req_missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_independent_requests_in_one_conversation() {
        let service = service();
        let first = service.create("conv_1", "evt_1").await.unwrap();
        let second = service.create("conv_1", "evt_2").await.unwrap();

        service.cancel(&first.request_id).await.unwrap();
        assert!(service.has_pending("conv_1").await.unwrap());

        service.complete(&second.request_id).await.unwrap();
        assert!(!service.has_pending("conv_1").await.unwrap());
    }
}
