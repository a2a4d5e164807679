//! Conversation Resolver
//!
//! One actor owns the contact -> conversation id cache. The actor loop itself
//! never waits on the network: cache hits are answered inline, and each
//! lookup-then-create runs in its own task. At most one such task is in flight
//! per contact identifier; later requests for the same contact wait for its
//! result, so two first-contact events cannot both decide to create.

use crate::actors::messages::*;
use crate::core::error::{StoreError, StoreResult};
use crate::core::models::{ConversationRecord, IdRow};
use crate::core::rest::{Endpoint, RestClient};
use std::collections::HashMap;
use tokio::sync::mpsc::{
    channel, unbounded_channel, Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
use tokio::sync::oneshot;

pub const CONVERSATIONS: &str = "conversations";

#[derive(Clone)]
pub struct ResolverHandle {
    sender: Sender<ResolverMessage>,
}

impl ResolverHandle {
    pub fn new(client: RestClient, channel_name: String, buffer_size: usize) -> Self {
        let (sender, receiver) = channel(buffer_size.max(1));
        let (done_tx, done_rx) = unbounded_channel();
        let resolver = ConversationResolver::new(client, channel_name, done_tx);
        tokio::spawn(resolver_actor(receiver, done_rx, resolver));
        Self { sender }
    }

    /// Map a contact identifier to its conversation id, creating the conversation if absent
    pub async fn resolve(
        &self,
        contact_identifier: &str,
        display_name: Option<&str>,
        freshness: Freshness,
    ) -> StoreResult<String> {
        let (response, rx) = oneshot::channel();
        let request = ResolveRequest {
            contact_identifier: contact_identifier.to_string(),
            display_name: display_name.map(str::to_string),
            freshness,
            response,
        };

        self.sender
            .send(ResolverMessage::Resolve(request))
            .await
            .map_err(|_| StoreError::ResolverClosed)?;

        rx.await.map_err(|_| StoreError::ResolverClosed)?
    }

    /// Cached id for a contact, without touching the store
    pub async fn cached(&self, contact_identifier: &str) -> Option<String> {
        let (response, rx) = oneshot::channel();
        let message = ResolverMessage::CachedId {
            contact_identifier: contact_identifier.to_string(),
            response,
        };
        if self.sender.send(message).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(ResolverMessage::Shutdown).await;
    }
}

async fn resolver_actor(
    mut receiver: Receiver<ResolverMessage>,
    mut completions: UnboundedReceiver<Resolution>,
    mut resolver: ConversationResolver,
) {
    tracing::info!("Resolver actor started");

    loop {
        tokio::select! {
            message = receiver.recv() => match message {
                Some(ResolverMessage::Resolve(request)) => resolver.dispatch(request),
                Some(ResolverMessage::CachedId {
                    contact_identifier,
                    response,
                }) => {
                    let _ = response.send(resolver.cache.get(&contact_identifier).cloned());
                }
                Some(ResolverMessage::Shutdown) => {
                    tracing::info!("Resolver actor received shutdown signal");
                    break;
                }
                None => break,
            },
            Some(resolution) = completions.recv() => resolver.complete(resolution),
        }
    }

    tracing::info!("Resolver actor stopped");
}

struct ConversationResolver {
    client: RestClient,
    channel: String,
    cache: HashMap<String, String>,
    /// Contacts with a lookup-then-create running, and the requests waiting on it
    in_flight: HashMap<String, Vec<ResolveRequest>>,
    done: UnboundedSender<Resolution>,
}

impl ConversationResolver {
    fn new(client: RestClient, channel: String, done: UnboundedSender<Resolution>) -> Self {
        Self {
            client,
            channel,
            cache: HashMap::new(),
            in_flight: HashMap::new(),
            done,
        }
    }

    fn dispatch(&mut self, request: ResolveRequest) {
        if request.freshness == Freshness::Cached {
            if let Some(id) = self.cache.get(&request.contact_identifier) {
                tracing::debug!(
                    "Conversation for {} served from cache",
                    request.contact_identifier
                );
                let _ = request.response.send(Ok(id.clone()));
                return;
            }
        }

        if let Some(waiting) = self.in_flight.get_mut(&request.contact_identifier) {
            waiting.push(request);
            return;
        }

        self.start(request.contact_identifier.clone(), request.display_name.clone());
        self.in_flight
            .insert(request.contact_identifier.clone(), vec![request]);
    }

    fn start(&self, contact_identifier: String, display_name: Option<String>) {
        let lookup = Lookup {
            client: self.client.clone(),
            channel: self.channel.clone(),
        };
        let done = self.done.clone();

        tokio::spawn(async move {
            let result = lookup
                .lookup_or_create(&contact_identifier, display_name.as_deref())
                .await;
            let _ = done.send(Resolution {
                contact_identifier,
                result,
            });
        });
    }

    fn complete(&mut self, resolution: Resolution) {
        let Resolution {
            contact_identifier,
            result,
        } = resolution;
        let mut waiting = self
            .in_flight
            .remove(&contact_identifier)
            .unwrap_or_default()
            .into_iter();

        match result {
            Ok(id) => {
                self.cache.insert(contact_identifier, id.clone());
                for request in waiting {
                    let _ = request.response.send(Ok(id.clone()));
                }
            }
            Err(e) => {
                tracing::error!(
                    "Failed to resolve conversation for {}: {}",
                    contact_identifier,
                    e
                );
                if let Some(first) = waiting.next() {
                    let _ = first.response.send(Err(e));
                }

                // errors are not shareable; the rest get an attempt of their own
                let rest: Vec<ResolveRequest> = waiting.collect();
                if let Some(next) = rest.first() {
                    self.start(contact_identifier.clone(), next.display_name.clone());
                    self.in_flight.insert(contact_identifier, rest);
                }
            }
        }
    }
}

/// The network half of a resolution, run off the actor loop
struct Lookup {
    client: RestClient,
    channel: String,
}

impl Lookup {
    async fn lookup_or_create(
        &self,
        contact_identifier: &str,
        display_name: Option<&str>,
    ) -> StoreResult<String> {
        // a create is only ever decided from an empty authoritative lookup
        match self.lookup(contact_identifier).await? {
            Some(id) => Ok(id),
            None => self.create(contact_identifier, display_name).await,
        }
    }

    async fn lookup(&self, contact_identifier: &str) -> StoreResult<Option<String>> {
        let endpoint = Endpoint::new(CONVERSATIONS)
            .eq("channel", &self.channel)
            .eq("contact_identifier", contact_identifier)
            .select("id");

        let rows: Vec<IdRow> = self.client.select(&endpoint).await?;
        Ok(rows.into_iter().next().map(|row| row.id))
    }

    async fn create(
        &self,
        contact_identifier: &str,
        display_name: Option<&str>,
    ) -> StoreResult<String> {
        let record = ConversationRecord::new(&self.channel, contact_identifier, display_name);
        let rows: Vec<IdRow> = self.client.insert(CONVERSATIONS, &record).await?;

        let id = rows
            .into_iter()
            .next()
            .map(|row| row.id)
            .ok_or(StoreError::NotCreated("conversation"))?;

        tracing::info!("Created conversation {} for {}", id, contact_identifier);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteCredentials;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handle_for(server: &MockServer) -> ResolverHandle {
        let credentials = RemoteCredentials {
            url: server.uri(),
            key: "k".to_string(),
        };
        let client = RestClient::new(&credentials, Duration::from_secs(5)).unwrap();
        ResolverHandle::new(client, "whatsapp".to_string(), 8)
    }

    #[tokio::test]
    async fn test_existing_conversation_is_reused() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/conversations"))
            .and(query_param("channel", "eq.whatsapp"))
            .and(query_param("contact_identifier", "eq.123@x"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "id": "c1" }, { "id": "c2" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let handle = handle_for(&server);
        let id = handle.resolve("123@x", None, Freshness::Fresh).await.unwrap();
        assert_eq!(id, "c1");
        assert_eq!(handle.cached("123@x").await, Some("c1".to_string()));
    }

    #[tokio::test]
    async fn test_missing_conversation_is_created() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/conversations"))
            .and(body_partial_json(json!({
                "channel": "whatsapp",
                "contact_identifier": "123@x",
                "contact_name": "Alice",
                "status": "active"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": "new-1" }])))
            .expect(1)
            .mount(&server)
            .await;

        let handle = handle_for(&server);
        let id = handle
            .resolve("123@x", Some("Alice"), Freshness::Fresh)
            .await
            .unwrap();
        assert_eq!(id, "new-1");
    }

    #[tokio::test]
    async fn test_create_without_returned_row_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&server)
            .await;

        let handle = handle_for(&server);
        let err = handle.resolve("123@x", None, Freshness::Fresh).await.unwrap_err();
        assert!(matches!(err, StoreError::NotCreated("conversation")));
        assert_eq!(handle.cached("123@x").await, None);
    }

    #[tokio::test]
    async fn test_cached_mode_skips_lookup() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "c1" }])))
            .expect(1)
            .mount(&server)
            .await;

        let handle = handle_for(&server);
        let first = handle.resolve("123@x", None, Freshness::Cached).await.unwrap();
        let second = handle.resolve("123@x", None, Freshness::Cached).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sequential_resolution_creates_once() {
        let server = MockServer::start().await;

        // first lookup sees nothing, every later one sees the created row
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "c1" }])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": "c1" }])))
            .expect(1)
            .mount(&server)
            .await;

        let handle = handle_for(&server);
        let first = handle.resolve("123@x", None, Freshness::Fresh).await.unwrap();
        let second = handle.resolve("123@x", None, Freshness::Fresh).await.unwrap();
        assert_eq!(first, "c1");
        assert_eq!(second, "c1");
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let handle = handle_for(&server);
        let err = handle.resolve("123@x", None, Freshness::Cached).await.unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_resolve_after_shutdown() {
        let server = MockServer::start().await;
        let handle = handle_for(&server);

        handle.shutdown().await;
        // give the actor a moment to drain and drop its receiver
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = handle.resolve("123@x", None, Freshness::Cached).await.unwrap_err();
        assert!(matches!(err, StoreError::ResolverClosed));
    }

    #[tokio::test]
    async fn test_cache_hit_not_blocked_by_other_contact() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("contact_identifier", "eq.slow@x"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "id": "c-slow" }]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("contact_identifier", "eq.fast@x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "c-fast" }])))
            .expect(1)
            .mount(&server)
            .await;

        let handle = handle_for(&server);
        handle.resolve("fast@x", None, Freshness::Cached).await.unwrap();

        let slow_handle = handle.clone();
        let slow = tokio::spawn(async move {
            slow_handle.resolve("slow@x", None, Freshness::Cached).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        let id = handle.resolve("fast@x", None, Freshness::Cached).await.unwrap();
        assert_eq!(id, "c-fast");
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(slow.await.unwrap().unwrap(), "c-slow");
    }

    #[tokio::test]
    async fn test_concurrent_failures_all_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_string("unavailable")
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;

        let handle = handle_for(&server);
        let (first, second) = tokio::join!(
            handle.resolve("123@x", None, Freshness::Cached),
            handle.resolve("123@x", None, Freshness::Cached)
        );
        assert!(matches!(first, Err(StoreError::Api { status: 503, .. })));
        assert!(matches!(second, Err(StoreError::Api { status: 503, .. })));
        assert_eq!(handle.cached("123@x").await, None);
    }
}
