//! In-memory relay and scripted wallet shared by the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use nostr::{
    Event, EventTemplate, REQUEST_KIND, RESPONSE_KIND, Request, finalize_event,
    generate_secret_key, get_public_key_hex,
};
use nostr_client::{
    ClientError, Filter, PublishConfirmation, RelayTransport, Subscription, SubscriptionMessage,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Once};
use tokio::sync::mpsc;
use zaps::{NwcConnection, decrypt_from_peer, encrypt_to_peer};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Wallet behaviour: the response JSON for a request, or `None` to stay silent.
pub type WalletScript = Box<dyn Fn(&Request) -> Option<Value> + Send + Sync>;

pub struct StubWallet {
    secret: [u8; 32],
    pub pubkey: String,
    script: WalletScript,
    pub requests: Mutex<Vec<Request>>,
}

impl StubWallet {
    pub fn new(script: impl Fn(&Request) -> Option<Value> + Send + Sync + 'static) -> Self {
        let secret = generate_secret_key();
        Self {
            pubkey: get_public_key_hex(&secret).unwrap(),
            secret,
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn connection(&self, relay: &str) -> NwcConnection {
        NwcConnection::new(generate_secret_key(), self.pubkey.clone(), relay).unwrap()
    }

    fn answer(&self, request_event: &Event) -> Option<Event> {
        let plaintext =
            decrypt_from_peer(&self.secret, &request_event.pubkey, &request_event.content).ok()?;
        let request: Request = serde_json::from_str(&plaintext).ok()?;
        self.requests.lock().unwrap().push(request.clone());

        let body = (self.script)(&request)?;
        let content =
            encrypt_to_peer(&self.secret, &request_event.pubkey, &body.to_string()).unwrap();
        let template = EventTemplate::new(RESPONSE_KIND, content)
            .with_tag(vec!["p".to_string(), request_event.pubkey.clone()])
            .with_tag(vec!["e".to_string(), request_event.id.clone()]);
        Some(finalize_event(&template, &self.secret).unwrap())
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[derive(Default)]
struct RelayState {
    events: Vec<Event>,
    subscriptions: Vec<(Filter, mpsc::UnboundedSender<SubscriptionMessage>)>,
    queries: Vec<Filter>,
    failing_kinds: HashSet<u16>,
}

/// A relay that lives in memory. Live events only reach subscriptions that
/// were open when the event was published.
#[derive(Default)]
pub struct StubRelay {
    state: Mutex<RelayState>,
    wallet: Option<Arc<StubWallet>>,
}

pub const RELAY: &str = "wss://stub.relay";

impl StubRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wallet(wallet: Arc<StubWallet>) -> Self {
        Self {
            state: Mutex::default(),
            wallet: Some(wallet),
        }
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        let relay = Self::new();
        relay.state.lock().unwrap().events = events;
        relay
    }

    /// Make every query for `kind` fail.
    pub fn fail_kind(&self, kind: u16) {
        self.state.lock().unwrap().failing_kinds.insert(kind);
    }

    pub fn queries(&self) -> Vec<Filter> {
        self.state.lock().unwrap().queries.clone()
    }

    fn deliver(&self, event: &Event) {
        let mut state = self.state.lock().unwrap();
        state.subscriptions.retain(|(filter, tx)| {
            if filter.matches(event) {
                tx.send(SubscriptionMessage::Event {
                    relay_url: RELAY.to_string(),
                    event: event.clone(),
                })
                .is_ok()
            } else {
                !tx.is_closed()
            }
        });
        state.events.push(event.clone());
    }
}

#[async_trait]
impl RelayTransport for StubRelay {
    async fn publish(
        &self,
        _relays: &[String],
        event: &Event,
    ) -> nostr_client::Result<Vec<PublishConfirmation>> {
        self.deliver(event);

        if event.kind == REQUEST_KIND
            && let Some(wallet) = &self.wallet
            && event.has_tag("p", &wallet.pubkey)
            && let Some(response) = wallet.answer(event)
        {
            self.deliver(&response);
        }

        Ok(vec![PublishConfirmation {
            relay_url: RELAY.to_string(),
            event_id: event.id.clone(),
            accepted: true,
            message: String::new(),
        }])
    }

    async fn query_sync(
        &self,
        _relays: &[String],
        filter: Filter,
    ) -> nostr_client::Result<Vec<Event>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(filter.clone());

        if let Some(kinds) = &filter.kinds
            && kinds.iter().any(|k| state.failing_kinds.contains(k))
        {
            return Err(ClientError::Connection("stub relay refused".to_string()));
        }

        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            events.truncate(limit as usize);
        }
        Ok(events)
    }

    async fn subscribe(
        &self,
        _relays: &[String],
        filter: Filter,
    ) -> nostr_client::Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().subscriptions.push((filter, tx));
        Ok(Subscription::new(nostr_client::generate_subscription_id(), rx))
    }
}

/// Sign `template` with a fresh key.
pub fn sign(template: EventTemplate) -> Event {
    finalize_event(&template, &generate_secret_key()).unwrap()
}
