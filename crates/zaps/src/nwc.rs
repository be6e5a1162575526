//! Nostr Wallet Connect client.
//!
//! One call is one encrypted round trip: the command is encrypted to the
//! wallet service, wrapped in a kind 23194 event and published to the
//! wallet relay; the answer is the kind 23195 event that `e`-tags the
//! request. The response subscription is always opened before the request
//! is published. [`ResponseListener::publish`] is the only way to publish a
//! request, and a listener only exists once its subscription is live.

use crate::config::ZapsConfig;
use crate::error::{Result, ZapError};
use crate::signer::{Signer, decrypt_from_peer, encrypt_to_peer};
use nostr::{
    BalanceResult, Event, EventTemplate, MakeInvoiceParams, Nip47Error, NwcUri,
    PayInvoiceResult, REQUEST_KIND, RESPONSE_KIND, Request, Response, ResponseResult,
    Transaction, get_public_key_hex, parse_secret_key_hex, verify_event,
};
use nostr_client::{ClientError, Filter, RelayTransport, Subscription};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A paired wallet. The secret never leaves this process.
#[derive(Clone)]
pub struct NwcConnection {
    secret: [u8; 32],
    pubkey: String,
    wallet_pubkey: String,
    relay: String,
}

impl fmt::Debug for NwcConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NwcConnection")
            .field("pubkey", &self.pubkey)
            .field("wallet_pubkey", &self.wallet_pubkey)
            .field("relay", &self.relay)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl NwcConnection {
    pub fn new(
        secret: [u8; 32],
        wallet_pubkey: impl Into<String>,
        relay: impl Into<String>,
    ) -> Result<Self> {
        let pubkey = get_public_key_hex(&secret).map_err(|e| ZapError::Encoding(e.to_string()))?;
        Ok(Self {
            secret,
            pubkey,
            wallet_pubkey: wallet_pubkey.into(),
            relay: relay.into(),
        })
    }

    /// Build a connection from a `nostr+walletconnect://` URI, using its first relay.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = NwcUri::parse(uri).map_err(|e| ZapError::Config(e.to_string()))?;
        let secret =
            parse_secret_key_hex(&parsed.secret).map_err(|e| ZapError::Config(e.to_string()))?;
        let relay = parsed
            .relays
            .into_iter()
            .next()
            .ok_or_else(|| ZapError::Config("wallet URI names no relay".to_string()))?;
        Self::new(secret, parsed.wallet_pubkey, relay)
    }

    /// Our pubkey as the wallet sees it.
    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    pub fn wallet_pubkey(&self) -> &str {
        &self.wallet_pubkey
    }

    pub fn relay(&self) -> &str {
        &self.relay
    }

    fn relays(&self) -> Vec<String> {
        vec![self.relay.clone()]
    }
}

#[derive(Debug, Clone)]
pub struct NwcConfig {
    /// Bound on the wait for a wallet response
    pub response_timeout: Duration,
    /// Pause between subscribing and publishing
    pub publish_delay: Duration,
}

impl Default for NwcConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(10),
            publish_delay: Duration::from_secs(1),
        }
    }
}

impl From<&ZapsConfig> for NwcConfig {
    fn from(config: &ZapsConfig) -> Self {
        Self {
            response_timeout: config.wallet_timeout(),
            publish_delay: config.publish_delay(),
        }
    }
}

/// Subscription for the response to one signed request, not yet published.
pub struct ResponseListener<'a, T: RelayTransport + ?Sized> {
    transport: &'a T,
    connection: &'a NwcConnection,
    request: Event,
    filter: Filter,
    subscription: Subscription,
}

impl<'a, T: RelayTransport + ?Sized> ResponseListener<'a, T> {
    /// Subscribe for responses to `request` on the wallet relay.
    pub async fn open(
        transport: &'a T,
        connection: &'a NwcConnection,
        request: Event,
    ) -> Result<Self> {
        let filter = Filter::new()
            .kinds(vec![RESPONSE_KIND])
            .authors(vec![connection.wallet_pubkey.clone()])
            .pubkey_refs(vec![connection.pubkey.clone()])
            .event_refs(vec![request.id.clone()]);
        let subscription = transport.subscribe(&connection.relays(), filter.clone()).await?;
        debug!(
            "Listening for response to {} on subscription {}",
            request.id,
            subscription.id()
        );

        Ok(Self {
            transport,
            connection,
            request,
            filter,
            subscription,
        })
    }

    /// Publish the request after `delay`.
    pub async fn publish(self, delay: Duration) -> Result<PendingRequest<'a>> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let confirmations = self
            .transport
            .publish(&self.connection.relays(), &self.request)
            .await?;
        if !confirmations.iter().any(|c| c.accepted) {
            let reasons: Vec<String> = confirmations
                .iter()
                .map(|c| format!("{}: {}", c.relay_url, c.message))
                .collect();
            return Err(ClientError::PublishFailed(reasons.join("; ")).into());
        }
        debug!("Published wallet request {}", self.request.id);

        Ok(PendingRequest {
            connection: self.connection,
            request_id: self.request.id,
            filter: self.filter,
            subscription: self.subscription,
        })
    }
}

/// A published request waiting for its response.
pub struct PendingRequest<'a> {
    connection: &'a NwcConnection,
    request_id: String,
    filter: Filter,
    subscription: Subscription,
}

impl PendingRequest<'_> {
    /// Wait for the wallet's response and decrypt it.
    ///
    /// Events that fail the filter or carry a bad signature are skipped.
    pub async fn wait(mut self, timeout: Duration) -> Result<Response> {
        let deadline = Instant::now() + timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, self.subscription.next_event());
            let event = match next.await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(ClientError::Subscription(format!(
                        "subscription for {} ended before a response arrived",
                        self.request_id
                    ))
                    .into());
                }
                Err(_) => {
                    warn!("No wallet response to {} within {:?}", self.request_id, timeout);
                    return Err(ZapError::Timeout(timeout));
                }
            };

            if !self.filter.matches(&event) {
                debug!("Ignoring unrelated event {}", event.id);
                continue;
            }
            if !verify_event(&event).unwrap_or(false) {
                warn!("Ignoring response {} with invalid signature", event.id);
                continue;
            }

            let plaintext = decrypt_from_peer(
                &self.connection.secret,
                &self.connection.wallet_pubkey,
                &event.content,
            )?;
            let response: Response = serde_json::from_str(&plaintext)
                .map_err(|e| ZapError::MalformedResponse(e.to_string()))?;
            self.subscription.close();
            return Ok(response);
        }
    }
}

/// Wallet Connect client over an injected relay transport.
pub struct NwcClient<T: RelayTransport> {
    transport: Arc<T>,
    config: NwcConfig,
}

impl<T: RelayTransport> Clone for NwcClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<T: RelayTransport> NwcClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_config(transport, NwcConfig::default())
    }

    pub fn with_config(transport: Arc<T>, config: NwcConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &NwcConfig {
        &self.config
    }

    /// Run one command against the wallet and return its typed result.
    pub async fn send(
        &self,
        connection: &NwcConnection,
        request: &Request,
    ) -> Result<ResponseResult> {
        let method = request.method();
        let payload =
            serde_json::to_string(request).map_err(|e| ZapError::Encoding(e.to_string()))?;
        let content = encrypt_to_peer(&connection.secret, &connection.wallet_pubkey, &payload)?;

        let template = EventTemplate::new(REQUEST_KIND, content)
            .with_tag(vec!["p".to_string(), connection.wallet_pubkey.clone()]);
        let event = Signer::Identity(connection.secret).sign(&template)?;
        let request_id = event.id.clone();

        let listener = ResponseListener::open(self.transport.as_ref(), connection, event).await?;
        let pending = listener.publish(self.config.publish_delay).await?;
        let response = pending.wait(self.config.response_timeout).await?;

        // Wallets often leave result_type blank on failure
        if let Some(error) = response.error {
            return Err(Nip47Error::Wallet(error).into());
        }
        if response.result_type != Some(method) {
            return Err(ZapError::MalformedResponse(format!(
                "asked for {} but wallet answered {}",
                method,
                response.result_type.map_or("nothing", |m| m.as_str())
            )));
        }

        let result = response.into_result()?;
        info!("Wallet answered {} request {}", method, request_id);
        Ok(result)
    }

    /// Balance in millisats.
    pub async fn get_balance(&self, connection: &NwcConnection) -> Result<u64> {
        match self.send(connection, &Request::get_balance()).await? {
            ResponseResult::GetBalance(BalanceResult { balance }) => Ok(balance),
            other => Err(unexpected(other)),
        }
    }

    pub async fn pay_invoice(
        &self,
        connection: &NwcConnection,
        invoice: &str,
    ) -> Result<PayInvoiceResult> {
        match self.send(connection, &Request::pay_invoice(invoice)).await? {
            ResponseResult::PayInvoice(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    pub async fn make_invoice(
        &self,
        connection: &NwcConnection,
        params: MakeInvoiceParams,
    ) -> Result<Transaction> {
        match self.send(connection, &Request::MakeInvoice(params)).await? {
            ResponseResult::MakeInvoice(transaction) => Ok(transaction),
            other => Err(unexpected(other)),
        }
    }

    pub async fn lookup_invoice(
        &self,
        connection: &NwcConnection,
        invoice: &str,
    ) -> Result<Transaction> {
        match self.send(connection, &Request::lookup_invoice(invoice)).await? {
            ResponseResult::LookupInvoice(transaction) => Ok(transaction),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(result: ResponseResult) -> ZapError {
    ZapError::MalformedResponse(format!("unexpected result {:?}", result))
}
