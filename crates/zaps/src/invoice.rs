//! Invoice issuance and the end-to-end zap flow.

use crate::error::{Result, ZapError};
use crate::nwc::{NwcClient, NwcConnection};
use crate::settlement::{PollConfig, SettlementPoller, TokioSleeper};
use crate::signer::Signer;
use crate::zap_request::{ZapRequestBuilder, ZapRequestParams};
use async_trait::async_trait;
use nostr::{Event, PayInvoiceResult, Transaction};
use nostr_client::RelayTransport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// A Lightning invoice for a zap request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// BOLT-11 payment request
    pub pr: String,
}

/// Turns a signed zap request into an invoice.
#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
    async fn fetch_invoice(&self, zap_request: &Event, amount_msats: u64) -> Result<Invoice>;
}

/// LNURL-pay callback response; either an invoice or `{"status":"ERROR"}`.
#[derive(Debug, Deserialize)]
struct CallbackResponse {
    #[serde(default)]
    pr: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Requests invoices from an LNURL-pay callback.
#[derive(Debug, Clone)]
pub struct LnurlInvoiceIssuer {
    http: reqwest::Client,
    callback: Url,
    lnurl: Option<String>,
}

impl LnurlInvoiceIssuer {
    pub fn new(callback: &str) -> Result<Self> {
        let callback = Url::parse(callback)
            .map_err(|e| ZapError::Config(format!("invalid LNURL callback {}: {}", callback, e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ZapError::Invoice(e.to_string()))?;
        Ok(Self {
            http,
            callback,
            lnurl: None,
        })
    }

    /// Also send the recipient's bech32 `lnurl`.
    pub fn with_lnurl(mut self, lnurl: impl Into<String>) -> Self {
        self.lnurl = Some(lnurl.into());
        self
    }

    fn request_url(&self, zap_request: &Event, amount_msats: u64) -> Result<Url> {
        let nostr =
            serde_json::to_string(zap_request).map_err(|e| ZapError::Encoding(e.to_string()))?;
        let mut url = self.callback.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("amount", &amount_msats.to_string());
            query.append_pair("nostr", &nostr);
            if let Some(lnurl) = &self.lnurl {
                query.append_pair("lnurl", lnurl);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl InvoiceIssuer for LnurlInvoiceIssuer {
    async fn fetch_invoice(&self, zap_request: &Event, amount_msats: u64) -> Result<Invoice> {
        let url = self.request_url(zap_request, amount_msats)?;
        debug!("Requesting invoice for zap request {}", zap_request.id);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ZapError::Invoice(format!("callback request failed: {}", e)))?;
        let status = response.status();
        let body: CallbackResponse = response
            .json()
            .await
            .map_err(|e| {
                ZapError::Invoice(format!(
                    "callback returned {} with unreadable body: {}",
                    status, e
                ))
            })?;

        if body.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("ERROR")) {
            return Err(ZapError::Invoice(
                body.reason.unwrap_or_else(|| "callback reported an error".to_string()),
            ));
        }
        match body.pr {
            Some(pr) if !pr.is_empty() => Ok(Invoice { pr }),
            _ => Err(ZapError::Invoice(format!("callback returned {} without an invoice", status))),
        }
    }
}

/// Everything one zap produced.
#[derive(Debug, Clone)]
pub struct ZapOutcome {
    pub zap_request: Event,
    pub invoice: Invoice,
    pub payment: PayInvoiceResult,
    pub settlement: Transaction,
}

/// Build → invoice → pay → confirm settlement.
pub struct ZapFlow<T: RelayTransport, I: InvoiceIssuer> {
    builder: ZapRequestBuilder,
    issuer: I,
    nwc: NwcClient<T>,
    poller: SettlementPoller<NwcClient<T>, TokioSleeper>,
}

impl<T: RelayTransport, I: InvoiceIssuer> ZapFlow<T, I> {
    pub fn new(builder: ZapRequestBuilder, issuer: I, nwc: NwcClient<T>, poll: PollConfig) -> Self {
        let poller = SettlementPoller::with_sleeper(nwc.clone(), TokioSleeper, poll);
        Self {
            builder,
            issuer,
            nwc,
            poller,
        }
    }

    pub async fn zap(
        &self,
        params: &ZapRequestParams,
        signer: &Signer,
        wallet: &NwcConnection,
        cancel: &CancellationToken,
    ) -> Result<ZapOutcome> {
        let zap_request = self.builder.build(params, signer)?;
        let amount_msats = params.amount_sats.saturating_mul(1000);

        let invoice = self.issuer.fetch_invoice(&zap_request, amount_msats).await?;
        info!("Got invoice for zap request {}", zap_request.id);

        let payment = self.nwc.pay_invoice(wallet, &invoice.pr).await?;
        let settlement = self.poller.await_settlement(wallet, &invoice.pr, cancel).await?;
        info!("Zap {} settled", zap_request.id);

        Ok(ZapOutcome {
            zap_request,
            invoice,
            payment,
            settlement,
        })
    }
}
