//! NIP-47: Nostr Wallet Connect.
//!
//! A client holds a connection secret and talks to a wallet service by
//! publishing encrypted kind-23194 requests `p`-tagged to the wallet. The
//! wallet answers with kind-23195 responses `p`-tagged back to the client and
//! `e`-tagged with the request id. Payloads are NIP-04 encrypted JSON.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/47.md>

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Wallet request events.
pub const REQUEST_KIND: u16 = 23194;
/// Wallet response events.
pub const RESPONSE_KIND: u16 = 23195;
/// Replaceable wallet capability announcement.
pub const INFO_EVENT_KIND: u16 = 13194;

const URI_SCHEMES: [&str; 2] = ["nostr+walletconnect", "nostrwalletconnect"];

#[derive(Debug, Error)]
pub enum Nip47Error {
    #[error("invalid connection uri: {0}")]
    InvalidUri(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wallet error {}: {}", .0.code, .0.message)]
    Wallet(ErrorResponse),

    #[error("response is missing a result for {0}")]
    MissingResult(Method),

    #[error("response has no known result_type")]
    UnknownResultType,
}

/// Command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    GetBalance,
    PayInvoice,
    MakeInvoice,
    LookupInvoice,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GetBalance => "get_balance",
            Method::PayInvoice => "pay_invoice",
            Method::MakeInvoice => "make_invoice",
            Method::LookupInvoice => "lookup_invoice",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayInvoiceParams {
    pub invoice: String,
    /// Amount in millisats, for zero-amount invoices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeInvoiceParams {
    /// Amount in millisats
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_hash: Option<String>,
    /// Seconds until the invoice expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

/// Look an invoice up by exactly one of its identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupInvoiceParams {
    Invoice { invoice: String },
    PaymentHash { payment_hash: String },
}

/// A wallet command, serialized as `{"method": .., "params": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    GetBalance {},
    PayInvoice(PayInvoiceParams),
    MakeInvoice(MakeInvoiceParams),
    LookupInvoice(LookupInvoiceParams),
}

impl Request {
    pub fn get_balance() -> Self {
        Request::GetBalance {}
    }

    pub fn pay_invoice(invoice: impl Into<String>) -> Self {
        Request::PayInvoice(PayInvoiceParams {
            invoice: invoice.into(),
            amount: None,
        })
    }

    pub fn lookup_invoice(invoice: impl Into<String>) -> Self {
        Request::LookupInvoice(LookupInvoiceParams::Invoice {
            invoice: invoice.into(),
        })
    }

    pub fn method(&self) -> Method {
        match self {
            Request::GetBalance {} => Method::GetBalance,
            Request::PayInvoice(_) => Method::PayInvoice,
            Request::MakeInvoice(_) => Method::MakeInvoice,
            Request::LookupInvoice(_) => Method::LookupInvoice,
        }
    }
}

/// Error codes a wallet service may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimited,
    NotImplemented,
    InsufficientBalance,
    QuotaExceeded,
    Restricted,
    Unauthorized,
    Internal,
    PaymentFailed,
    NotFound,
    #[serde(other)]
    Other,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::Restricted => "RESTRICTED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::PaymentFailed => "PAYMENT_FAILED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Other => "OTHER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Incoming,
    Outgoing,
}

/// Result of `make_invoice` and `lookup_invoice`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
    #[serde(default)]
    pub payment_hash: String,
    /// Millisats
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub fees_paid: u64,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<u64>,
}

impl Transaction {
    /// A transaction is settled once the wallet reports a non-zero `settled_at`.
    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some_and(|at| at > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResult {
    /// Millisats
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayInvoiceResult {
    pub preimage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees_paid: Option<u64>,
}

/// Decrypted response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// `None` when the wallet leaves it blank or names a command we don't speak.
    #[serde(default, deserialize_with = "lenient_method")]
    pub result_type: Option<Method>,
    #[serde(default)]
    pub error: Option<ErrorResponse>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Typed result for each command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseResult {
    GetBalance(BalanceResult),
    PayInvoice(PayInvoiceResult),
    MakeInvoice(Transaction),
    LookupInvoice(Transaction),
}

impl Response {
    /// Resolve into the typed result, surfacing a wallet error object as
    /// [`Nip47Error::Wallet`].
    pub fn into_result(self) -> Result<ResponseResult, Nip47Error> {
        if let Some(error) = self.error {
            return Err(Nip47Error::Wallet(error));
        }
        let method = self.result_type.ok_or(Nip47Error::UnknownResultType)?;
        let value = self.result.ok_or(Nip47Error::MissingResult(method))?;

        fn typed<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, Nip47Error> {
            Ok(serde_json::from_value(value)?)
        }

        Ok(match method {
            Method::GetBalance => ResponseResult::GetBalance(typed(value)?),
            Method::PayInvoice => ResponseResult::PayInvoice(typed(value)?),
            Method::MakeInvoice => ResponseResult::MakeInvoice(typed(value)?),
            Method::LookupInvoice => ResponseResult::LookupInvoice(typed(value)?),
        })
    }
}

fn lenient_method<'de, D>(deserializer: D) -> Result<Option<Method>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// A parsed `nostr+walletconnect://` pairing URI.
#[derive(Clone, PartialEq, Eq)]
pub struct NwcUri {
    /// Wallet service public key (hex)
    pub wallet_pubkey: String,
    pub relays: Vec<String>,
    /// Connection secret (hex)
    pub secret: String,
    pub lud16: Option<String>,
}

impl fmt::Debug for NwcUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NwcUri")
            .field("wallet_pubkey", &self.wallet_pubkey)
            .field("relays", &self.relays)
            .field("secret", &"<redacted>")
            .field("lud16", &self.lud16)
            .finish()
    }
}

impl NwcUri {
    pub fn parse(uri: &str) -> Result<Self, Nip47Error> {
        let url = Url::parse(uri.trim()).map_err(|e| Nip47Error::InvalidUri(e.to_string()))?;

        if !URI_SCHEMES.contains(&url.scheme()) {
            return Err(Nip47Error::InvalidUri(format!(
                "unexpected scheme {}",
                url.scheme()
            )));
        }

        let wallet_pubkey = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(str::to_lowercase)
            .ok_or_else(|| Nip47Error::InvalidUri("missing wallet pubkey".to_string()))?;
        if !is_hex_key(&wallet_pubkey) {
            return Err(Nip47Error::InvalidUri(
                "wallet pubkey must be 64 hex characters".to_string(),
            ));
        }

        let mut relays = Vec::new();
        let mut secret = None;
        let mut lud16 = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay" => relays.push(value.into_owned()),
                "secret" => secret = Some(value.to_lowercase()),
                "lud16" => lud16 = Some(value.into_owned()),
                _ => {}
            }
        }

        if relays.is_empty() {
            return Err(Nip47Error::InvalidUri("missing relay".to_string()));
        }
        let secret = secret
            .filter(|s| is_hex_key(s))
            .ok_or_else(|| Nip47Error::InvalidUri("missing or malformed secret".to_string()))?;

        Ok(Self {
            wallet_pubkey,
            relays,
            secret,
            lud16,
        })
    }
}

fn is_hex_key(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const WALLET: &str = "b889ff5b1513b641e2a139f661a661364979c5beee91842f8f0ef42ab558e9d4";
    const SECRET: &str = "71a8c14c1407c113601079c4302dab36460f0ccd0ad506f1f2dc73b5100e4f3c";

    #[test]
    fn test_request_wire_shape() {
        assert_eq!(
            serde_json::to_value(Request::get_balance()).unwrap(),
            json!({"method": "get_balance", "params": {}})
        );
        assert_eq!(
            serde_json::to_value(Request::pay_invoice("lnbc1")).unwrap(),
            json!({"method": "pay_invoice", "params": {"invoice": "lnbc1"}})
        );
        assert_eq!(
            serde_json::to_value(Request::lookup_invoice("lnbc1")).unwrap(),
            json!({"method": "lookup_invoice", "params": {"invoice": "lnbc1"}})
        );

        let by_hash = Request::LookupInvoice(LookupInvoiceParams::PaymentHash {
            payment_hash: "ab".to_string(),
        });
        assert_eq!(
            serde_json::to_value(by_hash).unwrap(),
            json!({"method": "lookup_invoice", "params": {"payment_hash": "ab"}})
        );

        let make = Request::MakeInvoice(MakeInvoiceParams {
            amount: 21_000,
            description: Some("coffee".to_string()),
            description_hash: None,
            expiry: Some(600),
        });
        assert_eq!(
            serde_json::to_value(&make).unwrap(),
            json!({
                "method": "make_invoice",
                "params": {"amount": 21000, "description": "coffee", "expiry": 600}
            })
        );
        assert_eq!(make.method(), Method::MakeInvoice);
    }

    #[test]
    fn test_balance_response() {
        let response: Response = serde_json::from_value(json!({
            "result_type": "get_balance",
            "result": {"balance": 10000}
        }))
        .unwrap();

        assert_eq!(
            response.into_result().unwrap(),
            ResponseResult::GetBalance(BalanceResult { balance: 10000 })
        );
    }

    #[test]
    fn test_lookup_response_settlement() {
        let response: Response = serde_json::from_value(json!({
            "result_type": "lookup_invoice",
            "error": null,
            "result": {
                "type": "incoming",
                "invoice": "lnbc1",
                "payment_hash": "ff",
                "amount": 1000000,
                "fees_paid": 0,
                "created_at": 1700000000,
                "settled_at": 1700000042
            }
        }))
        .unwrap();

        let ResponseResult::LookupInvoice(tx) = response.into_result().unwrap() else {
            panic!("expected lookup result");
        };
        assert!(tx.is_settled());
        assert_eq!(tx.transaction_type, Some(TransactionType::Incoming));

        let pending = Transaction {
            settled_at: Some(0),
            ..Transaction::default()
        };
        assert!(!pending.is_settled());
        assert!(!Transaction::default().is_settled());
    }

    #[test]
    fn test_error_response() {
        let response: Response = serde_json::from_value(json!({
            "result_type": "pay_invoice",
            "error": {"code": "INSUFFICIENT_BALANCE", "message": "not enough sats"},
            "result": null
        }))
        .unwrap();

        match response.into_result() {
            Err(Nip47Error::Wallet(err)) => {
                assert_eq!(err.code, ErrorCode::InsufficientBalance);
                assert_eq!(err.message, "not enough sats");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_error_code_maps_to_other() {
        let err: ErrorResponse =
            serde_json::from_value(json!({"code": "SOMETHING_NEW", "message": "x"})).unwrap();
        assert_eq!(err.code, ErrorCode::Other);
    }

    #[test]
    fn test_missing_result() {
        let response: Response =
            serde_json::from_value(json!({"result_type": "get_balance"})).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(Nip47Error::MissingResult(Method::GetBalance))
        ));
    }

    #[test]
    fn test_error_with_blank_result_type() {
        let response: Response = serde_json::from_value(json!({
            "result_type": "",
            "error": {"code": "INSUFFICIENT_BALANCE", "message": "not enough sats"}
        }))
        .unwrap();
        assert_eq!(response.result_type, None);
        match response.into_result() {
            Err(Nip47Error::Wallet(error)) => {
                assert_eq!(error.code, ErrorCode::InsufficientBalance)
            }
            other => panic!("expected wallet error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_result_type_without_error() {
        let response: Response = serde_json::from_value(json!({
            "result_type": "list_transactions",
            "result": {"transactions": []}
        }))
        .unwrap();
        assert!(matches!(
            response.into_result(),
            Err(Nip47Error::UnknownResultType)
        ));
    }

    #[test]
    fn test_parse_uri() {
        let uri = format!(
            "nostr+walletconnect://{}?relay=wss%3A%2F%2Frelay.damus.io&relay=wss://nos.lol&secret={}&lud16=alice%40example.com",
            WALLET, SECRET
        );
        let parsed = NwcUri::parse(&uri).unwrap();

        assert_eq!(parsed.wallet_pubkey, WALLET);
        assert_eq!(parsed.relays, vec!["wss://relay.damus.io", "wss://nos.lol"]);
        assert_eq!(parsed.secret, SECRET);
        assert_eq!(parsed.lud16.as_deref(), Some("alice@example.com"));
        assert!(!format!("{:?}", parsed).contains(SECRET));
    }

    #[test]
    fn test_parse_uri_rejects_bad_input() {
        let no_secret = format!("nostr+walletconnect://{}?relay=wss://r.example", WALLET);
        assert!(NwcUri::parse(&no_secret).is_err());

        let no_relay = format!("nostr+walletconnect://{}?secret={}", WALLET, SECRET);
        assert!(NwcUri::parse(&no_relay).is_err());

        let wrong_scheme = format!("https://{}?relay=wss://r.example&secret={}", WALLET, SECRET);
        assert!(NwcUri::parse(&wrong_scheme).is_err());

        assert!(NwcUri::parse("nostr+walletconnect://abc?relay=wss://r&secret=00").is_err());
    }
}
