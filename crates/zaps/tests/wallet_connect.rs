//! Wallet Connect round trips and settlement polling against a scripted wallet.

mod common;

use common::{RELAY, StubRelay, StubWallet, init_tracing};
use nostr::{ErrorCode, LookupInvoiceParams, Request};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zaps::{NwcClient, NwcConfig, PollConfig, SettlementPoller, ZapError};

fn quick() -> NwcConfig {
    NwcConfig {
        response_timeout: Duration::from_secs(10),
        publish_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_get_balance_round_trip() {
    init_tracing();
    let wallet = Arc::new(StubWallet::new(|request| match request {
        Request::GetBalance {} => Some(json!({
            "result_type": "get_balance",
            "result": {"balance": 21_000}
        })),
        _ => None,
    }));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let client = NwcClient::with_config(relay, quick());

    let balance = client.get_balance(&wallet.connection(RELAY)).await.unwrap();

    assert_eq!(balance, 21_000);
    assert_eq!(*wallet.requests.lock().unwrap(), vec![Request::get_balance()]);
}

#[tokio::test]
async fn test_wallet_error_is_typed() {
    init_tracing();
    let wallet = Arc::new(StubWallet::new(|_| {
        Some(json!({
            "result_type": "pay_invoice",
            "error": {"code": "INSUFFICIENT_BALANCE", "message": "balance too low"}
        }))
    }));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let client = NwcClient::with_config(relay, quick());

    let err = client
        .pay_invoice(&wallet.connection(RELAY), "lnbc1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ZapError::Wallet { code: ErrorCode::InsufficientBalance, ref message }
            if message == "balance too low"
    ));
}

#[tokio::test]
async fn test_wallet_error_without_result_type_is_typed() {
    init_tracing();
    let wallet = Arc::new(StubWallet::new(|_| {
        Some(json!({
            "result_type": "",
            "error": {"code": "QUOTA_EXCEEDED", "message": "daily budget spent"}
        }))
    }));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let client = NwcClient::with_config(relay, quick());

    let err = client
        .pay_invoice(&wallet.connection(RELAY), "lnbc1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ZapError::Wallet { code: ErrorCode::QuotaExceeded, ref message }
            if message == "daily budget spent"
    ));
}

#[tokio::test]
async fn test_error_for_another_method_still_surfaces() {
    init_tracing();
    let wallet = Arc::new(StubWallet::new(|_| {
        Some(json!({
            "result_type": "get_balance",
            "error": {"code": "RESTRICTED", "message": "pay_invoice not permitted"}
        }))
    }));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let client = NwcClient::with_config(relay, quick());

    let err = client
        .pay_invoice(&wallet.connection(RELAY), "lnbc1")
        .await
        .unwrap_err();

    assert!(matches!(err, ZapError::Wallet { code: ErrorCode::Restricted, .. }));
}

#[tokio::test]
async fn test_unparsable_response_is_malformed() {
    init_tracing();
    let wallet = Arc::new(StubWallet::new(|_| Some(json!(["not", "a", "response"]))));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let client = NwcClient::with_config(relay, quick());

    let result = client.get_balance(&wallet.connection(RELAY)).await;
    assert!(matches!(result, Err(ZapError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_concurrent_requests_correlate_by_event_id() {
    init_tracing();
    let wallet = Arc::new(StubWallet::new(|request| match request {
        Request::LookupInvoice(LookupInvoiceParams::Invoice { invoice }) => Some(json!({
            "result_type": "lookup_invoice",
            "result": {
                "invoice": invoice,
                "payment_hash": format!("hash-{}", invoice),
                "amount": 1000
            }
        })),
        _ => None,
    }));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let client = NwcClient::with_config(relay, quick());
    let connection = wallet.connection(RELAY);

    let (a, b) = tokio::join!(
        client.lookup_invoice(&connection, "lnbc-a"),
        client.lookup_invoice(&connection, "lnbc-b"),
    );

    assert_eq!(a.unwrap().payment_hash, "hash-lnbc-a");
    assert_eq!(b.unwrap().payment_hash, "hash-lnbc-b");
}

#[tokio::test(start_paused = true)]
async fn test_silent_wallet_times_out() {
    init_tracing();
    let wallet = Arc::new(StubWallet::new(|_| None));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let client = NwcClient::new(relay);

    let result = client.get_balance(&wallet.connection(RELAY)).await;

    assert!(matches!(result, Err(ZapError::Timeout(_))));
    assert_eq!(wallet.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_until_wallet_reports_settled() {
    init_tracing();
    let lookups = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&lookups);
    let wallet = Arc::new(StubWallet::new(move |request| {
        let Request::LookupInvoice(_) = request else {
            return None;
        };
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let settled_at = if n >= 4 { json!(1_700_000_000) } else { json!(null) };
        Some(json!({
            "result_type": "lookup_invoice",
            "result": {"payment_hash": "hash", "amount": 21_000, "settled_at": settled_at}
        }))
    }));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let poller = SettlementPoller::with_sleeper(
        NwcClient::with_config(relay, quick()),
        zaps::TokioSleeper,
        PollConfig::default(),
    );

    let started = tokio::time::Instant::now();
    let tx = poller
        .await_settlement(&wallet.connection(RELAY), "lnbc1", &CancellationToken::new())
        .await
        .unwrap();

    assert!(tx.is_settled());
    assert_eq!(lookups.load(Ordering::SeqCst), 4);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
}

#[tokio::test(start_paused = true)]
async fn test_silent_wallet_exhausts_poll_attempts() {
    init_tracing();
    let wallet = Arc::new(StubWallet::new(|_| None));
    let relay = Arc::new(StubRelay::with_wallet(Arc::clone(&wallet)));
    let poller = SettlementPoller::with_sleeper(
        NwcClient::with_config(relay, quick()),
        zaps::TokioSleeper,
        PollConfig {
            interval: Duration::from_secs(5),
            max_attempts: 3,
        },
    );

    let result = poller
        .await_settlement(&wallet.connection(RELAY), "lnbc1", &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ZapError::MaxAttemptsExceeded { attempts: 3 })));
    assert_eq!(wallet.request_count(), 3);
}
