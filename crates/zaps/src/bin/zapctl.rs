//! zapctl: wallet, zap and comment commands.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use nostr::{MakeInvoiceParams, parse_secret_key_hex};
use nostr_client::RelayPool;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zaps::{
    CommentFeed, LnurlInvoiceIssuer, NwcClient, NwcConfig, NwcConnection, ParentContent,
    ParentKind, PollConfig, SettlementPoller, Signer, ZapFlow, ZapRequestBuilder,
    ZapRequestParams, ZapsConfig, default_config_path, load_config,
};

#[derive(Parser)]
#[command(name = "zapctl", version, about = "Zaps, wallet connect and comment feeds")]
struct Cli {
    /// Config file (default: ~/.config/zaps/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the wallet balance
    Balance,
    /// Create an invoice with the wallet
    Invoice {
        /// Amount in sats
        sats: u64,
        #[arg(long)]
        memo: Option<String>,
        /// Seconds until expiry
        #[arg(long)]
        expiry: Option<u64>,
    },
    /// Pay a BOLT-11 invoice with the wallet
    Pay { invoice: String },
    /// Look an invoice up
    Lookup {
        invoice: String,
        /// Poll until settled (Ctrl-C cancels)
        #[arg(long)]
        wait: bool,
    },
    /// Show the comment feed for podcast items
    Comments {
        #[arg(required = true)]
        content_ids: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print a signed zap request
    ZapRequest {
        #[command(flatten)]
        zap: ZapArgs,
    },
    /// Zap content: request an invoice, pay it and wait for settlement
    Zap {
        #[command(flatten)]
        zap: ZapArgs,
    },
}

#[derive(clap::Args)]
struct ZapArgs {
    content_id: String,
    /// Album or podcast id the item belongs to
    #[arg(long)]
    parent: String,
    #[arg(long, value_parser = parse_parent_kind, default_value = "album")]
    parent_kind: ParentKind,
    #[arg(long)]
    sats: u64,
    #[arg(long)]
    comment: Option<String>,
    /// Extra relay for the receipt (repeatable)
    #[arg(long = "relay")]
    relays: Vec<String>,
    /// File holding a hex secret key; anonymous when omitted
    #[arg(long)]
    identity: Option<PathBuf>,
}

fn parse_parent_kind(s: &str) -> std::result::Result<ParentKind, String> {
    s.parse().map_err(|e: zaps::ZapError| e.to_string())
}

impl ZapArgs {
    fn params(&self) -> ZapRequestParams {
        let mut params = ZapRequestParams::new(
            self.content_id.clone(),
            ParentContent {
                id: self.parent.clone(),
                kind: self.parent_kind,
            },
            self.sats,
        );
        params.comment = self.comment.clone();
        params.extra_relays = self.relays.clone();
        params
    }

    fn signer(&self) -> Result<Signer> {
        let Some(path) = &self.identity else {
            return Ok(Signer::Anonymous);
        };
        let secret = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read identity {}", path.display()))?;
        let key = parse_secret_key_hex(secret.trim())
            .context("identity file must hold a hex secret key")?;
        Ok(Signer::Identity(key))
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "zaps=debug,nostr_client=debug"
    } else {
        "zaps=info,nostr_client=warn"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn wallet(config: &ZapsConfig) -> Result<NwcConnection> {
    let Some(uri) = config.nwc_uri.as_deref() else {
        bail!("no wallet paired: set nwcUri in the config or ZAPS_NWC_URI");
    };
    Ok(NwcConnection::from_uri(uri)?)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
    token
}

async fn run(
    command: Command,
    config: &ZapsConfig,
    pool: Arc<RelayPool>,
    json: bool,
) -> Result<()> {
    let nwc = NwcClient::with_config(Arc::clone(&pool), NwcConfig::from(config));

    match command {
        Command::Balance => {
            let msats = nwc.get_balance(&wallet(config)?).await?;
            print(json, &serde_json::json!({ "balance": msats }), || {
                format!("{} sats", msats / 1000)
            })
        }
        Command::Invoice { sats, memo, expiry } => {
            let params = MakeInvoiceParams {
                amount: sats.checked_mul(1000).context("amount too large")?,
                description: memo,
                description_hash: None,
                expiry,
            };
            let tx = nwc.make_invoice(&wallet(config)?, params).await?;
            print(json, &tx, || tx.invoice.clone().unwrap_or_default())
        }
        Command::Pay { invoice } => {
            let paid = nwc.pay_invoice(&wallet(config)?, &invoice).await?;
            print(json, &paid, || format!("paid, preimage {}", paid.preimage))
        }
        Command::Lookup { invoice, wait } => {
            let connection = wallet(config)?;
            let tx = if wait {
                let poller = SettlementPoller::with_sleeper(
                    nwc,
                    zaps::TokioSleeper,
                    PollConfig::from(config),
                );
                poller
                    .await_settlement(&connection, &invoice, &cancel_on_ctrl_c())
                    .await?
            } else {
                nwc.lookup_invoice(&connection, &invoice).await?
            };
            print(json, &tx, || {
                if tx.is_settled() {
                    format!("settled ({} sats)", tx.amount / 1000)
                } else {
                    format!("unpaid ({} sats)", tx.amount / 1000)
                }
            })
        }
        Command::Comments { content_ids, limit } => {
            let feed = CommentFeed::from_config(pool, config)?;
            let limit = limit.unwrap_or(config.comment_limit as usize);
            let comments = feed.fetch(&content_ids, limit).await?;
            print(json, &comments, || {
                comments
                    .iter()
                    .map(|c| {
                        let author: String = c.pubkey.chars().take(8).collect();
                        match c.amount_msats {
                            Some(msats) => format!(
                                "{} {} ⚡{}: {}",
                                c.created_at,
                                author,
                                msats / 1000,
                                c.content
                            ),
                            None => format!("{} {}: {}", c.created_at, author, c.content),
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::ZapRequest { zap } => {
            let builder = ZapRequestBuilder::from_config(config)?;
            let event = builder.build(&zap.params(), &zap.signer()?)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(())
        }
        Command::Zap { zap } => {
            let Some(callback) = config.lnurl_callback.as_deref() else {
                bail!("lnurlCallback is not set");
            };
            let flow = ZapFlow::new(
                ZapRequestBuilder::from_config(config)?,
                LnurlInvoiceIssuer::new(callback)?,
                nwc,
                PollConfig::from(config),
            );
            let outcome = flow
                .zap(&zap.params(), &zap.signer()?, &wallet(config)?, &cancel_on_ctrl_c())
                .await?;
            print(
                json,
                &serde_json::json!({
                    "zapRequest": outcome.zap_request,
                    "invoice": outcome.invoice.pr,
                    "preimage": outcome.payment.preimage,
                    "settledAt": outcome.settlement.settled_at,
                }),
                || format!("zapped {} sats, preimage {}", zap.sats, outcome.payment.preimage),
            )
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = load_config(&path)
        .with_context(|| format!("failed to load {}", path.display()))?
        .from_env_overrides()?;

    let pool = Arc::new(RelayPool::new());
    let result = run(cli.command, &config, Arc::clone(&pool), cli.json).await;
    pool.disconnect_all().await;
    result
}
