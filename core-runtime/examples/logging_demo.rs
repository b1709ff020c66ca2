//! Logging system demonstration
//!
//! This example shows how to use the logging infrastructure in different modes.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # Compact format
//! cargo run --example logging_demo -- compact
//!
//! # With custom filter
//! cargo run --example logging_demo -- pretty "core_runtime=trace"
//! ```

use core_runtime::logging::{
    init_logging, redact_if_sensitive, LogFormat, LogLevel, LoggingConfig,
};
use std::env;
use tracing::{debug, error, info, instrument, span, trace, warn, Level};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = if args.len() > 1 {
        match args[1].as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Pretty,
        }
    } else {
        LogFormat::default()
    };

    let filter = args.get(2).cloned();

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_pii_redaction(true)
        .with_spans(true)
        .with_target(true);

    if let Some(f) = filter {
        config = config.with_filter(f);
    }

    init_logging(config).expect("Failed to initialize logging");

    info!("=== Logging System Demo ===");
    info!(format = ?format, "Logging initialized");

    demo_log_levels();
    demo_structured_logging();
    demo_spans().await;
    demo_pii_redaction();
    demo_instrumentation().await;

    info!("=== Demo Complete ===");
}

fn demo_log_levels() {
    let span = span!(Level::INFO, "log_levels");
    let _enter = span.enter();

    trace!("This is a TRACE level log");
    debug!("This is a DEBUG level log");
    info!("This is an INFO level log");
    warn!("This is a WARN level log");
    error!("This is an ERROR level log");
}

fn demo_structured_logging() {
    let span = span!(Level::INFO, "structured_logging");
    let _enter = span.enter();

    info!("Simple message without fields");

    info!(
        account_id = "acct-12345",
        provider = "google",
        expires_in_secs = 3600,
        "Token information"
    );

    info!(
        active_accounts = 2,
        pending_refreshes = 1,
        "Coordinator state"
    );
}

async fn demo_spans() {
    let span = span!(Level::INFO, "token_refresh", provider = "google");
    let _enter = span.enter();

    info!("Starting token refresh");

    {
        let inner_span = span!(Level::DEBUG, "load_record");
        let _inner = inner_span.enter();

        debug!(account_id = "acct-12345", "Loaded stored token record");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    {
        let inner_span = span!(Level::DEBUG, "exchange_refresh_handle");
        let _inner = inner_span.enter();

        debug!(attempt = 1, "Exchanging refresh handle with provider");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    info!(expires_in_secs = 3600, "Token refresh completed");
}

fn demo_pii_redaction() {
    let span = span!(Level::INFO, "pii_redaction");
    let _enter = span.enter();

    // These values will be automatically redacted by our helper
    let token = "secret_access_token_12345";
    let email = "user@example.com";

    info!(
        token = %redact_if_sensitive("access_token", token),
        email = %redact_if_sensitive("email", email),
        "Sensitive data example"
    );

    // Best practice: Don't log sensitive values at all
    info!("Authentication successful for account");
    // Instead of: info!(token = access_token, "Auth successful")
}

#[instrument]
async fn demo_instrumentation() {
    info!("Instrumented function automatically creates spans");

    let accounts = vec!["acct-1", "acct-2", "acct-3"];
    refresh_accounts(&accounts).await;
}

#[instrument(fields(count = accounts.len()))]
async fn refresh_accounts(accounts: &[&str]) {
    debug!("Refreshing accounts");

    for (idx, account) in accounts.iter().enumerate() {
        refresh_account(idx, account).await;
    }

    info!("All accounts refreshed");
}

#[instrument(fields(account_index = idx))]
async fn refresh_account(idx: usize, account: &str) {
    trace!(account_id = %account, "Refreshing individual account");
    tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
}
