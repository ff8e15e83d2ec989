use crate::errors::WalletServiceError;
use crate::models::{OperationKind, OperationResult, Wallet};
use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

lazy_static! {
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_metrics(&registry).expect("metrics can be registered");
        registry
    };

    // Business metrics
    pub static ref WALLET_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("wallet_operations_total", "Wallet operations by type and outcome"),
        &["operation", "status"]
    ).expect("metric can be created");

    pub static ref WALLET_OPERATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "wallet_operation_duration_seconds",
            "Time spent inside the wallet operation transaction"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["operation"]
    ).expect("metric can be created");

    pub static ref BALANCE_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("wallet_balance_queries_total", "Balance lookups by outcome"),
        &["status"]
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(WALLET_OPERATIONS_TOTAL.clone()))?;
    registry.register(Box::new(WALLET_OPERATION_DURATION.clone()))?;
    registry.register(Box::new(BALANCE_QUERIES_TOTAL.clone()))?;
    Ok(())
}

pub fn record_operation(
    kind: OperationKind,
    outcome: &Result<OperationResult, WalletServiceError>,
    elapsed: Duration,
) {
    let status = match outcome {
        Ok(result) => result.status.as_str(),
        Err(WalletServiceError::InsufficientFunds(result)) => result.status.as_str(),
        Err(e) => e.metric_label(),
    };

    WALLET_OPERATIONS_TOTAL
        .with_label_values(&[kind.as_str(), status])
        .inc();
    WALLET_OPERATION_DURATION
        .with_label_values(&[kind.as_str()])
        .observe(elapsed.as_secs_f64());
}

/// Count a request rejected before reaching the store.
pub fn record_rejection(operation_type: &str, reason: &str) {
    let operation = operation_type
        .parse::<OperationKind>()
        .map(|kind| kind.as_str())
        .unwrap_or("UNKNOWN");

    WALLET_OPERATIONS_TOTAL
        .with_label_values(&[operation, reason])
        .inc();
}

pub fn record_balance_query(outcome: &Result<Wallet, WalletServiceError>) {
    let status = match outcome {
        Ok(_) => "found",
        Err(e) => e.metric_label(),
    };
    BALANCE_QUERIES_TOTAL.with_label_values(&[status]).inc();
}

/// Render the registry in the Prometheus text format
pub fn metrics_handler() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
