//! Command handlers. Each opens only what it needs: the store, the carrier
//! registry, or both.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};
use trackdb_carriers::{registry::normalize_id, CarrierRegistry};
use trackdb_core::{AppConfig, DateRangeError, TrackOptions};
use trackdb_db::TrackingStore;
use trackdb_server::report::{
    build_report, render_csv, render_json, validate_report_request, ReportFormat,
};
use trackdb_server::scheduler::{ReconcileSettings, Reconciler};
use trackdb_server::tracking::{lookup, track_and_store, CarrierFailure, TrackError};

use crate::{LookupOptions, OutputFormat, Target};

pub(crate) fn track_options(options: &LookupOptions) -> anyhow::Result<TrackOptions> {
    let converted = TrackOptions {
        date_from: options.date_from,
        date_to: options.date_to,
        proof_of_delivery: options.proof_of_delivery,
        include_detailed_view: options.include_detailed_view,
    };
    converted.check_date_range().map_err(|e| match e {
        DateRangeError::MissingTo => anyhow::anyhow!("--date-from requires --date-to"),
        DateRangeError::MissingFrom => anyhow::anyhow!("--date-to requires --date-from"),
        DateRangeError::Inverted => anyhow::anyhow!("--date-from is after --date-to"),
    })?;
    Ok(converted)
}

/// Parses one `--ids` value of the form `carrier:id1,id2`.
pub(crate) fn parse_carrier_ids(raw: &str) -> anyhow::Result<(String, Vec<String>)> {
    let (carrier, ids) = raw
        .split_once(':')
        .with_context(|| format!("expected carrier:id1,id2 but got '{raw}'"))?;
    let ids = ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    Ok((carrier.trim().to_string(), ids))
}

/// Builds the same request body the HTTP report endpoint accepts.
pub(crate) fn report_body(format: OutputFormat, ids: &[String]) -> anyhow::Result<Value> {
    let entries = ids
        .iter()
        .map(|raw| {
            parse_carrier_ids(raw).map(|(carrier, ids)| json!({ "carrier": carrier, "ids": ids }))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(json!({ "format": format.as_str(), "ids_by_carrier": entries }))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn carrier_failure(failure: &CarrierFailure) -> anyhow::Error {
    let response = &failure.response;
    if response.errors.is_empty() {
        anyhow::anyhow!("{}", response.description)
    } else {
        anyhow::anyhow!("{}: {}", response.description, response.errors.join("; "))
    }
}

fn track_error(err: TrackError) -> anyhow::Error {
    match err {
        TrackError::Invalid(e) => anyhow::Error::new(e),
        TrackError::Carrier(failure) => carrier_failure(&failure),
        TrackError::Store(e) => anyhow::Error::new(e).context("failed to store tracking result"),
    }
}

/// Trimmed tracking number; blank input is refused before anything is opened.
pub(crate) fn tracking_number(target: &Target) -> anyhow::Result<&str> {
    let trimmed = target.tracking_number.trim();
    anyhow::ensure!(!trimmed.is_empty(), "tracking number must not be empty");
    Ok(trimmed)
}

fn registry(config: &AppConfig) -> anyhow::Result<CarrierRegistry> {
    CarrierRegistry::from_app_config(config).context("failed to configure carriers")
}

async fn store(config: &AppConfig) -> anyhow::Result<Arc<dyn TrackingStore>> {
    trackdb_db::open_store(config)
        .await
        .context("failed to open tracking store")
}

/// Apply pending migrations to the configured Postgres database.
///
/// # Errors
///
/// Returns an error if no database is configured or a migration fails.
pub(crate) async fn run_migrate(config: &AppConfig) -> anyhow::Result<()> {
    let pool = trackdb_db::connect_pool_from_config(config).await?;
    let applied = trackdb_db::run_migrations(&pool).await?;
    println!("applied {applied} migration(s)");
    Ok(())
}

pub(crate) async fn run_query(
    config: &AppConfig,
    target: &Target,
    options: &LookupOptions,
) -> anyhow::Result<()> {
    let tracking_number = tracking_number(target)?;
    let options = track_options(options)?;
    let adapter = registry(config)?.resolve(&target.carrier)?;
    let response = lookup(adapter.as_ref(), tracking_number, options)
        .await
        .map_err(track_error)?;
    print_json(&response)
}

pub(crate) async fn run_track(
    config: &AppConfig,
    target: &Target,
    options: &LookupOptions,
) -> anyhow::Result<()> {
    let tracking_number = tracking_number(target)?;
    let options = track_options(options)?;
    let adapter = registry(config)?.resolve(&target.carrier)?;
    let store = store(config).await?;

    let record = track_and_store(
        store.as_ref(),
        adapter.as_ref(),
        &normalize_id(&target.carrier),
        tracking_number,
        options,
    )
    .await
    .map_err(track_error)?;
    print_json(&record)
}

pub(crate) async fn run_status(config: &AppConfig, target: &Target) -> anyhow::Result<()> {
    let carrier = normalize_id(&target.carrier);
    let tracking_number = target.tracking_number.trim();
    let record = store(config)
        .await?
        .get(tracking_number, &carrier)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no tracked record for {carrier} {tracking_number}"))?;
    print_json(&record)
}

pub(crate) async fn run_untrack(config: &AppConfig, target: &Target) -> anyhow::Result<()> {
    let carrier = normalize_id(&target.carrier);
    let tracking_number = target.tracking_number.trim();
    if store(config).await?.delete(tracking_number, &carrier).await? {
        println!("stopped tracking {carrier} {tracking_number}");
    } else {
        println!("no tracked record for {carrier} {tracking_number}");
    }
    Ok(())
}

pub(crate) async fn run_stats(config: &AppConfig) -> anyhow::Result<()> {
    let stats = store(config).await?.statistics().await?;

    println!("{:<12}{:>8}", "CARRIER", "RECORDS");
    for (carrier, count) in &stats.by_carrier {
        println!("{carrier:<12}{count:>8}");
    }
    println!();
    println!(
        "total {}  active {}  inactive {}",
        stats.total, stats.active, stats.inactive
    );
    Ok(())
}

pub(crate) fn run_carriers(config: &AppConfig) -> anyhow::Result<()> {
    let supported = registry(config)?.list_supported();
    if supported.is_empty() {
        println!("no carriers configured; set PUROLATOR_* or UPS_* credentials");
    }
    for carrier in supported {
        println!("{carrier}");
    }
    Ok(())
}

pub(crate) async fn run_reconcile(config: &AppConfig) -> anyhow::Result<()> {
    let reconciler = Reconciler::new(
        store(config).await?,
        Arc::new(registry(config)?),
        ReconcileSettings::from_app_config(config),
    );
    match reconciler.run_pass().await {
        Some(summary) => print_json(&summary),
        None => anyhow::bail!("a reconciliation pass is already running"),
    }
}

pub(crate) async fn run_report(
    config: &AppConfig,
    format: OutputFormat,
    ids: &[String],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let body = report_body(format, ids)?;
    let request = validate_report_request(&body).map_err(|fields| {
        let details: Vec<String> = fields
            .iter()
            .map(|f| format!("{} {}", f.field, f.message))
            .collect();
        anyhow::anyhow!("invalid report request: {}", details.join("; "))
    })?;

    let rows = build_report(store(config).await?.as_ref(), &request).await?;
    let rendered = match request.format {
        ReportFormat::Json => render_json(&rows)?,
        ReportFormat::Csv => render_csv(&rows),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            tracing::info!(rows = rows.len(), path = %path.display(), "report written");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
