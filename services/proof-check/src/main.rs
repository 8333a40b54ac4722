mod config;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use stateproof::{KeyOutcomes, ProofBundle, ProofVerifier, RootTreeShape, VerificationOutcome};
use tracing::info;

use crate::config::AppConfig;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum KeyReport {
    Present { value: String },
    Absent,
    Invalid { reason: String },
}

impl From<&VerificationOutcome> for KeyReport {
    fn from(outcome: &VerificationOutcome) -> Self {
        match outcome {
            VerificationOutcome::Present(value) => KeyReport::Present {
                value: hex::encode(value),
            },
            VerificationOutcome::Absent => KeyReport::Absent,
            VerificationOutcome::Invalid(reason) => KeyReport::Invalid {
                reason: reason.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    collection: String,
    app_hash: String,
    keys: BTreeMap<String, KeyReport>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let raw = std::fs::read_to_string(&cfg.bundle_path)
        .with_context(|| format!("Failed to read {}", cfg.bundle_path.display()))?;
    let bundle: ProofBundle =
        serde_json::from_str(&raw).context("Failed to parse proof bundle")?;
    info!(
        path = %cfg.bundle_path.display(),
        collections = bundle.store_tree_proofs.len(),
        "proof-check: bundle loaded"
    );

    let hasher = cfg.hash_backend.init();
    let verifier = ProofVerifier::new(hasher, RootTreeShape::platform());
    let outcomes = verifier
        .verify(
            &bundle,
            cfg.collection,
            &cfg.keys,
            cfg.trusted_app_hash,
        )
        .with_context(|| format!("Proof for {} did not verify", cfg.collection))?;

    let report = report(&cfg, &outcomes);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn report(cfg: &AppConfig, outcomes: &KeyOutcomes) -> Report {
    Report {
        collection: cfg.collection.to_string(),
        app_hash: hex::encode(cfg.trusted_app_hash),
        keys: outcomes
            .iter()
            .map(|(key, outcome)| (hex::encode(key), KeyReport::from(outcome)))
            .collect(),
    }
}
