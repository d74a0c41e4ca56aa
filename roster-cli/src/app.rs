//! Wiring from configuration to a ready engine

use anyhow::{Context, Result};
use roster_core::{
    BambooHrClient, BambooHrConfig, HttpClientBuilder, HttpSettings, MoodleClient, MoodleConfig,
};
use roster_sync::{
    DynamoStateStore, EngineOptions, FileStateStore, ReconciliationEngine, RunSummary, StateStore,
};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::secrets::{SecretLoader, SecretRef, BAMBOO_KEY_ALIASES, MOODLE_TOKEN_ALIASES};

/// Load the shared AWS configuration when some component needs it.
pub async fn aws_config_if(needed: bool) -> Option<aws_config::SdkConfig> {
    if needed {
        Some(aws_config::from_env().load().await)
    } else {
        None
    }
}

/// The file store when a state file is configured, DynamoDB otherwise.
pub async fn state_store(
    config: &AppConfig,
    sdk_config: Option<&aws_config::SdkConfig>,
) -> Arc<dyn StateStore> {
    let lookback_days = config.sync.initial_lookback_days;

    if let Some(path) = &config.state.file {
        return Arc::new(FileStateStore::new(
            path.clone(),
            config.state.state_id.clone(),
            lookback_days,
        ));
    }

    let client = match sdk_config {
        Some(sdk_config) => aws_sdk_dynamodb::Client::new(sdk_config),
        None => aws_sdk_dynamodb::Client::new(&aws_config::from_env().load().await),
    };
    Arc::new(DynamoStateStore::new(
        client,
        config.state.dynamodb_table.clone(),
        config.state.state_id.clone(),
        lookback_days,
    ))
}

/// Resolve credentials, build the adapters and the cursor store.
pub async fn build_engine(config: &AppConfig) -> Result<ReconciliationEngine> {
    let bamboo_ref = SecretRef::parse(&config.bamboohr.secret).context("BambooHR secret")?;
    let moodle_ref = SecretRef::parse(&config.moodle.secret).context("Moodle secret")?;

    let needs_aws = config.state.file.is_none()
        || bamboo_ref.is_secrets_manager()
        || moodle_ref.is_secrets_manager();
    let sdk_config = aws_config_if(needs_aws).await;

    let secrets = SecretLoader::for_refs(&[&bamboo_ref, &moodle_ref], sdk_config.as_ref()).await;
    let api_key = secrets
        .credential(&bamboo_ref, BAMBOO_KEY_ALIASES)
        .await
        .context("Missing BambooHR API key")?;
    let token = secrets
        .credential(&moodle_ref, MOODLE_TOKEN_ALIASES)
        .await
        .context("Missing Moodle token")?;

    let settings = HttpSettings {
        timeout: config.http.timeout,
        retry_max_elapsed: config.http.retry_max_elapsed,
        ..HttpSettings::default()
    };
    let http = HttpClientBuilder::from_settings(&settings).build()?;

    let bamboo = Arc::new(BambooHrClient::new(
        http.clone(),
        BambooHrConfig {
            company_domain: config.bamboohr.company_domain.clone(),
            api_key,
            retry_max_elapsed: settings.retry_max_elapsed,
        },
    )?);
    let moodle = Arc::new(MoodleClient::new(
        http,
        MoodleConfig {
            base_url: config.moodle.base_url.clone(),
            token,
            auth_method: config.moodle.auth_method.clone(),
            default_institution: config.moodle.default_institution.clone(),
        },
    )?);
    let state = state_store(config, sdk_config.as_ref()).await;

    info!(
        company = %config.bamboohr.company_domain,
        moodle = %moodle.endpoint(),
        state = %state.describe(),
        "Components initialized"
    );

    Ok(ReconciliationEngine::new(
        bamboo.clone(),
        bamboo,
        moodle,
        state,
        EngineOptions {
            batch_size: config.sync.batch_size,
            dry_run: config.sync.dry_run,
        },
    ))
}

/// One reconciliation run. Errors are fatal: no summary is produced.
pub async fn run_once(config: &AppConfig) -> Result<RunSummary> {
    let engine = build_engine(config).await?;
    let summary = engine.run().await.context("Failed to read sync cursor")?;
    Ok(summary)
}
