#![warn(unused_extern_crates)]
use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};
use anyhow::{Context, Result};
use dotenv::dotenv;
use std::{sync::Arc, time::Duration};
use submitter::{
    chain::MolochInvoker,
    config,
    effects::{DEFAULT_INITIAL_BACKOFF, EffectExecutor, ForumClient, LogNotifier, ProviderOverview},
    forms::FormRegistry,
    polls::{FilePollStore, PollTracker},
    resolver::EnsResolver,
    server::{AppState, router},
    submission::{SubmissionContext, SubmissionFlow},
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use utils::{
    errors::{
        ETHEREUM_NODE_URL_NOT_SET, POLL_CACHE_READ_FAILED, PROVIDER_CONNECTION_FAILED,
        SERVER_BIND_FAILED, SIGNER_PARSE_FAILED, SUBMITTER_PRIVATE_KEY_NOT_SET,
    },
    tracing::run_with_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    run_with_tracing(run).await
}

async fn run() -> Result<()> {
    config::load()?;
    let config = config::get_config()?;

    info!("Submitter starting up");

    let node_url = config
        .chain
        .node_url
        .as_deref()
        .context(ETHEREUM_NODE_URL_NOT_SET)?;
    let signer: PrivateKeySigner = config
        .chain
        .private_key
        .as_deref()
        .context(SUBMITTER_PRIVATE_KEY_NOT_SET)?
        .parse()
        .context(SIGNER_PARSE_FAILED)?;
    let dao_address = config.dao.address()?;
    let account = signer.address();

    let rpc_url: reqwest::Url = node_url.parse().context(PROVIDER_CONNECTION_FAILED)?;
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(rpc_url)
        .erased();

    let chain_id = provider
        .get_chain_id()
        .await
        .context(PROVIDER_CONNECTION_FAILED)?;
    if chain_id != config.dao.chain_id {
        warn!(
            provider_chain_id = chain_id,
            configured_chain_id = config.dao.chain_id,
            "Provider chain does not match the configured DAO chain"
        );
    }
    info!(%account, %dao_address, chain_id, "Connected to chain");

    let deposit_token = config.dao.deposit_token.unwrap_or_else(|| {
        warn!("dao.deposit_token not configured, empty token fields fall back to the zero address");
        Address::ZERO
    });

    let store = Arc::new(FilePollStore::new(&config.polls.cache_path));
    let tracker = Arc::new(PollTracker::new(store));
    let pending = tracker.rehydrate().await.context(POLL_CACHE_READ_FAILED)?;
    info!(pending = pending.len(), "Pending polls rehydrated");

    let registry = Arc::new(FormRegistry::with_default_catalog()?);
    let invoker = Arc::new(MolochInvoker::new(
        provider.clone(),
        config.chain.confirmation_timeout(),
        config.chain.poll_interval(),
    ));

    let (effects_tx, effects_rx) = mpsc::unbounded_channel();
    let flow = Arc::new(SubmissionFlow::new(
        registry.clone(),
        tracker.clone(),
        invoker,
        SubmissionContext {
            dao_address,
            chain_id: config.dao.chain_id,
            account,
            deposit_token,
            token_decimals: config.token_decimals,
            create_threads: config.forum.endpoint.is_some(),
        },
        effects_tx,
    ));

    for poll in pending {
        let flow = flow.clone();
        tokio::spawn(async move {
            if let Some(receipt) = flow.resume(poll).await {
                info!(
                    poll_id = %receipt.poll_id,
                    outcome = ?receipt.outcome,
                    "Rehydrated poll settled"
                );
            }
        });
    }

    let forum = config.forum.endpoint.clone().map(|endpoint| {
        ForumClient::new_with_config(endpoint, config.forum.max_retries, DEFAULT_INITIAL_BACKOFF)
    });
    let executor = Arc::new(EffectExecutor::new(
        Arc::new(LogNotifier),
        Arc::new(ProviderOverview::new(provider.clone(), dao_address)),
        forum,
    ));
    let effects_handle = tokio::spawn(executor.run(effects_rx));

    let sweep_tracker = tracker.clone();
    let max_age_secs = config.polls.max_age_secs;
    let sweep_interval = Duration::from_secs(config.polls.sweep_interval_secs);
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            match sweep_tracker
                .sweep_stale(max_age_secs, chrono::Utc::now().timestamp())
                .await
            {
                Ok(abandoned) if !abandoned.is_empty() => {
                    info!(abandoned = abandoned.len(), "Stale polls swept");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Stale poll sweep failed"),
            }
        }
    });

    let state = AppState {
        registry,
        flow,
        tracker,
        names: Arc::new(EnsResolver::new(provider.clone())),
    };
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .context(SERVER_BIND_FAILED)?;
    let addr = listener.local_addr().context(SERVER_BIND_FAILED)?;

    let server_handle = tokio::spawn(async move {
        info!(address = %addr, "Starting HTTP server");
        if let Err(e) = axum::serve(listener, router(state)).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("All tasks started, submitter running");

    tokio::select! {
        result = server_handle => {
            error!("HTTP server task completed unexpectedly: {:?}", result);
        }
        result = sweep_handle => {
            error!("Sweep task completed unexpectedly: {:?}", result);
        }
        result = effects_handle => {
            error!("Effect executor completed unexpectedly: {:?}", result);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully");
        }
    }

    Ok(())
}
