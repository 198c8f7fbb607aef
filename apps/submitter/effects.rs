use crate::submission::{Effect, ForumTopic, Notification, NotificationLevel};
use alloy::{primitives::Address, providers::Provider};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::sleep,
};
use tracing::{debug, error, info, instrument, warn};
use utils::errors::FORUM_TOPIC_FAILED;

const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Surfaces notifications on the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        match notification.level {
            NotificationLevel::Success => info!(
                title = %notification.title,
                description = ?notification.description,
                "Notification"
            ),
            NotificationLevel::Error => error!(
                title = %notification.title,
                description = ?notification.description,
                "Notification"
            ),
        }
    }
}

#[async_trait]
pub trait OverviewRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaoOverview {
    pub dao_address: Address,
    pub block_number: u64,
    pub refreshed_at: i64,
}

/// Keeps the latest organization overview for subscribers.
pub struct ProviderOverview<P> {
    provider: P,
    dao_address: Address,
    state: watch::Sender<Option<DaoOverview>>,
}

impl<P> ProviderOverview<P> {
    pub fn new(provider: P, dao_address: Address) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            provider,
            dao_address,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DaoOverview>> {
        self.state.subscribe()
    }

    pub fn latest(&self) -> Option<DaoOverview> {
        self.state.borrow().clone()
    }
}

#[async_trait]
impl<P> OverviewRefresher for ProviderOverview<P>
where
    P: Provider + Send + Sync,
{
    async fn refresh(&self) -> Result<()> {
        let block_number = self
            .provider
            .get_block_number()
            .await
            .context("Failed to fetch block number")?;

        self.state.send_replace(Some(DaoOverview {
            dao_address: self.dao_address,
            block_number,
            refreshed_at: chrono::Utc::now().timestamp(),
        }));
        debug!(block_number, "Overview refreshed");
        Ok(())
    }
}

/// Posts discussion threads for new proposals.
#[derive(Debug, Clone)]
pub struct ForumClient {
    client: Client,
    endpoint: String,
    max_retries: usize,
    initial_backoff: Duration,
}

impl ForumClient {
    pub fn new(endpoint: String) -> Self {
        Self::new_with_config(endpoint, DEFAULT_MAX_RETRIES, DEFAULT_INITIAL_BACKOFF)
    }

    pub fn new_with_config(endpoint: String, max_retries: usize, initial_backoff: Duration) -> Self {
        let client = Client::builder()
            .default_headers(Self::default_headers())
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            max_retries,
            initial_backoff,
        }
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("submitter/0.1"));
        headers
    }

    #[instrument(skip(self, topic), fields(title = %topic.title))]
    pub async fn create_thread(&self, topic: &ForumTopic) -> Result<()> {
        let mut attempt = 0;
        let mut delay = self.initial_backoff;

        loop {
            match self.client.post(&self.endpoint).json(topic).send().await {
                Ok(response) if response.status().is_success() => {
                    info!("Forum thread created");
                    return Ok(());
                }
                Ok(response)
                    if response.status() == StatusCode::TOO_MANY_REQUESTS
                        || response.status().is_server_error() =>
                {
                    attempt += 1;
                    let status = response.status();
                    if attempt > self.max_retries {
                        error!(status = %status, "Max retries reached");
                        return Err(anyhow!("{FORUM_TOPIC_FAILED}: HTTP {status}"));
                    }
                    warn!(status = %status, delay = ?delay, "Forum unavailable. Retrying...");
                    sleep(delay).await;
                    delay *= 2;
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    error!(status = %status, body = body, "Forum rejected thread");
                    return Err(anyhow!("{FORUM_TOPIC_FAILED}: HTTP {status}: {body}"));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(error = %e, "Max retries reached");
                        return Err(anyhow!(e).context(FORUM_TOPIC_FAILED));
                    }
                    warn!(error = %e, delay = ?delay, "Request error. Retrying...");
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

/// Executes the effects a submission emits.
pub struct EffectExecutor {
    notifier: Arc<dyn Notifier>,
    refresher: Arc<dyn OverviewRefresher>,
    forum: Option<ForumClient>,
}

impl EffectExecutor {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        refresher: Arc<dyn OverviewRefresher>,
        forum: Option<ForumClient>,
    ) -> Self {
        Self {
            notifier,
            refresher,
            forum,
        }
    }

    pub async fn execute(&self, effect: Effect) {
        match effect {
            Effect::Notify(notification) => self.notifier.notify(&notification),
            Effect::CloseProposalModal => debug!("Proposal modal closed"),
            Effect::OpenTxInfoModal { tx_hash } => info!(%tx_hash, "Transaction pending"),
            Effect::RefreshOverview => {
                if let Err(e) = self.refresher.refresh().await {
                    warn!(error = %e, "Failed to refresh overview");
                }
            }
            Effect::CreateThread(topic) => match &self.forum {
                Some(forum) => {
                    if let Err(e) = forum.create_thread(&topic).await {
                        error!(error = %e, error_chain = ?e, "Forum thread creation failed");
                    }
                }
                None => debug!("No forum configured, skipping thread"),
            },
        }
    }

    /// Consumes effects until every sender is gone. Each effect runs on its
    /// own task and is never awaited by the flow.
    pub async fn run(self: Arc<Self>, mut effects: mpsc::UnboundedReceiver<Effect>) {
        while let Some(effect) = effects.recv().await {
            let executor = self.clone();
            tokio::spawn(async move { executor.execute(effect).await });
        }
        info!("Effect channel closed");
    }
}
