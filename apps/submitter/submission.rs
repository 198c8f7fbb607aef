use crate::{
    chain::{CallArg, ContractCall, ContractInvoker, InvocationError},
    forms::{
        ArgSource, ArgType, ContractAction, Fallback, FormRegistry, FormValues, ModifierContext,
        ModifierError, ProposalFormDefinition, ProposalType, RegistryError, TxTarget,
        ValidationContext, ValidationError, resolve_values,
    },
    polls::{NewPoll, PendingPoll, PollError, PollId, PollTracker},
};
use alloy::primitives::{Address, B256, Bytes, TxHash, U256, keccak256};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Facts about the organization and the connected account a submission
/// is built against.
#[derive(Debug, Clone)]
pub struct SubmissionContext {
    pub dao_address: Address,
    pub chain_id: u64,
    pub account: Address,
    pub deposit_token: Address,
    pub token_decimals: u8,
    pub create_threads: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Notification {
    pub fn success(title: &str) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.to_string(),
            description: None,
        }
    }

    pub fn error(title: &str, description: String) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.to_string(),
            description: Some(description),
        }
    }
}

/// Payload for the off-chain discussion thread of a new proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumTopic {
    #[serde(rename = "chainID")]
    pub chain_id: u64,
    #[serde(rename = "daoID")]
    pub dao_id: Address,
    pub after_time: i64,
    pub proposal_type: String,
    pub title: String,
    pub description: String,
    pub applicant: Address,
}

/// Side effects the boundary executes on behalf of the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "payload")]
pub enum Effect {
    Notify(Notification),
    CloseProposalModal,
    OpenTxInfoModal { tx_hash: TxHash },
    RefreshOverview,
    CreateThread(ForumTopic),
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Modifier(#[from] ModifierError),
    #[error("`{0}` has no value and no default")]
    MissingArgument(String),
    #[error("`{field}` is not a valid {ty:?}: {value}")]
    InvalidArgument {
        field: String,
        ty: ArgType,
        value: String,
    },
    #[error("failed to build details: {0}")]
    Details(#[from] serde_json::Error),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("{0} is already in flight")]
    SubmissionInFlight(String),
}

/// A validated submission, ready to be tracked and sent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub proposal_type: ProposalType,
    pub hash: String,
    /// Identical form contents share a fingerprint.
    pub fingerprint: B256,
    pub created_at: i64,
    pub raw_values: FormValues,
    pub resolved_values: FormValues,
    pub details: String,
    pub call: ContractCall,
}

/// A proposal whose follow-up transaction can be triggered from the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableProposal {
    pub proposal_id: U256,
    pub proposal_type: ProposalType,
    pub minion_address: Address,
    pub executed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "error")]
pub enum SubmissionOutcome {
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub poll_id: PollId,
    pub tx_hash: Option<TxHash>,
    pub outcome: SubmissionOutcome,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FlightKey {
    Submit {
        proposal_type: ProposalType,
        fingerprint: B256,
    },
    Execute(U256),
}

impl FlightKey {
    fn label(&self) -> String {
        match self {
            FlightKey::Submit { proposal_type, .. } => {
                format!("an identical {} proposal", proposal_type.id())
            }
            FlightKey::Execute(id) => format!("execution of proposal {id}"),
        }
    }
}

type InFlight = Arc<Mutex<HashSet<FlightKey>>>;

/// Held while a transaction is waiting on the signer.
struct FlightGuard {
    in_flight: InFlight,
    key: FlightKey,
}

impl FlightGuard {
    fn acquire(in_flight: &InFlight, key: FlightKey) -> Result<Self, FlowError> {
        let mut keys = in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !keys.insert(key.clone()) {
            return Err(FlowError::SubmissionInFlight(key.label()));
        }
        Ok(Self {
            in_flight: in_flight.clone(),
            key,
        })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}

struct TrackedCall {
    key: FlightKey,
    hash: String,
    call: ContractCall,
    local_values: BTreeMap<String, String>,
    success_title: &'static str,
    topic: Option<ForumTopic>,
}

/// A registered poll whose transaction has not been sent yet. Holds the
/// in-flight slot until it is dispatched or dropped.
pub struct PendingSubmission {
    poll_id: PollId,
    guard: FlightGuard,
    call: ContractCall,
    success_title: &'static str,
    topic: Option<ForumTopic>,
}

impl PendingSubmission {
    pub fn poll_id(&self) -> &PollId {
        &self.poll_id
    }
}

fn success_title(action: &str) -> &'static str {
    if action == ContractAction::ExecuteAction.name() {
        "Proposal executed"
    } else {
        "Proposal submitted"
    }
}

/// Hash of the proposal type and raw values, independent of the attempt.
pub fn fingerprint(
    proposal_type: ProposalType,
    raw_values: &FormValues,
) -> Result<B256, serde_json::Error> {
    let encoded = serde_json::to_vec(&(proposal_type.id(), raw_values))?;
    Ok(keccak256(encoded))
}

fn present<'a>(values: &'a FormValues, name: &str) -> Option<&'a str> {
    values
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_arg(field: &str, ty: ArgType, value: &str) -> Result<CallArg, FlowError> {
    let invalid = || FlowError::InvalidArgument {
        field: field.to_string(),
        ty,
        value: value.to_string(),
    };
    match ty {
        ArgType::Address => value.parse::<Address>().map(CallArg::Address).map_err(|_| invalid()),
        ArgType::Uint => value.parse::<U256>().map(CallArg::Uint).map_err(|_| invalid()),
        ArgType::Bytes => value.parse::<Bytes>().map(CallArg::Bytes).map_err(|_| invalid()),
        ArgType::String => Ok(CallArg::String(value.to_string())),
    }
}

fn fallback_arg(
    field: &str,
    ty: ArgType,
    fallback: Fallback,
    context: &SubmissionContext,
) -> Result<CallArg, FlowError> {
    Ok(match (fallback, ty) {
        (Fallback::Required, _) => return Err(FlowError::MissingArgument(field.to_string())),
        (Fallback::ConnectedAccount, _) => CallArg::Address(context.account),
        (Fallback::DepositToken, _) => CallArg::Address(context.deposit_token),
        (Fallback::Zero | Fallback::EmptyBytes, ArgType::Address) => CallArg::Address(Address::ZERO),
        (Fallback::Zero | Fallback::EmptyBytes, ArgType::Uint) => CallArg::Uint(U256::ZERO),
        (Fallback::Zero | Fallback::EmptyBytes, ArgType::Bytes) => CallArg::Bytes(Bytes::new()),
        (Fallback::Zero | Fallback::EmptyBytes, ArgType::String) => CallArg::String(String::new()),
    })
}

/// Turns a form's transaction descriptor into a concrete call.
pub fn build_call(
    definition: &ProposalFormDefinition,
    resolved: &FormValues,
    details: &str,
    context: &SubmissionContext,
) -> Result<ContractCall, FlowError> {
    let target = match &definition.tx.target {
        TxTarget::Dao => context.dao_address,
        TxTarget::Field(name) => match present(resolved, name) {
            Some(value) => value.parse().map_err(|_| FlowError::InvalidArgument {
                field: name.clone(),
                ty: ArgType::Address,
                value: value.to_string(),
            })?,
            None => return Err(FlowError::MissingArgument(name.clone())),
        },
    };

    let args = definition
        .tx
        .args
        .iter()
        .map(|source| match source {
            ArgSource::Details => Ok(CallArg::String(details.to_string())),
            ArgSource::Field { name, ty, fallback } => match present(resolved, name) {
                Some(value) => parse_arg(name, *ty, value),
                None => fallback_arg(name, *ty, *fallback, context),
            },
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ContractCall {
        action: definition.tx.action,
        target,
        args,
    })
}

/// The application-level JSON stored alongside the proposal on chain.
pub fn build_details(
    definition: &ProposalFormDefinition,
    raw_values: &FormValues,
    hash: &str,
    created_at: i64,
) -> Result<String, serde_json::Error> {
    let mut details: Map<String, Value> = raw_values
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();

    for key in ["title", "description", "link"] {
        details
            .entry(key)
            .or_insert_with(|| Value::String(String::new()));
    }
    details.insert(
        "proposalType".to_string(),
        json!(definition.proposal_type.display_name()),
    );
    details.insert("hash".to_string(), json!(hash));
    details.insert("createdAt".to_string(), json!(created_at));

    serde_json::to_string(&details)
}

/// Drives one proposal from raw form values to a settled poll.
pub struct SubmissionFlow {
    registry: Arc<FormRegistry>,
    tracker: Arc<PollTracker>,
    invoker: Arc<dyn ContractInvoker>,
    context: SubmissionContext,
    effects: mpsc::UnboundedSender<Effect>,
    in_flight: InFlight,
}

impl SubmissionFlow {
    pub fn new(
        registry: Arc<FormRegistry>,
        tracker: Arc<PollTracker>,
        invoker: Arc<dyn ContractInvoker>,
        context: SubmissionContext,
        effects: mpsc::UnboundedSender<Effect>,
    ) -> Self {
        Self {
            registry,
            tracker,
            invoker,
            context,
            effects,
            in_flight: InFlight::default(),
        }
    }

    pub fn context(&self) -> &SubmissionContext {
        &self.context
    }

    /// Validates, resolves and encodes a submission. Touches nothing outside
    /// the returned value.
    pub fn prepare(
        &self,
        proposal_type: ProposalType,
        raw_values: FormValues,
    ) -> Result<SubmissionRequest, FlowError> {
        let definition = self.registry.resolve(proposal_type)?;

        FormRegistry::validate(
            &definition,
            &raw_values,
            &ValidationContext {
                dao_address: self.context.dao_address,
            },
        )?;

        let resolved_values = resolve_values(
            &definition,
            &raw_values,
            &ModifierContext {
                token_decimals: self.context.token_decimals,
            },
        )?;

        let hash = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp();
        let details = build_details(&definition, &raw_values, &hash, created_at)?;
        let call = build_call(&definition, &resolved_values, &details, &self.context)?;
        call.calldata()?;

        Ok(SubmissionRequest {
            proposal_type,
            hash,
            fingerprint: fingerprint(proposal_type, &raw_values)?,
            created_at,
            raw_values,
            resolved_values,
            details,
            call,
        })
    }

    /// Claims the in-flight slot for these form contents and registers the
    /// poll. Nothing has been sent when this returns.
    #[instrument(skip_all, fields(proposal_type = %request.proposal_type, hash = %request.hash))]
    pub async fn track(&self, request: SubmissionRequest) -> Result<PendingSubmission, FlowError> {
        let title = success_title(request.call.action.name());
        let topic = self.context.create_threads.then(|| ForumTopic {
            chain_id: self.context.chain_id,
            dao_id: self.context.dao_address,
            after_time: request.created_at,
            proposal_type: request.proposal_type.display_name().to_string(),
            title: request.raw_values.get("title").cloned().unwrap_or_default(),
            description: request
                .raw_values
                .get("description")
                .cloned()
                .unwrap_or_default(),
            applicant: self.context.account,
        });

        self.begin(TrackedCall {
            key: FlightKey::Submit {
                proposal_type: request.proposal_type,
                fingerprint: request.fingerprint,
            },
            hash: request.hash,
            call: request.call,
            local_values: request.raw_values,
            success_title: title,
            topic,
        })
        .await
    }

    /// Registers the poll, sends the transaction and waits for it to settle.
    /// Invocation failures settle the poll and come back as a failed outcome.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionReceipt, FlowError> {
        let pending = self.track(request).await?;
        Ok(self.dispatch(pending).await)
    }

    /// Sends the follow-up transaction for a passed proposal. Already
    /// executed proposals produce no transaction.
    #[instrument(skip(self, args_override), fields(proposal_id = %proposal.proposal_id))]
    pub async fn execute(
        &self,
        proposal: &ExecutableProposal,
        args_override: Option<Vec<CallArg>>,
    ) -> Result<Option<SubmissionReceipt>, FlowError> {
        if proposal.executed {
            debug!("Proposal already executed");
            return Ok(None);
        }

        let call = ContractCall {
            action: ContractAction::ExecuteAction,
            target: proposal.minion_address,
            args: args_override.unwrap_or_else(|| vec![CallArg::Uint(proposal.proposal_id)]),
        };
        call.calldata()?;

        let local_values = BTreeMap::from([
            ("minionAddress".to_string(), proposal.minion_address.to_string()),
            ("proposalId".to_string(), proposal.proposal_id.to_string()),
            ("proposalType".to_string(), proposal.proposal_type.id().to_string()),
        ]);

        let pending = self
            .begin(TrackedCall {
                key: FlightKey::Execute(proposal.proposal_id),
                hash: uuid::Uuid::new_v4().to_string(),
                call,
                local_values,
                success_title: success_title(ContractAction::ExecuteAction.name()),
                topic: None,
            })
            .await?;
        Ok(Some(self.dispatch(pending).await))
    }

    /// Waits again on a rehydrated poll whose transaction was already sent.
    /// Polls that never got a hash are left to the stale sweep.
    #[instrument(skip_all, fields(poll_id = %poll.id))]
    pub async fn resume(&self, poll: PendingPoll) -> Option<SubmissionReceipt> {
        let Some(tx_hash) = poll.tx_hash else {
            debug!("No transaction hash, nothing to watch");
            return None;
        };

        let effects = Vec::new();
        let title = success_title(&poll.action);
        Some(match self.invoker.confirm(tx_hash).await {
            Ok(()) => self.settle_success(poll.id, tx_hash, title, None, effects).await,
            Err(e) => self.settle_failure(poll.id, Some(tx_hash), e, effects).await,
        })
    }

    fn emit(&self, effects: &mut Vec<Effect>, effect: Effect) {
        if self.effects.send(effect.clone()).is_err() {
            debug!("Effect receiver dropped");
        }
        effects.push(effect);
    }

    async fn begin(&self, tracked: TrackedCall) -> Result<PendingSubmission, FlowError> {
        let guard = FlightGuard::acquire(&self.in_flight, tracked.key)?;

        let poll_id = self
            .tracker
            .register(NewPoll {
                hash: tracked.hash,
                action: tracked.call.action.name().to_string(),
                dao_id: self.context.dao_address.to_string(),
                chain_id: self.context.chain_id,
                local_values: tracked.local_values,
            })
            .await?;

        Ok(PendingSubmission {
            poll_id,
            guard,
            call: tracked.call,
            success_title: tracked.success_title,
            topic: tracked.topic,
        })
    }

    /// Sends a tracked transaction and waits for it to settle.
    #[instrument(skip_all, fields(poll_id = %pending.poll_id))]
    pub async fn dispatch(&self, pending: PendingSubmission) -> SubmissionReceipt {
        let PendingSubmission {
            poll_id,
            guard,
            call,
            success_title,
            topic,
        } = pending;
        let mut effects = Vec::new();

        let tx_hash = match self.invoker.send(&call, self.context.account).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                drop(guard);
                return self.settle_failure(poll_id, None, e, effects).await;
            }
        };

        if let Err(e) = self.tracker.attach_tx_hash(&poll_id, tx_hash).await {
            warn!(poll_id = %poll_id, error = %e, "Poll no longer tracked, continuing without it");
        }
        self.emit(&mut effects, Effect::CloseProposalModal);
        self.emit(&mut effects, Effect::OpenTxInfoModal { tx_hash });
        drop(guard);

        match self.invoker.confirm(tx_hash).await {
            Ok(()) => {
                self.settle_success(poll_id, tx_hash, success_title, topic, effects)
                    .await
            }
            Err(e) => self.settle_failure(poll_id, Some(tx_hash), e, effects).await,
        }
    }

    async fn settle_success(
        &self,
        poll_id: PollId,
        tx_hash: TxHash,
        title: &str,
        topic: Option<ForumTopic>,
        mut effects: Vec<Effect>,
    ) -> SubmissionReceipt {
        self.emit(&mut effects, Effect::Notify(Notification::success(title)));
        self.emit(&mut effects, Effect::RefreshOverview);
        if let Some(topic) = topic {
            self.emit(&mut effects, Effect::CreateThread(topic));
        }
        if let Err(e) = self.tracker.resolve(&poll_id).await {
            error!(poll_id = %poll_id, error = %e, "Failed to resolve poll");
        }

        info!(poll_id = %poll_id, %tx_hash, "Transaction confirmed");
        SubmissionReceipt {
            poll_id,
            tx_hash: Some(tx_hash),
            outcome: SubmissionOutcome::Confirmed,
            effects,
        }
    }

    async fn settle_failure(
        &self,
        poll_id: PollId,
        tx_hash: Option<TxHash>,
        error: InvocationError,
        mut effects: Vec<Effect>,
    ) -> SubmissionReceipt {
        error!(poll_id = %poll_id, tx_hash = ?tx_hash, error = %error, "Transaction failed");

        self.emit(
            &mut effects,
            Effect::Notify(Notification::error("Transaction failed", error.to_string())),
        );
        if let Err(e) = self.tracker.fail(&poll_id).await {
            error!(poll_id = %poll_id, error = %e, "Failed to release poll");
        }

        SubmissionReceipt {
            poll_id,
            tx_hash,
            outcome: SubmissionOutcome::Failed(error.to_string()),
            effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polls::{MemoryPollStore, PollStatus, PollStore};
    use alloy::primitives::{address, b256};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    const DAO: Address = address!("0x1111111111111111111111111111111111111111");
    const ACCOUNT: Address = address!("0x2222222222222222222222222222222222222222");
    const DEPOSIT_TOKEN: Address = address!("0x3333333333333333333333333333333333333333");
    const APPLICANT: &str = "0xabc0000000000000000000000000000000000123";
    const TX: TxHash = b256!("0x00000000000000000000000000000000000000000000000000000000000000aa");

    struct MockInvoker {
        calls: Mutex<Vec<ContractCall>>,
        send_result: Result<TxHash, InvocationError>,
        confirm_result: Result<(), InvocationError>,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl MockInvoker {
        fn succeeding() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                send_result: Ok(TX),
                confirm_result: Ok(()),
                gate: None,
            }
        }

        fn calls(&self) -> Vec<ContractCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContractInvoker for MockInvoker {
        async fn send(&self, call: &ContractCall, _from: Address) -> Result<TxHash, InvocationError> {
            self.calls.lock().unwrap().push(call.clone());
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            self.send_result.clone()
        }

        async fn confirm(&self, _tx_hash: TxHash) -> Result<(), InvocationError> {
            self.confirm_result.clone()
        }
    }

    struct Harness {
        flow: Arc<SubmissionFlow>,
        invoker: Arc<MockInvoker>,
        store: Arc<MemoryPollStore>,
        tracker: Arc<PollTracker>,
        effects: mpsc::UnboundedReceiver<Effect>,
    }

    fn harness(invoker: MockInvoker, create_threads: bool) -> Harness {
        let store = Arc::new(MemoryPollStore::new());
        let tracker = Arc::new(PollTracker::new(store.clone()));
        let invoker = Arc::new(invoker);
        let (tx, rx) = mpsc::unbounded_channel();
        let flow = SubmissionFlow::new(
            Arc::new(FormRegistry::with_default_catalog().unwrap()),
            tracker.clone(),
            invoker.clone(),
            SubmissionContext {
                dao_address: DAO,
                chain_id: 1,
                account: ACCOUNT,
                deposit_token: DEPOSIT_TOKEN,
                token_decimals: 18,
                create_threads,
            },
            tx,
        );
        Harness {
            flow: Arc::new(flow),
            invoker,
            store,
            tracker,
            effects: rx,
        }
    }

    fn values(pairs: &[(&str, &str)]) -> FormValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn funding_values() -> FormValues {
        values(&[
            ("title", "Pay contributor"),
            ("applicant", APPLICANT),
            ("paymentRequested", "5"),
        ])
    }

    fn notifications(effects: &[Effect]) -> Vec<&Notification> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Notify(notification) => Some(notification),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_funding_submission_end_to_end() {
        let mut h = harness(MockInvoker::succeeding(), true);

        let request = h.flow.prepare(ProposalType::Funding, funding_values()).unwrap();
        let hash = request.hash.clone();
        let created_at = request.created_at;
        let receipt = h.flow.submit(request).await.unwrap();

        assert_eq!(receipt.poll_id, hash);
        assert_eq!(receipt.tx_hash, Some(TX));
        assert_eq!(receipt.outcome, SubmissionOutcome::Confirmed);

        let calls = h.invoker.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.action, ContractAction::SubmitProposal);
        assert_eq!(call.target, DAO);
        assert_eq!(call.args[0], CallArg::Address(APPLICANT.parse().unwrap()));
        assert_eq!(
            call.args[5],
            CallArg::Uint(U256::from(5_000_000_000_000_000_000u128))
        );
        assert_eq!(call.args[6], CallArg::Address(DEPOSIT_TOKEN));

        let CallArg::String(details) = call.args.last().unwrap() else {
            panic!("details must be the last argument");
        };
        let details: Value = serde_json::from_str(details).unwrap();
        assert_eq!(details["title"], "Pay contributor");
        assert_eq!(details["proposalType"], "Funding Proposal");
        assert_eq!(details["hash"], hash.as_str());
        assert_eq!(details["createdAt"], created_at);
        assert_eq!(details["applicant"], APPLICANT);
        assert_eq!(details["paymentRequested"], "5");
        assert_eq!(details["link"], "");

        let notes = notifications(&receipt.effects);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Success);
        assert!(receipt.effects.contains(&Effect::RefreshOverview));
        assert!(
            receipt
                .effects
                .iter()
                .any(|effect| matches!(
                    effect,
                    Effect::CreateThread(topic) if topic.title == "Pay contributor" && topic.applicant == ACCOUNT
                ))
        );

        assert!(h.store.load_all().await.unwrap().is_empty());
        assert!(h.tracker.pending().is_empty());

        let mut streamed = Vec::new();
        while let Ok(effect) = h.effects.try_recv() {
            streamed.push(effect);
        }
        assert_eq!(streamed, receipt.effects);
    }

    #[tokio::test]
    async fn test_missing_applicant_stops_before_network() {
        let mut h = harness(MockInvoker::succeeding(), false);
        let raw = values(&[("title", "Pay contributor"), ("paymentRequested", "5")]);

        let err = h.flow.prepare(ProposalType::Funding, raw).unwrap_err();
        assert!(matches!(err, FlowError::Validation(ref e) if e.references("applicant")));

        assert!(h.invoker.calls().is_empty());
        assert!(h.store.load_all().await.unwrap().is_empty());
        assert!(h.effects.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_signature_releases_poll() {
        let invoker = MockInvoker {
            send_result: Err(InvocationError::Rejected("User denied".to_string())),
            ..MockInvoker::succeeding()
        };
        let h = harness(invoker, true);

        let request = h.flow.prepare(ProposalType::Funding, funding_values()).unwrap();
        let receipt = h.flow.submit(request).await.unwrap();

        assert!(matches!(receipt.outcome, SubmissionOutcome::Failed(_)));
        assert_eq!(receipt.tx_hash, None);
        let notes = notifications(&receipt.effects);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert!(!receipt.effects.contains(&Effect::CloseProposalModal));
        assert!(h.store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revert_after_send_keeps_modal_effects() {
        let invoker = MockInvoker {
            confirm_result: Err(InvocationError::Reverted(TX)),
            ..MockInvoker::succeeding()
        };
        let h = harness(invoker, true);

        let request = h.flow.prepare(ProposalType::Funding, funding_values()).unwrap();
        let receipt = h.flow.submit(request).await.unwrap();

        assert_eq!(receipt.tx_hash, Some(TX));
        assert_eq!(receipt.effects[0], Effect::CloseProposalModal);
        assert_eq!(receipt.effects[1], Effect::OpenTxInfoModal { tx_hash: TX });
        assert!(
            !receipt
                .effects
                .iter()
                .any(|effect| matches!(effect, Effect::CreateThread(_)))
        );
        assert!(h.store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_payment_is_rejected_before_tracking() {
        let h = harness(MockInvoker::succeeding(), false);
        let raw = values(&[
            ("title", "Pay contributor"),
            ("applicant", APPLICANT),
            ("paymentRequested", "-5"),
        ]);

        let err = h.flow.prepare(ProposalType::Funding, raw).unwrap_err();
        assert!(matches!(err, FlowError::Modifier(ModifierError::InvalidAmount { ref field, .. }) if field == "paymentRequested"));
        assert!(h.tracker.pending().is_empty());
    }

    #[tokio::test]
    async fn test_identical_submit_while_signing_is_rejected() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let invoker = MockInvoker {
            gate: Some((entered.clone(), release.clone())),
            ..MockInvoker::succeeding()
        };
        let h = harness(invoker, false);

        let first = h.flow.prepare(ProposalType::Funding, funding_values()).unwrap();
        let second = h.flow.prepare(ProposalType::Funding, funding_values()).unwrap();

        let flow = h.flow.clone();
        let pending = tokio::spawn(async move { flow.submit(first).await });
        entered.notified().await;

        // registered before the signer was invoked
        assert_eq!(h.tracker.pending().len(), 1);
        assert!(matches!(
            h.flow.track(second).await,
            Err(FlowError::SubmissionInFlight(_))
        ));
        assert_eq!(h.tracker.pending().len(), 1);

        release.notify_one();
        let receipt = pending.await.unwrap().unwrap();
        assert_eq!(receipt.outcome, SubmissionOutcome::Confirmed);
        assert_eq!(h.invoker.calls().len(), 1);
        assert!(h.store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loot_grab_applies_for_connected_account() {
        let h = harness(MockInvoker::succeeding(), false);
        let request = h
            .flow
            .prepare(ProposalType::LootGrab, values(&[("tributeOffered", " 2 ")]))
            .unwrap();

        assert_eq!(request.call.args[0], CallArg::Address(ACCOUNT));
        assert_eq!(
            request.call.args[3],
            CallArg::Uint(U256::from(2_000_000_000_000_000_000u128))
        );
        assert_eq!(request.call.args[1], CallArg::Uint(U256::ZERO));
    }

    #[tokio::test]
    async fn test_minion_targets_selected_minion() {
        let h = harness(MockInvoker::succeeding(), false);
        let minion = "0x4444444444444444444444444444444444444444";
        let request = h
            .flow
            .prepare(
                ProposalType::Minion,
                values(&[
                    ("title", "Call contract"),
                    ("selectedMinion", minion),
                    ("targetContract", "0x5555555555555555555555555555555555555555"),
                    ("abiInput", "0xdeadbeef"),
                ]),
            )
            .unwrap();

        assert_eq!(request.call.action, ContractAction::ProposeAction);
        assert_eq!(request.call.target, minion.parse::<Address>().unwrap());
        assert_eq!(
            request.call.args[2],
            CallArg::Bytes(Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]))
        );
        assert_eq!(request.call.args[1], CallArg::Uint(U256::ZERO));
    }

    #[tokio::test]
    async fn test_unresolved_ens_name_is_invalid_argument() {
        let h = harness(MockInvoker::succeeding(), false);
        let raw = values(&[("title", "Kick"), ("applicant", "alice.eth")]);

        let err = h.flow.prepare(ProposalType::GuildKick, raw).unwrap_err();
        assert!(matches!(err, FlowError::InvalidArgument { ref field, .. } if field == "applicant"));
    }

    #[tokio::test]
    async fn test_execute_skips_executed_proposal() {
        let h = harness(MockInvoker::succeeding(), false);
        let proposal = ExecutableProposal {
            proposal_id: U256::from(7),
            proposal_type: ProposalType::Minion,
            minion_address: address!("0x4444444444444444444444444444444444444444"),
            executed: true,
        };

        assert!(h.flow.execute(&proposal, None).await.unwrap().is_none());
        assert!(h.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_execute_sends_execute_action() {
        let h = harness(MockInvoker::succeeding(), true);
        let proposal = ExecutableProposal {
            proposal_id: U256::from(7),
            proposal_type: ProposalType::Minion,
            minion_address: address!("0x4444444444444444444444444444444444444444"),
            executed: false,
        };

        let receipt = h.flow.execute(&proposal, None).await.unwrap().unwrap();
        assert_eq!(receipt.outcome, SubmissionOutcome::Confirmed);

        let calls = h.invoker.calls();
        assert_eq!(calls[0].action, ContractAction::ExecuteAction);
        assert_eq!(calls[0].target, proposal.minion_address);
        assert_eq!(calls[0].args, vec![CallArg::Uint(U256::from(7))]);
        assert!(
            !receipt
                .effects
                .iter()
                .any(|effect| matches!(effect, Effect::CreateThread(_)))
        );
    }

    #[tokio::test]
    async fn test_distinct_proposals_of_same_type_are_independent() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let invoker = MockInvoker {
            gate: Some((entered.clone(), release.clone())),
            ..MockInvoker::succeeding()
        };
        let h = harness(invoker, false);

        let first = h.flow.prepare(ProposalType::Funding, funding_values()).unwrap();
        let mut other = funding_values();
        other.insert("title".to_string(), "Pay designer".to_string());
        let second = h.flow.prepare(ProposalType::Funding, other).unwrap();
        assert_ne!(first.fingerprint, second.fingerprint);

        let flow = h.flow.clone();
        let pending = tokio::spawn(async move { flow.submit(first).await });
        entered.notified().await;

        let tracked = h.flow.track(second).await.unwrap();
        assert_eq!(h.tracker.pending().len(), 2);
        assert!(h.tracker.pending().iter().any(|poll| &poll.id == tracked.poll_id()));

        release.notify_one();
        assert_eq!(
            pending.await.unwrap().unwrap().outcome,
            SubmissionOutcome::Confirmed
        );
    }

    fn stored_poll(hash: &str, action: ContractAction, tx_hash: Option<TxHash>) -> PendingPoll {
        PendingPoll {
            tx_hash,
            ..NewPoll {
                hash: hash.to_string(),
                action: action.name().to_string(),
                dao_id: DAO.to_string(),
                chain_id: 1,
                local_values: BTreeMap::new(),
            }
            .into_pending()
        }
    }

    #[tokio::test]
    async fn test_resume_confirms_rehydrated_poll() {
        let h = harness(MockInvoker::succeeding(), true);
        h.store
            .put(stored_poll("hash-sent", ContractAction::SubmitProposal, Some(TX)))
            .await
            .unwrap();
        h.store
            .put(stored_poll("hash-unsent", ContractAction::SubmitProposal, None))
            .await
            .unwrap();

        let rehydrated = h.tracker.rehydrate().await.unwrap();
        assert_eq!(rehydrated.len(), 2);

        let mut receipts = Vec::new();
        for poll in rehydrated {
            receipts.extend(h.flow.resume(poll).await);
        }

        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].poll_id, "hash-sent");
        assert_eq!(receipts[0].outcome, SubmissionOutcome::Confirmed);
        assert!(receipts[0].effects.contains(&Effect::RefreshOverview));

        let left = h.store.load_all().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "hash-unsent");
        assert_eq!(left[0].status, PollStatus::Pending);
    }

    #[tokio::test]
    async fn test_resume_settles_reverted_poll() {
        let invoker = MockInvoker {
            confirm_result: Err(InvocationError::Reverted(TX)),
            ..MockInvoker::succeeding()
        };
        let h = harness(invoker, false);
        let poll = stored_poll("hash-sent", ContractAction::ExecuteAction, Some(TX));
        h.store.put(poll.clone()).await.unwrap();
        h.tracker.rehydrate().await.unwrap();

        let receipt = h.flow.resume(poll).await.unwrap();
        assert!(matches!(receipt.outcome, SubmissionOutcome::Failed(_)));
        assert!(h.store.load_all().await.unwrap().is_empty());
    }
}
