//! Wiring of registries, store, executor and reconciler into one handle.

use crate::chain_client::ChainRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::executor::{ExecutionReport, SequenceExecutor};
use crate::invocation::{ActionInvoker, InvocationContext};
use crate::protocols::chain_tools::ChainTools;
use crate::protocols::stryke::{OptionsMarketApi, StrykeClient, StrykeProtocol};
use crate::protocols::symbiosis::{SwapRouter, SymbiosisClient, SymbiosisProtocol};
use crate::protocols::transfer::TransferProtocol;
use crate::queue::{self, JobQueue, ReconcileJob, TokioJobQueue, RECONCILE_JOB};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::registry::ProtocolRegistry;
use crate::sequence::{ActionSequence, InformationRequest, ParsedAction, StoredSequence};
use crate::signer::{CustodialSigner, HttpCustodialSigner};
use crate::store::{RedbSequenceStore, SequenceStore};
use crate::stream::{self, StatusSnapshot};
use crate::tokens::{ChainTokenDirectory, TokenDirectory};
use crate::tools::ToolRegistry;
use futures::Stream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// External services the engine talks to.
pub struct Collaborators {
    pub chains: Arc<ChainRegistry>,
    pub tokens: Arc<dyn TokenDirectory>,
    pub signer: Arc<dyn CustodialSigner>,
    pub store: Arc<dyn SequenceStore>,
    pub router: Arc<dyn SwapRouter>,
    pub options: Arc<dyn OptionsMarketApi>,
}

impl Collaborators {
    /// Live clients built from config. Relative storage paths resolve against `root`.
    pub fn from_config(config: &Config, root: &Path) -> Result<Self> {
        let store = RedbSequenceStore::open(&config.storage_path(root))?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Live chain and API clients over a caller-supplied store.
    pub fn with_store(config: &Config, store: Arc<dyn SequenceStore>) -> Self {
        let chains = Arc::new(ChainRegistry::from_config(config));
        Self {
            tokens: Arc::new(ChainTokenDirectory::new(chains.clone())),
            chains,
            signer: Arc::new(HttpCustodialSigner::from_config(&config.signer)),
            store,
            router: Arc::new(SymbiosisClient::new(config.symbiosis.api_url.clone())),
            options: Arc::new(StrykeClient::new(config.stryke.api_url.clone())),
        }
    }
}

pub struct Engine {
    pub config: Config,
    pub chains: Arc<ChainRegistry>,
    pub protocols: Arc<ProtocolRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub store: Arc<dyn SequenceStore>,
    invoker: ActionInvoker,
    executor: SequenceExecutor,
    reconciler: Arc<Reconciler>,
    queue: Arc<dyn JobQueue>,
}

impl Engine {
    pub fn from_config(config: Config, root: &Path) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config, root)?;
        Self::assemble(config, collaborators)
    }

    /// Register every protocol and tool provider, and start the reconcile
    /// worker when running inside a tokio runtime.
    pub fn assemble(config: Config, c: Collaborators) -> Result<Self> {
        let (job_queue, jobs) = TokioJobQueue::new();
        let queue: Arc<dyn JobQueue> = Arc::new(job_queue);
        Self::assemble_with_queue(config, c, queue, Some(jobs))
    }

    /// As [`Engine::assemble`] with a caller-supplied queue; `jobs` feeds the worker.
    pub fn assemble_with_queue(
        config: Config,
        c: Collaborators,
        queue: Arc<dyn JobQueue>,
        jobs: Option<tokio::sync::mpsc::UnboundedReceiver<queue::Job>>,
    ) -> Result<Self> {
        let stryke = Arc::new(StrykeProtocol::new(
            c.chains.clone(),
            c.options.clone(),
            &config.stryke,
        ));

        let mut protocols = ProtocolRegistry::new();
        protocols.register(Arc::new(TransferProtocol::new(
            c.chains.clone(),
            c.tokens.clone(),
        )))?;
        protocols.register(Arc::new(SymbiosisProtocol::new(
            c.chains.clone(),
            c.tokens.clone(),
            c.router.clone(),
            &config.symbiosis,
        )))?;
        protocols.register(stryke.clone())?;
        let protocols = Arc::new(protocols);

        let mut tools = ToolRegistry::new();
        tools.register(stryke)?;
        tools.register(Arc::new(ChainTools::new(c.chains.clone(), c.tokens.clone())))?;

        let executor = SequenceExecutor::new(
            c.chains.clone(),
            c.signer.clone(),
            c.store.clone(),
            queue.clone(),
            config.executor.clone(),
        );
        let reconciler = Arc::new(Reconciler::new(
            c.chains.clone(),
            c.store.clone(),
            queue.clone(),
            config.reconciler.clone(),
        ));

        if let Some(jobs) = jobs {
            if tokio::runtime::Handle::try_current().is_ok() {
                tokio::spawn(queue::run_worker(jobs, reconciler.clone()));
            } else {
                warn!("no tokio runtime; reconcile jobs will not run in this process");
            }
        }

        Ok(Self {
            invoker: ActionInvoker::new(protocols.clone()),
            config,
            chains: c.chains,
            protocols,
            tools: Arc::new(tools),
            store: c.store,
            executor,
            reconciler,
            queue,
        })
    }

    /// The need-more-information answer when any parsed task is incomplete.
    pub fn information_request(&self, parsed: &[ParsedAction]) -> Option<InformationRequest> {
        InformationRequest::from_parsed(parsed)
    }

    pub async fn invoke(&self, parsed: Vec<ParsedAction>, ctx: &InvocationContext) -> ActionSequence {
        self.invoker.invoke(parsed, ctx).await
    }

    /// Persist a draft the user confirmed.
    pub fn save(&self, draft: ActionSequence, user_id: &str) -> Result<StoredSequence> {
        let sequence = StoredSequence::from_draft(draft, user_id)?;
        self.store.create(&sequence)?;
        info!(sequence_id = %sequence.id, user_id, "sequence saved");
        Ok(sequence)
    }

    pub async fn execute(&self, sequence_id: Uuid, wallet_id: &str) -> Result<ExecutionReport> {
        self.executor.execute(sequence_id, wallet_id).await
    }

    pub async fn reconcile(&self, sequence_id: Uuid) -> Result<ReconcileReport> {
        self.reconciler.reconcile(sequence_id).await
    }

    pub fn watch(
        &self,
        sequence_id: Uuid,
    ) -> impl Stream<Item = Result<StatusSnapshot>> + Send + 'static {
        stream::watch_sequence(self.store.clone(), sequence_id, &self.config.stream)
    }

    /// Schedule reconciliation for every sequence with a transaction in flight.
    pub async fn resume_outstanding(&self) -> Result<usize> {
        let mut scheduled = 0;
        for sequence in self.store.list()? {
            if !sequence.has_ongoing() {
                continue;
            }
            let job = ReconcileJob {
                sequence_id: sequence.id,
            };
            if self
                .queue
                .enqueue(
                    RECONCILE_JOB,
                    serde_json::to_value(job)?,
                    job.options(Duration::ZERO),
                )
                .await?
            {
                scheduled += 1;
            }
        }
        if scheduled > 0 {
            info!(scheduled, "resumed reconciliation of in-flight sequences");
        }
        Ok(scheduled)
    }

    pub fn describe_protocols(&self) -> String {
        self.protocols.describe_all(&self.chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySequenceStore;
    use crate::test_support::{
        chain_registry, MockChain, MockOptionsApi, MockRouter, MockSigner, RecordingQueue,
    };
    use crate::types::{ActionKind, TransactionPatch, TransactionStatus};
    use alloy_primitives::{Address, U256};
    use serde_json::json;

    const USER: Address = Address::repeat_byte(0xa1);

    fn engine(chain: MockChain, queue: RecordingQueue) -> Engine {
        let chains = Arc::new(chain_registry(vec![chain]));
        let collaborators = Collaborators {
            tokens: Arc::new(ChainTokenDirectory::new(chains.clone())),
            chains,
            signer: Arc::new(MockSigner::new()),
            store: Arc::new(MemorySequenceStore::new()),
            router: Arc::new(MockRouter::evm(Address::repeat_byte(0xee))),
            options: Arc::new(MockOptionsApi::new(vec![])),
        };
        let mut config = Config::default();
        config.executor.confirmation_interval_secs = 0;
        config.executor.inter_transaction_delay_secs = 0;
        Engine::assemble_with_queue(config, collaborators, Arc::new(queue), None).unwrap()
    }

    fn transfer(amount: &str) -> ParsedAction {
        ParsedAction {
            task: format!("send {amount} ETH"),
            action: ActionKind::Transfer,
            protocol_name: None,
            chain_id: 1,
            params: json!({
                "token": "ETH",
                "amount": amount,
                "recipient": Address::repeat_byte(0xb2),
            }),
            missing_params: vec![],
            unclear_params: vec![],
        }
    }

    #[test]
    fn registers_builtin_protocols_and_tools() {
        let e = engine(MockChain::new(1), RecordingQueue::new());
        let names: Vec<&str> = e.protocols.protocols().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["transfer", "symbiosis", "stryke"]);
        assert!(e.protocols.resolve(ActionKind::Bridge, None).is_ok());
        assert!(e.protocols.resolve(ActionKind::Open, Some("stryke")).is_ok());
        assert!(e.tools.contains("chain_get_balance"));
        assert!(e.tools.contains("stryke_get_strikes_chain"));
        assert!(e.describe_protocols().contains("## symbiosis"));
    }

    #[tokio::test]
    async fn invoke_save_execute_round() {
        let chain = MockChain::new(1);
        chain.set_native_balance(USER, U256::from(10u64).pow(U256::from(19u64)));
        let queue = RecordingQueue::new();
        let e = engine(chain.clone(), queue.clone());
        let ctx = InvocationContext {
            user_id: Some("alice".into()),
            user_address: Some(USER),
        };

        let draft = e.invoke(vec![transfer("1")], &ctx).await;
        assert_eq!(draft.error_count(), 0);
        let saved = e.save(draft, "alice").unwrap();

        let report = e.execute(saved.id, "wallet-1").await.unwrap();
        assert_eq!(report.confirmed, 1);
        assert_eq!(chain.broadcast_log().len(), 1);
        assert_eq!(queue.jobs().len(), 1);

        let stored = e.store.get(saved.id).unwrap();
        assert!(stored.all_terminal());
        assert_eq!(e.store.list_by_user("alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drafts_with_errors_are_not_saved() {
        let e = engine(MockChain::new(1), RecordingQueue::new());
        let draft = e
            .invoke(vec![transfer("-3")], &InvocationContext::default())
            .await;
        assert_eq!(draft.error_count(), 1);
        assert!(e.save(draft, "alice").is_err());
        assert!(e.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_schedules_only_in_flight_sequences() {
        let chain = MockChain::new(1);
        chain.set_native_balance(USER, U256::MAX);
        let queue = RecordingQueue::new();
        let e = engine(chain, queue.clone());
        let ctx = InvocationContext {
            user_id: Some("alice".into()),
            user_address: Some(USER),
        };
        let a = e.save(e.invoke(vec![transfer("1")], &ctx).await, "alice").unwrap();
        e.save(e.invoke(vec![transfer("2")], &ctx).await, "alice").unwrap();
        e.store
            .update_transaction(
                a.id,
                a.actions[0].action.id,
                0,
                &TransactionPatch::status(TransactionStatus::Sent),
            )
            .unwrap();

        assert_eq!(e.resume_outstanding().await.unwrap(), 1);
        let jobs = queue.jobs();
        assert_eq!(jobs[0].1, json!({"sequenceId": a.id}));
    }
}
