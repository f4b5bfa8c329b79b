//! # Scenarios
//!
//! A scenario is a JSON document describing an initial funding table and an
//! ordered list of steps against a fresh in-memory host with one
//! orchestrator and one payment processor:
//!
//! ```json
//! {
//!   "admin": "ops",
//!   "accounts": { "payer": 1000 },
//!   "steps": [
//!     { "op": "create_accounts", "count": 3 },
//!     { "op": "fund", "account": "vault:0", "amount": 100 },
//!     { "op": "transfer", "vaults": ["vault:0", "vault:1"], "amounts": [50, 50], "to": "treasury" }
//!   ]
//! }
//! ```
//!
//! Account references are resolved in this order: `orchestrator`,
//! `processor`, `vault:<n>` (the n-th vault created so far), a deployed
//! token name, a `0x` hex identity, and finally any other string as a label.
//!
//! A step the host reverts is part of the report, not an error. A step that
//! cannot be executed at all (unknown vault index, unknown token, malformed
//! call data) aborts the run.

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use custody_contracts::{
    BatchOrchestrator, BatchOutcome, BatchPaymentProcessor, CustodyError, CustodyEvent, Owned,
};
use custody_protocol::abi::FungibleCall;
use custody_protocol::config::HostConfig;
use custody_protocol::tokens::{FungibleToken, NonFungibleToken};
use custody_protocol::{Amount, Host, Identity, Message, Revert, Selector, TokenId};

use crate::metrics::SimMetrics;

fn default_admin() -> String {
    "admin".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Label of the orchestrator's first owner. Also mints every token the
    /// scenario deploys.
    #[serde(default = "default_admin")]
    pub admin: String,
    #[serde(default)]
    pub host: HostConfig,
    /// Native balances credited before the first step.
    #[serde(default)]
    pub accounts: BTreeMap<String, Amount>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    CreateAccounts {
        count: usize,
    },
    Fund {
        account: String,
        amount: Amount,
    },
    DeployFungible {
        name: String,
        symbol: String,
    },
    DeployNonFungible {
        name: String,
    },
    Mint {
        token: String,
        to: String,
        amount: Amount,
    },
    MintNonFungible {
        token: String,
        to: String,
        token_id: TokenId,
    },
    Approve {
        token: String,
        owner: String,
        spender: String,
        amount: Amount,
    },
    Transfer {
        vaults: Vec<String>,
        amounts: Vec<Amount>,
        to: String,
    },
    TransferFungible {
        vaults: Vec<String>,
        token: String,
        amounts: Vec<Amount>,
        to: String,
    },
    TransferNonFungible {
        vaults: Vec<String>,
        token: String,
        token_ids: Vec<TokenId>,
        to: String,
    },
    CallAny {
        vaults: Vec<String>,
        target: String,
        /// Function signature, e.g. `"deposit(uint256)"`.
        signature: String,
        /// Hex-encoded call data.
        #[serde(default)]
        data: String,
        #[serde(default)]
        amount: Amount,
    },
    PayEqualNative {
        payer: String,
        recipients: Vec<String>,
        amount: Amount,
        /// Attached value. Defaults to the exact total.
        #[serde(default)]
        value: Option<Amount>,
    },
    PayVariableNative {
        payer: String,
        recipients: Vec<String>,
        amounts: Vec<Amount>,
        #[serde(default)]
        value: Option<Amount>,
    },
    PayEqualFungible {
        payer: String,
        token: String,
        recipients: Vec<String>,
        amount: Amount,
    },
    PayVariableFungible {
        payer: String,
        token: String,
        recipients: Vec<String>,
        amounts: Vec<Amount>,
    },
    /// Nominates `new_owner` for the orchestrator. `caller` defaults to the
    /// current owner.
    TransferOwnership {
        #[serde(default)]
        caller: Option<String>,
        new_owner: String,
    },
    AcceptOwnership {
        caller: String,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::CreateAccounts { .. } => "create_accounts",
            Step::Fund { .. } => "fund",
            Step::DeployFungible { .. } => "deploy_fungible",
            Step::DeployNonFungible { .. } => "deploy_non_fungible",
            Step::Mint { .. } => "mint",
            Step::MintNonFungible { .. } => "mint_non_fungible",
            Step::Approve { .. } => "approve",
            Step::Transfer { .. } => "transfer",
            Step::TransferFungible { .. } => "transfer_fungible",
            Step::TransferNonFungible { .. } => "transfer_non_fungible",
            Step::CallAny { .. } => "call_any",
            Step::PayEqualNative { .. } => "pay_equal_native",
            Step::PayVariableNative { .. } => "pay_variable_native",
            Step::PayEqualFungible { .. } => "pay_equal_fungible",
            Step::PayVariableFungible { .. } => "pay_variable_fungible",
            Step::TransferOwnership { .. } => "transfer_ownership",
            Step::AcceptOwnership { .. } => "accept_ownership",
        }
    }
}

/// What a step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Done,
    Created { accounts: Vec<Identity> },
    Deployed { address: Identity },
    Batch { outcome: BatchOutcome },
    Reverted { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    #[serde(flatten)]
    pub result: StepResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultReport {
    pub address: Identity,
    pub balance: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub orchestrator: Identity,
    pub processor: Identity,
    pub owner: Identity,
    pub steps: Vec<StepReport>,
    pub vaults: Vec<VaultReport>,
    pub events: Vec<CustodyEvent>,
}

impl RunReport {
    pub fn reverted_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.result, StepResult::Reverted { .. }))
            .count()
    }
}

impl Scenario {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    /// Three vaults, only the first funded, asked for 50 each; then a
    /// three-way native payment.
    pub fn demo() -> Self {
        let labels = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        Self {
            admin: default_admin(),
            host: HostConfig::default(),
            accounts: BTreeMap::from([("payer".to_string(), 1_000)]),
            steps: vec![
                Step::CreateAccounts { count: 3 },
                Step::Fund {
                    account: "vault:0".into(),
                    amount: 100,
                },
                Step::Transfer {
                    vaults: labels(&["vault:0", "vault:1", "vault:2"]),
                    amounts: vec![50, 50, 50],
                    to: "treasury".into(),
                },
                Step::PayEqualNative {
                    payer: "payer".into(),
                    recipients: labels(&["alice", "bob", "carol"]),
                    amount: 10,
                    value: None,
                },
            ],
        }
    }

    /// Executes every step on a fresh host.
    pub fn run(&self) -> Result<(RunReport, SimMetrics)> {
        let mut runner = Runner::new(self)?;
        let mut steps = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let result = runner
                .execute(step)
                .with_context(|| format!("step {index} ({})", step.name()))?;
            match &result {
                StepResult::Reverted { reason } => {
                    tracing::warn!(index, op = step.name(), %reason, "step reverted")
                }
                _ => tracing::info!(index, op = step.name(), "step committed"),
            }
            steps.push(StepReport {
                index,
                op: step.name(),
                result,
            });
        }
        Ok((runner.report(steps), runner.metrics))
    }
}

struct Runner {
    host: Host,
    admin: Identity,
    orchestrator: Arc<BatchOrchestrator>,
    processor: Arc<BatchPaymentProcessor>,
    fungibles: HashMap<String, Arc<FungibleToken>>,
    non_fungibles: HashMap<String, Arc<NonFungibleToken>>,
    metrics: SimMetrics,
}

impl Runner {
    fn new(scenario: &Scenario) -> Result<Self> {
        let host = Host::with_config(scenario.host);
        let admin = Identity::from_label(&scenario.admin);
        let orchestrator = host
            .deploy::<_, Revert, _>(admin, |address| Ok(BatchOrchestrator::new(address, admin)))
            .context("failed to deploy orchestrator")?;
        let processor = host
            .deploy::<_, Revert, _>(admin, |address| Ok(BatchPaymentProcessor::new(address)))
            .context("failed to deploy payment processor")?;
        tracing::info!(
            %admin,
            orchestrator = %orchestrator.address(),
            processor = %processor.address(),
            "custody layer deployed"
        );

        let mut runner = Self {
            host,
            admin,
            orchestrator,
            processor,
            fungibles: HashMap::new(),
            non_fungibles: HashMap::new(),
            metrics: SimMetrics::new().context("failed to register metrics")?,
        };
        for (label, amount) in &scenario.accounts {
            let account = runner.resolve(label)?;
            runner
                .host
                .fund(account, *amount)
                .with_context(|| format!("failed to fund {label}"))?;
        }
        Ok(runner)
    }

    fn resolve(&self, reference: &str) -> Result<Identity> {
        match reference {
            "orchestrator" => return Ok(self.orchestrator.address()),
            "processor" => return Ok(self.processor.address()),
            _ => {}
        }
        if let Some(index) = reference.strip_prefix("vault:") {
            let index: usize = index
                .parse()
                .with_context(|| format!("bad vault reference {reference}"))?;
            return self
                .orchestrator
                .vaults()
                .get(index)
                .copied()
                .ok_or_else(|| anyhow!("{reference} has not been created"));
        }
        if let Some(token) = self.fungibles.get(reference) {
            return Ok(token.address());
        }
        if let Some(token) = self.non_fungibles.get(reference) {
            return Ok(token.address());
        }
        if reference.starts_with("0x") {
            return reference
                .parse()
                .with_context(|| format!("bad identity {reference}"));
        }
        Ok(Identity::from_label(reference))
    }

    fn resolve_all(&self, references: &[String]) -> Result<Vec<Identity>> {
        references.iter().map(|r| self.resolve(r)).collect()
    }

    fn fungible(&self, name: &str) -> Result<Arc<FungibleToken>> {
        self.fungibles
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("no fungible token named {name}"))
    }

    fn non_fungible(&self, name: &str) -> Result<Arc<NonFungibleToken>> {
        self.non_fungibles
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("no non-fungible token named {name}"))
    }

    /// Records a transaction and turns its failure into a reverted step.
    fn settle<T, E: fmt::Display>(&self, result: Result<T, E>, done: impl FnOnce(T) -> StepResult) -> StepResult {
        self.metrics.record_transaction(result.is_ok());
        match result {
            Ok(value) => done(value),
            Err(err) => StepResult::Reverted {
                reason: err.to_string(),
            },
        }
    }

    fn batch(&self, result: Result<BatchOutcome, CustodyError>) -> StepResult {
        if let Ok(outcome) = &result {
            self.metrics.record_batch(outcome);
        }
        self.settle(result, |outcome| StepResult::Batch { outcome })
    }

    fn execute(&mut self, step: &Step) -> Result<StepResult> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let processor = Arc::clone(&self.processor);
        let operator = orchestrator.owner();

        let result = match step {
            Step::CreateAccounts { count } => {
                let result = self.host.transact(operator, orchestrator.address(), 0, |f| {
                    orchestrator.create_accounts(f, *count)
                });
                self.settle(result, |accounts| StepResult::Created { accounts })
            }
            Step::Fund { account, amount } => {
                let account = self.resolve(account)?;
                match self.host.fund(account, *amount) {
                    Ok(_) => StepResult::Done,
                    Err(fault) => StepResult::Reverted {
                        reason: fault.to_string(),
                    },
                }
            }
            Step::DeployFungible { name, symbol } => {
                if self.fungibles.contains_key(name) || self.non_fungibles.contains_key(name) {
                    bail!("token {name} already deployed");
                }
                let minter = self.admin;
                let token = self
                    .host
                    .deploy::<_, Revert, _>(minter, |address| {
                        Ok(FungibleToken::new(address, minter, name.as_str(), symbol.as_str()))
                    })
                    .context("failed to deploy token")?;
                let address = token.address();
                self.fungibles.insert(name.clone(), token);
                StepResult::Deployed { address }
            }
            Step::DeployNonFungible { name } => {
                if self.fungibles.contains_key(name) || self.non_fungibles.contains_key(name) {
                    bail!("token {name} already deployed");
                }
                let minter = self.admin;
                let token = self
                    .host
                    .deploy::<_, Revert, _>(minter, |address| {
                        Ok(NonFungibleToken::new(address, minter, name.as_str()))
                    })
                    .context("failed to deploy token")?;
                let address = token.address();
                self.non_fungibles.insert(name.clone(), token);
                StepResult::Deployed { address }
            }
            Step::Mint { token, to, amount } => {
                let token = self.fungible(token)?;
                let to = self.resolve(to)?;
                let result = self.host.transact(self.admin, token.address(), 0, |f| {
                    token.mint(f, to, *amount).map_err(Revert::from)
                });
                self.settle(result, |_| StepResult::Done)
            }
            Step::MintNonFungible { token, to, token_id } => {
                let token = self.non_fungible(token)?;
                let to = self.resolve(to)?;
                let result = self.host.transact(self.admin, token.address(), 0, |f| {
                    token.mint(f, to, *token_id).map_err(Revert::from)
                });
                self.settle(result, |_| StepResult::Done)
            }
            Step::Approve {
                token,
                owner,
                spender,
                amount,
            } => {
                let token = self.fungible(token)?;
                let owner = self.resolve(owner)?;
                let spender = self.resolve(spender)?;
                let message = Message::Fungible(FungibleCall::Approve {
                    spender,
                    amount: *amount,
                });
                let result = self.host.invoke(owner, token.address(), 0, &message);
                self.settle(result, |_| StepResult::Done)
            }
            Step::Transfer { vaults, amounts, to } => {
                let vaults = self.resolve_all(vaults)?;
                let to = self.resolve(to)?;
                let result = self.host.transact(operator, orchestrator.address(), 0, |f| {
                    orchestrator.transfer(f, &vaults, amounts, to)
                });
                self.batch(result)
            }
            Step::TransferFungible {
                vaults,
                token,
                amounts,
                to,
            } => {
                let vaults = self.resolve_all(vaults)?;
                let token = self.resolve(token)?;
                let to = self.resolve(to)?;
                let result = self.host.transact(operator, orchestrator.address(), 0, |f| {
                    orchestrator.transfer_fungible(f, &vaults, token, amounts, to)
                });
                self.batch(result)
            }
            Step::TransferNonFungible {
                vaults,
                token,
                token_ids,
                to,
            } => {
                let vaults = self.resolve_all(vaults)?;
                let token = self.resolve(token)?;
                let to = self.resolve(to)?;
                let result = self.host.transact(operator, orchestrator.address(), 0, |f| {
                    orchestrator.transfer_non_fungible(f, &vaults, token, token_ids, to)
                });
                self.batch(result)
            }
            Step::CallAny {
                vaults,
                target,
                signature,
                data,
                amount,
            } => {
                let vaults = self.resolve_all(vaults)?;
                let target = self.resolve(target)?;
                let selector = Selector::from_signature(signature);
                let data = hex::decode(data.trim_start_matches("0x"))
                    .with_context(|| format!("call data {data} is not hex"))?;
                let result = self.host.transact(operator, orchestrator.address(), 0, |f| {
                    orchestrator.call_any(f, &vaults, target, selector, Bytes::from(data), *amount)
                });
                self.batch(result)
            }
            Step::PayEqualNative {
                payer,
                recipients,
                amount,
                value,
            } => {
                let payer = self.resolve(payer)?;
                let recipients = self.resolve_all(recipients)?;
                let value = match value {
                    Some(value) => *value,
                    None => Amount::try_from(recipients.len())
                        .ok()
                        .and_then(|n| n.checked_mul(*amount))
                        .context("payment total overflows")?,
                };
                let result = self.host.transact(payer, processor.address(), value, |f| {
                    processor.pay_equal_native(f, &recipients, *amount)
                });
                self.batch(result)
            }
            Step::PayVariableNative {
                payer,
                recipients,
                amounts,
                value,
            } => {
                let payer = self.resolve(payer)?;
                let recipients = self.resolve_all(recipients)?;
                let value = match value {
                    Some(value) => *value,
                    None => amounts
                        .iter()
                        .try_fold(0 as Amount, |sum, a| sum.checked_add(*a))
                        .context("payment total overflows")?,
                };
                let result = self.host.transact(payer, processor.address(), value, |f| {
                    processor.pay_variable_native(f, &recipients, amounts)
                });
                self.batch(result)
            }
            Step::PayEqualFungible {
                payer,
                token,
                recipients,
                amount,
            } => {
                let payer = self.resolve(payer)?;
                let token = self.resolve(token)?;
                let recipients = self.resolve_all(recipients)?;
                let result = self.host.transact(payer, processor.address(), 0, |f| {
                    processor.pay_equal_fungible(f, token, &recipients, *amount)
                });
                self.batch(result)
            }
            Step::PayVariableFungible {
                payer,
                token,
                recipients,
                amounts,
            } => {
                let payer = self.resolve(payer)?;
                let token = self.resolve(token)?;
                let recipients = self.resolve_all(recipients)?;
                let result = self.host.transact(payer, processor.address(), 0, |f| {
                    processor.pay_variable_fungible(f, token, &recipients, amounts)
                });
                self.batch(result)
            }
            Step::TransferOwnership { caller, new_owner } => {
                let caller = match caller {
                    Some(caller) => self.resolve(caller)?,
                    None => operator,
                };
                let new_owner = self.resolve(new_owner)?;
                let result = self.host.transact(caller, orchestrator.address(), 0, |f| {
                    orchestrator.transfer_ownership(f, new_owner)
                });
                self.settle(result, |_| StepResult::Done)
            }
            Step::AcceptOwnership { caller } => {
                let caller = self.resolve(caller)?;
                let result = self.host.transact(caller, orchestrator.address(), 0, |f| {
                    orchestrator.accept_ownership(f)
                });
                self.settle(result, |_| StepResult::Done)
            }
        };
        Ok(result)
    }

    fn report(&self, steps: Vec<StepReport>) -> RunReport {
        let vaults = self
            .orchestrator
            .vaults()
            .into_iter()
            .map(|address| VaultReport {
                address,
                balance: self.host.balance_of(&address),
            })
            .collect();
        RunReport {
            orchestrator: self.orchestrator.address(),
            processor: self.processor.address(),
            owner: self.orchestrator.owner(),
            steps,
            vaults,
            events: self
                .host
                .logs()
                .iter()
                .filter_map(CustodyEvent::from_log)
                .collect(),
        }
    }
}
