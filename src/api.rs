// Micropayment channel library built on bitcoin scripts
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

//! Typed request/response API over channel operations.
//!
//! Requests are JSON objects of the form `{"method": "mpc_...", "params":
//! {...}}`. Channel states travel inside requests and responses, so the API
//! itself keeps no channel data.

use std::collections::BTreeSet;

use bitcoin::{PublicKey, Script, Transaction};
use mpc_onchain::{ResolveHistory, ResolveTx};
use mpc_scripts::{BlockDelay, Secret, SecretHash};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use serde_with::As;

use crate::channel::{
    ChannelState, Commit, CommitLog, CommitProposal, CommitRequest, Deposit, DepositParams,
    DepositProposal, PayeeState, PayerState, Payout,
};
use crate::{Error, TxBuilder, TxHex};

/// Parameters of `mpc_set_deposit`
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SetDepositParams {
    /// Asset locked in the channel
    pub asset: String,
    /// Deposit script received from the payer
    pub deposit_script: Script,
    /// Payee key which the deposit must lock funds for
    pub expected_payee_pubkey: PublicKey,
    /// Hash of the payee spend secret
    pub expected_spend_secret_hash: SecretHash,
}

/// Parameters of `mpc_request_commit`
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RequestCommitParams {
    /// Current payee state
    pub state: PayeeState,
    /// Requested cumulative quantity
    pub quantity: u64,
    /// Hash of a fresh revoke secret
    pub revoke_secret_hash: SecretHash,
}

/// Parameters of `mpc_create_commit`
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CreateCommitParams {
    /// Current payer state
    pub state: PayerState,
    /// Cumulative quantity requested by the payee
    pub quantity: u64,
    /// Revoke secret hash received with the request
    pub revoke_secret_hash: SecretHash,
    /// Blocks the payee has to wait before claiming a published commit
    pub delay_time: BlockDelay,
}

/// Parameters of `mpc_add_commit`
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AddCommitParams {
    /// Current payee state
    pub state: PayeeState,
    /// Commit transaction signed by the payer
    #[serde(with = "As::<TxHex>")]
    pub commit_rawtx: Transaction,
    /// Redeem script of the commit output
    pub commit_script: Script,
}

/// Parameters of `mpc_revoke_hashes_until`
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RevokeUntilParams {
    /// Current state of either party
    pub state: AnyState,
    /// Quantity the transferred amount is brought down to
    pub quantity: u64,
    /// Whether the transferred amount may drop below the quantity
    pub surpass: bool,
}

/// Parameters of `mpc_revoke_all`
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RevokeAllParams {
    /// Current state of either party
    pub state: AnyState,
    /// Revealed revoke secrets
    pub secrets: Vec<Secret>,
}

/// Parameters of requests taking channel state only
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StateParams {
    /// Current state of either party
    pub state: AnyState,
}

/// State of either channel party.
///
/// Payee states are told apart by the `commits_requested` field, which payer
/// states never have.
#[derive(Serialize)]
#[serde(crate = "serde_crate", untagged)]
#[derive(Clone, PartialEq, Eq, Debug, From)]
pub enum AnyState {
    /// State kept by the payee
    #[from]
    Payee(PayeeState),

    /// State kept by the payer
    #[from]
    Payer(PayerState),
}

#[derive(Deserialize)]
#[serde(crate = "serde_crate")]
struct StateRepr {
    deposit: Deposit,
    #[serde(default)]
    commits_requested: Option<Vec<CommitRequest>>,
    #[serde(flatten)]
    commits: CommitLog,
}

impl<'de> Deserialize<'de> for AnyState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let StateRepr {
            deposit,
            commits_requested,
            commits,
        } = StateRepr::deserialize(deserializer)?;
        Ok(match commits_requested {
            Some(commits_requested) => AnyState::Payee(PayeeState {
                deposit,
                commits_requested,
                commits,
            }),
            None => AnyState::Payer(PayerState { deposit, commits }),
        })
    }
}

impl ChannelState for AnyState {
    fn deposit(&self) -> &Deposit {
        match self {
            AnyState::Payee(state) => state.deposit(),
            AnyState::Payer(state) => state.deposit(),
        }
    }

    fn commits(&self) -> &CommitLog {
        match self {
            AnyState::Payee(state) => state.commits(),
            AnyState::Payer(state) => state.commits(),
        }
    }

    fn commits_mut(&mut self) -> &mut CommitLog {
        match self {
            AnyState::Payee(state) => state.commits_mut(),
            AnyState::Payer(state) => state.commits_mut(),
        }
    }

    fn did_revoke(&mut self, revoke_secret_hash: SecretHash) {
        match self {
            AnyState::Payee(state) => state.did_revoke(revoke_secret_hash),
            AnyState::Payer(state) => state.did_revoke(revoke_secret_hash),
        }
    }
}

impl AnyState {
    /// Payouts available to the party owning the state
    pub fn payouts(
        &self,
        builder: &TxBuilder,
        chain: &impl ResolveHistory,
    ) -> Result<Vec<Payout>, Error> {
        match self {
            AnyState::Payee(state) => state.payouts(builder, chain),
            AnyState::Payer(state) => state.payouts(builder, chain),
        }
    }
}

/// Channel API request
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate", tag = "method", content = "params")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Request {
    /// Opens a channel on the payer side
    #[serde(rename = "mpc_make_deposit")]
    MakeDeposit(DepositParams),

    /// Accepts the channel deposit on the payee side
    #[serde(rename = "mpc_set_deposit")]
    SetDeposit(SetDepositParams),

    /// Records a payee request for a new commit
    #[serde(rename = "mpc_request_commit")]
    RequestCommit(RequestCommitParams),

    /// Creates a commit on the payer side
    #[serde(rename = "mpc_create_commit")]
    CreateCommit(CreateCommitParams),

    /// Validates and records a signed commit on the payee side
    #[serde(rename = "mpc_add_commit")]
    AddCommit(AddCommitParams),

    /// Reports quantity transferred by the highest commit
    #[serde(rename = "mpc_transferred_amount")]
    TransferredAmount(StateParams),

    /// Lists revoke hashes bringing the transferred amount down
    #[serde(rename = "mpc_revoke_hashes_until")]
    RevokeHashesUntil(RevokeUntilParams),

    /// Revokes commits with the given secrets
    #[serde(rename = "mpc_revoke_all")]
    RevokeAll(RevokeAllParams),

    /// Reports the highest active commit
    #[serde(rename = "mpc_highest_commit")]
    HighestCommit(StateParams),

    /// Reports blocks left before the deposit expires
    #[serde(rename = "mpc_deposit_ttl")]
    DepositTtl(StateParams),

    /// Lists payout transactions available to the state owner
    #[serde(rename = "mpc_payouts")]
    Payouts(StateParams),

    /// Lists mined commit transactions
    #[serde(rename = "mpc_get_published_commits")]
    GetPublishedCommits(StateParams),
}

/// Channel API response
#[derive(Serialize)]
#[serde(crate = "serde_crate", untagged)]
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Response {
    /// New channel with its deposit transaction
    Deposit(DepositProposal),

    /// New commit with the transaction to sign
    Commit(CommitProposal),

    /// Updated channel state
    State(AnyState),

    /// Transferred quantity
    Quantity(u64),

    /// Revoke secret hashes
    RevokeHashes(BTreeSet<SecretHash>),

    /// Highest active commit, if any
    HighestCommit(Option<Commit>),

    /// Deposit time to live, if the deposit is mined
    Ttl(Option<u16>),

    /// Unsigned payout transactions
    Payouts(Vec<Payout>),

    /// Mined channel transactions
    Transactions(#[serde(with = "As::<Vec<TxHex>>")] Vec<Transaction>),
}

/// API endpoint bound to a transaction builder and a chain data source
#[derive(Clone, Debug)]
pub struct Api<C>
where
    C: ResolveTx + ResolveHistory,
{
    builder: TxBuilder,
    chain: C,
}

impl<C> Api<C>
where
    C: ResolveTx + ResolveHistory,
{
    /// Constructs API endpoint
    pub fn new(builder: TxBuilder, chain: C) -> Self { Api { builder, chain } }

    /// Transaction builder used by the endpoint
    #[inline]
    pub fn builder(&self) -> &TxBuilder { &self.builder }

    /// Chain data source
    #[inline]
    pub fn chain(&self) -> &C { &self.chain }

    /// Mutable access to the chain data source
    #[inline]
    pub fn chain_mut(&mut self) -> &mut C { &mut self.chain }

    /// Executes a request
    pub fn handle(&self, request: Request) -> Result<Response, Error> {
        let builder = &self.builder;
        let chain = &self.chain;
        Ok(match request {
            Request::MakeDeposit(params) => {
                Response::Deposit(PayerState::make_deposit(builder, chain, params)?)
            }
            Request::SetDeposit(params) => Response::State(
                PayeeState::set_deposit(
                    builder.network(),
                    &params.asset,
                    &params.deposit_script,
                    params.expected_payee_pubkey,
                    params.expected_spend_secret_hash,
                )?
                .into(),
            ),
            Request::RequestCommit(RequestCommitParams {
                state,
                quantity,
                revoke_secret_hash,
            }) => Response::State(state.request_commit(quantity, revoke_secret_hash)?.into()),
            Request::CreateCommit(CreateCommitParams {
                state,
                quantity,
                revoke_secret_hash,
                delay_time,
            }) => Response::Commit(state.create_commit(
                builder,
                chain,
                quantity,
                revoke_secret_hash,
                delay_time,
            )?),
            Request::AddCommit(AddCommitParams {
                state,
                commit_rawtx,
                commit_script,
            }) => Response::State(
                state.add_commit(builder, chain, &commit_rawtx, &commit_script)?.into(),
            ),
            Request::TransferredAmount(StateParams { state }) => {
                Response::Quantity(state.transferred_amount())
            }
            Request::RevokeHashesUntil(RevokeUntilParams {
                state,
                quantity,
                surpass,
            }) => Response::RevokeHashes(state.revoke_hashes_until(quantity, surpass)),
            Request::RevokeAll(RevokeAllParams { state, secrets }) => {
                Response::State(state.revoke_all(secrets))
            }
            Request::HighestCommit(StateParams { state }) => {
                Response::HighestCommit(state.highest_commit().cloned())
            }
            Request::DepositTtl(StateParams { state }) => Response::Ttl(state.deposit_ttl(chain)?),
            Request::Payouts(StateParams { state }) => {
                Response::Payouts(state.payouts(builder, chain)?)
            }
            Request::GetPublishedCommits(StateParams { state }) => {
                Response::Transactions(state.published_commits(chain)?)
            }
        })
    }

    /// Parses JSON request and executes it, wrapping the outcome into
    /// either `{"result": ...}` or `{"error": {"code": ..., "message": ...}}`
    pub fn handle_json(&self, request: &str) -> Value {
        let outcome = serde_json::from_str::<Request>(request)
            .map_err(Error::from)
            .and_then(|request| self.handle(request))
            .and_then(|response| serde_json::to_value(response).map_err(Error::from));
        match outcome {
            Ok(result) => json!({ "result": result }),
            Err(err) => {
                warn!("Request failed: {}", err);
                json!({
                    "error": {
                        "code": err.code(),
                        "message": err.to_string(),
                    }
                })
            }
        }
    }
}
