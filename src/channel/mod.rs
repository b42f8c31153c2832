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

//! Channel state of both parties and the operations moving it forward.
//!
//! States are plain serializable values. Every operation takes the current
//! state by reference and returns an updated copy, so a failed operation
//! never leaves a half-updated state behind.

pub(crate) mod payee;
pub(crate) mod payer;

use std::collections::BTreeSet;

use bitcoin::{Address, Amount, Network, OutPoint, PublicKey, Script, Transaction};
use mpc_onchain::{unspent, ResolveHistory, TxRecord, Utxo};
use mpc_scripts::{BlockDelay, DepositScript, Secret, SecretHash};
pub use payee::{CommitRequest, PayeeState};
pub use payer::{CommitProposal, CommitToSign, DepositParams, DepositProposal, PayerState};
use serde_with::As;

use crate::{Error, TxHex};

/// The only asset supported by channels
pub const ASSET_BTC: &str = "BTC";

pub(crate) fn check_asset(asset: &str) -> Result<(), Error> {
    if asset != ASSET_BTC {
        return Err(Error::UnsupportedAsset(asset.to_owned()));
    }
    Ok(())
}

pub(crate) fn check_quantity(quantity: u64) -> Result<(), Error> {
    if quantity == 0 {
        return Err(Error::ZeroQuantity);
    }
    if quantity > Amount::MAX_MONEY.to_sat() {
        return Err(Error::QuantityOutOfRange(quantity));
    }
    Ok(())
}

/// Channel deposit: funds locked by the payer under the deposit script
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Deposit {
    /// Key of the party funding the channel
    pub payer_pubkey: PublicKey,
    /// Key of the party receiving payments
    pub payee_pubkey: PublicKey,
    /// Hash of the payee secret which unlocks the cooperative branches
    pub spend_secret_hash: SecretHash,
    /// Confirmations after which the payer may reclaim the deposit
    pub expire_time: BlockDelay,
    /// Deposit redeem script
    pub script: Script,
    /// P2SH address of the deposit script
    pub address: Address,
    /// Asset locked in the channel
    pub asset: String,
    /// Channel quantity; known to the payer only
    pub quantity: Option<u64>,
    /// Value of the funding output; known to the payer only
    #[serde(default)]
    pub value: Option<u64>,
}

impl Deposit {
    pub(crate) fn with(
        template: DepositScript,
        network: Network,
        asset: &str,
        quantity: Option<u64>,
        value: Option<u64>,
    ) -> Result<Deposit, Error> {
        let script = template.to_script();
        Ok(Deposit {
            payer_pubkey: template.payer_pubkey,
            payee_pubkey: template.payee_pubkey,
            spend_secret_hash: template.spend_secret_hash,
            expire_time: template.expire_time,
            address: mpc_scripts::script_to_address(&script, network)?,
            script,
            asset: asset.to_owned(),
            quantity,
            value,
        })
    }

    /// P2SH script pubkey of the deposit output
    #[inline]
    pub fn script_pubkey(&self) -> Script { self.script.to_p2sh() }

    /// Locates the output funding the deposit within the deposit script
    /// history.
    ///
    /// Candidates are outputs paying to the deposit address from transactions
    /// which do not spend another deposit output, so commit change is never
    /// taken for funding. The `known` outpoint, which is the input of already
    /// signed commits, is preferred. Otherwise the output must match the
    /// funding value when it is known, and the largest candidate is taken
    /// when it is not. Third-party payments to the deposit address are
    /// skipped this way.
    pub fn funding(&self, history: &[TxRecord], known: Option<OutPoint>) -> Option<Utxo> {
        let script_pubkey = self.script_pubkey();
        let deposit_outputs = script_outputs(history, &script_pubkey);
        let candidates = history
            .iter()
            .filter(|record| {
                !record
                    .tx
                    .input
                    .iter()
                    .any(|txin| deposit_outputs.contains(&txin.previous_output))
            })
            .flat_map(|record| {
                let txid = record.tx.txid();
                record
                    .tx
                    .output
                    .iter()
                    .enumerate()
                    .filter(|(_, txout)| txout.script_pubkey == script_pubkey)
                    .map(move |(vout, txout)| Utxo {
                        mined: record.status,
                        outpoint: OutPoint::new(txid, vout as u32),
                        value: txout.value,
                    })
            })
            .collect::<Vec<_>>();

        match (known, self.value) {
            (Some(outpoint), _) => {
                candidates.into_iter().find(|utxo| utxo.outpoint == outpoint)
            }
            (None, Some(value)) => candidates.into_iter().find(|utxo| utxo.value == value),
            // first of the largest candidates
            (None, None) => candidates.into_iter().rev().max_by_key(|utxo| utxo.value),
        }
    }

    /// Blocks remaining until the deposit expires, given the height of the
    /// block which mined the funding transaction
    pub fn ttl(&self, funding_height: u64, tip_height: u64) -> u16 {
        let elapsed = tip_height.saturating_sub(funding_height);
        (self.expire_time.blocks() as u64).saturating_sub(elapsed) as u16
    }
}

fn script_outputs(history: &[TxRecord], script_pubkey: &Script) -> BTreeSet<OutPoint> {
    history
        .iter()
        .flat_map(|record| {
            let txid = record.tx.txid();
            record
                .tx
                .output
                .iter()
                .enumerate()
                .filter(|(_, txout)| txout.script_pubkey == *script_pubkey)
                .map(move |(vout, _)| OutPoint::new(txid, vout as u32))
        })
        .collect()
}

/// Commit transferring cumulative quantity to the payee
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Commit {
    /// Cumulative quantity transferred to the payee
    pub quantity: u64,
    /// Hash of the payee revoke secret
    pub revoke_secret_hash: SecretHash,
    /// Blocks the payee waits before claiming the published commit
    pub delay_time: BlockDelay,
    /// Commit redeem script
    pub script: Script,
    /// Commit transaction; signed by the payer in payee states
    #[serde(with = "As::<TxHex>")]
    pub rawtx: Transaction,
}

impl Commit {
    /// P2SH script pubkey of the commit output
    #[inline]
    pub fn script_pubkey(&self) -> Script { self.script.to_p2sh() }
}

/// Commit voided by the payee revealing its revoke secret
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RevokedCommit {
    /// Revoked commit
    #[serde(flatten)]
    pub commit: Commit,
    /// Secret revealed by the payee
    pub revoke_secret: Secret,
}

/// Commits known to a channel party
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CommitLog {
    /// Commits in force
    pub commits_active: Vec<Commit>,
    /// Commits voided by revealed secrets
    pub commits_revoked: Vec<RevokedCommit>,
}

impl CommitLog {
    /// Active commit with the highest quantity
    pub fn highest(&self) -> Option<&Commit> {
        self.commits_active.iter().max_by_key(|commit| commit.quantity)
    }

    /// Quantity of the highest active commit, or zero
    #[inline]
    pub fn transferred_amount(&self) -> u64 {
        self.highest().map(|commit| commit.quantity).unwrap_or_default()
    }

    /// Checks whether a commit locked by the hash is revoked
    pub fn is_revoked(&self, revoke_secret_hash: &SecretHash) -> bool {
        self.commits_revoked
            .iter()
            .any(|revoked| revoked.commit.revoke_secret_hash == *revoke_secret_hash)
    }

    /// Checks whether the hash locks any active or revoked commit
    pub fn is_known(&self, revoke_secret_hash: &SecretHash) -> bool {
        self.is_revoked(revoke_secret_hash)
            || self
                .commits_active
                .iter()
                .any(|commit| commit.revoke_secret_hash == *revoke_secret_hash)
    }

    /// Moves active commit locked by the secret into the revoked list.
    /// Returns `false` if no active commit matches the secret.
    pub fn revoke(&mut self, secret: Secret) -> bool {
        let hash = secret.hash();
        match self
            .commits_active
            .iter()
            .position(|commit| commit.revoke_secret_hash == hash)
        {
            Some(index) => {
                let commit = self.commits_active.remove(index);
                self.commits_revoked.push(RevokedCommit {
                    commit,
                    revoke_secret: secret,
                });
                true
            }
            None => false,
        }
    }

    /// Revoke hashes of the commits which must be revoked to bring the
    /// transferred amount down to `quantity`.
    ///
    /// Commits are walked from the highest one down. A commit is selected
    /// while its quantity is above `quantity`. Unless `surpass` is set, the
    /// walk stops before a revocation which would leave the transferred
    /// amount below `quantity`.
    pub fn revoke_hashes_until(&self, quantity: u64, surpass: bool) -> BTreeSet<SecretHash> {
        let mut commits = self.commits_active.iter().collect::<Vec<_>>();
        commits.sort_by(|a, b| b.quantity.cmp(&a.quantity));

        let mut hashes = bset! {};
        for (index, commit) in commits.iter().enumerate() {
            if commit.quantity <= quantity {
                break;
            }
            let remaining = commits.get(index + 1).map(|next| next.quantity).unwrap_or_default();
            if !surpass && remaining < quantity {
                break;
            }
            hashes.insert(commit.revoke_secret_hash);
        }
        hashes
    }

    /// Deposit output spent by the known commits
    pub fn deposit_outpoint(&self) -> Option<OutPoint> {
        self.commits()
            .find_map(|commit| commit.rawtx.input.first())
            .map(|txin| txin.previous_output)
    }

    fn commits(&self) -> impl Iterator<Item = &Commit> {
        self.commits_active
            .iter()
            .chain(self.commits_revoked.iter().map(|revoked| &revoked.commit))
    }

    fn scripts(&self) -> impl Iterator<Item = &Script> {
        self.commits().map(|commit| &commit.script)
    }
}

/// Spending path used by a payout transaction
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate", rename_all = "snake_case")]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum PayoutPath {
    /// Payee claims matured commit output
    #[display("delayed")]
    Delayed,

    /// Payer claims output of a published revoked commit
    #[display("revoked")]
    Revoked,

    /// Payer reclaims expired deposit output
    #[display("expired")]
    Expired,
}

/// Unsigned transaction claiming a channel output, with the data required
/// to sign it
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Payout {
    /// Spending path of the payout
    pub path: PayoutPath,
    /// Redeem script of the spent output
    #[serde(rename = "commit_script")]
    pub script: Script,
    /// Unsigned payout transaction
    #[serde(rename = "payout_rawtx", with = "As::<TxHex>")]
    pub rawtx: Transaction,
    /// Revoke secret for [`PayoutPath::Revoked`] payouts
    pub secret: Option<Secret>,
}

/// Operations common to both parties of a channel
pub trait ChannelState: Clone {
    /// Channel deposit
    fn deposit(&self) -> &Deposit;

    /// Commits known to the party
    fn commits(&self) -> &CommitLog;

    #[doc(hidden)]
    fn commits_mut(&mut self) -> &mut CommitLog;

    /// Invoked for each revoke hash whose commit was revoked
    #[doc(hidden)]
    fn did_revoke(&mut self, _revoke_secret_hash: SecretHash) {}

    /// Commit with the highest quantity, if any
    #[inline]
    fn highest_commit(&self) -> Option<&Commit> { self.commits().highest() }

    /// Quantity transferred to the payee by the highest commit, or zero
    #[inline]
    fn transferred_amount(&self) -> u64 { self.commits().transferred_amount() }

    /// See [`CommitLog::revoke_hashes_until`]
    #[inline]
    fn revoke_hashes_until(&self, quantity: u64, surpass: bool) -> BTreeSet<SecretHash> {
        self.commits().revoke_hashes_until(quantity, surpass)
    }

    /// Revokes commits matching the provided secrets. Secrets which do not
    /// match any active commit are ignored, so the operation is idempotent.
    fn revoke_all(&self, secrets: impl IntoIterator<Item = Secret>) -> Self {
        let mut state = self.clone();
        for secret in secrets {
            let hash = secret.hash();
            if state.commits_mut().revoke(secret) {
                debug!("Commit with revoke secret hash {} is revoked", hash);
                state.did_revoke(hash);
            } else {
                debug!("Ignoring secret for unknown or already revoked commit {}", hash);
            }
        }
        info!(
            "Channel {} has {} sats transferred after revocation",
            self.deposit().address,
            state.transferred_amount()
        );
        state
    }

    /// Blocks remaining before the deposit expires; `None` while the deposit
    /// funding transaction is not mined.
    fn deposit_ttl(&self, chain: &impl ResolveHistory) -> Result<Option<u16>, Error> {
        let deposit = self.deposit();
        let history = chain.resolve_history(&deposit.script_pubkey())?;
        let funding = deposit.funding(&history, self.commits().deposit_outpoint());
        let height = match funding.and_then(|utxo| utxo.mined.height()) {
            Some(height) => height,
            None => return Ok(None),
        };
        Ok(Some(deposit.ttl(height, chain.tip_height()?)))
    }

    /// Mined transactions paying to any known commit script, ordered by
    /// block height.
    fn published_commits(&self, chain: &impl ResolveHistory) -> Result<Vec<Transaction>, Error> {
        let mut published = Vec::<(u64, Transaction)>::new();
        for script in self.commits().scripts() {
            let script_pubkey = script.to_p2sh();
            for record in chain.resolve_history(&script_pubkey)? {
                let height = match record.status.height() {
                    Some(height) => height,
                    None => continue,
                };
                let pays =
                    record.tx.output.iter().any(|txout| txout.script_pubkey == script_pubkey);
                let txid = record.tx.txid();
                if pays && !published.iter().any(|(_, tx)| tx.txid() == txid) {
                    published.push((height, record.tx));
                }
            }
        }
        published.sort_by_key(|(height, _)| *height);
        Ok(published.into_iter().map(|(_, tx)| tx).collect())
    }
}

/// Unspent outputs locked by a redeem script
pub(crate) fn script_utxos(
    chain: &impl ResolveHistory,
    script: &Script,
) -> Result<Vec<Utxo>, Error> {
    let script_pubkey = script.to_p2sh();
    let history = chain.resolve_history(&script_pubkey)?;
    Ok(unspent(&history, &script_pubkey))
}
