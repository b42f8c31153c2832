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

use bitcoin::{Network, PackedLockTime, PublicKey, Script, Sequence, Transaction};
use mpc_onchain::{ResolveHistory, ResolveTx};
use mpc_scripts::spend::CooperativeSpend;
use mpc_scripts::{CommitScript, DepositScript, SecretHash};

use super::{
    check_asset, check_quantity, script_utxos, ChannelState, Commit, CommitLog, Deposit, Payout,
    PayoutPath,
};
use crate::{sign, Error, RejectReason, TxBuilder};

/// Commit requested by the payee and not yet received from the payer
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CommitRequest {
    /// Requested cumulative quantity
    pub quantity: u64,
    /// Hash of the revoke secret generated by the payee
    pub revoke_secret_hash: SecretHash,
}

/// Channel state kept by the payee
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PayeeState {
    /// Channel deposit
    pub deposit: Deposit,
    /// Pending commit requests
    pub commits_requested: Vec<CommitRequest>,
    /// Commits received from the payer
    #[serde(flatten)]
    pub commits: CommitLog,
}

impl ChannelState for PayeeState {
    #[inline]
    fn deposit(&self) -> &Deposit { &self.deposit }

    #[inline]
    fn commits(&self) -> &CommitLog { &self.commits }

    #[inline]
    fn commits_mut(&mut self) -> &mut CommitLog { &mut self.commits }

    fn did_revoke(&mut self, revoke_secret_hash: SecretHash) {
        self.commits_requested
            .retain(|request| request.revoke_secret_hash != revoke_secret_hash);
    }
}

impl PayeeState {
    /// Accepts deposit script created by the payer, checking that it locks
    /// funds for the payee key and spend secret hash expected by the payee.
    pub fn set_deposit(
        network: Network,
        asset: &str,
        deposit_script: &Script,
        expected_payee_pubkey: PublicKey,
        expected_spend_secret_hash: SecretHash,
    ) -> Result<PayeeState, Error> {
        check_asset(asset)?;
        let template = DepositScript::from_script(deposit_script).map_err(|err| {
            debug!("Deposit script is not recognized: {}", err);
            Error::ScriptMismatch
        })?;
        if template.payee_pubkey != expected_payee_pubkey
            || template.spend_secret_hash != expected_spend_secret_hash
        {
            return Err(Error::ScriptMismatch);
        }

        let deposit = Deposit::with(template, network, asset, None, None)?;
        info!("Channel deposit at {} is accepted", deposit.address);
        Ok(PayeeState {
            deposit,
            commits_requested: vec![],
            commits: CommitLog::default(),
        })
    }

    fn is_known(&self, revoke_secret_hash: &SecretHash) -> bool {
        self.commits.is_known(revoke_secret_hash)
            || self
                .commits_requested
                .iter()
                .any(|request| request.revoke_secret_hash == *revoke_secret_hash)
    }

    /// Records request for a commit of cumulative `quantity`, locked by the
    /// revoke secret hash generated by the payee.
    pub fn request_commit(
        &self,
        quantity: u64,
        revoke_secret_hash: SecretHash,
    ) -> Result<PayeeState, Error> {
        check_quantity(quantity)?;
        let transferred = self.transferred_amount();
        if quantity < transferred {
            return Err(Error::QuantityBelowTransferred {
                requested: quantity,
                transferred,
            });
        }
        if self.is_known(&revoke_secret_hash) {
            return Err(Error::DuplicateRevokeHash(revoke_secret_hash));
        }

        let mut state = self.clone();
        state.commits_requested.push(CommitRequest {
            quantity,
            revoke_secret_hash,
        });
        debug!("Commit of {} sats is requested with revoke hash {}", quantity, revoke_secret_hash);
        Ok(state)
    }

    /// Validates commit signed by the payer against the pending request and
    /// the channel deposit, and records it as the new active commit.
    pub fn add_commit(
        &self,
        builder: &TxBuilder,
        chain: &impl ResolveTx,
        rawtx: &Transaction,
        commit_script: &Script,
    ) -> Result<PayeeState, Error> {
        let template = CommitScript::from_script(commit_script).map_err(RejectReason::Template)?;
        let deposit = &self.deposit;
        if template.payer_pubkey != deposit.payer_pubkey
            || template.payee_pubkey != deposit.payee_pubkey
            || template.spend_secret_hash != deposit.spend_secret_hash
        {
            return Err(RejectReason::ForeignScript.into());
        }

        let revoke_secret_hash = template.revoke_secret_hash;
        if self.commits.is_revoked(&revoke_secret_hash) {
            return Err(RejectReason::RevokedHash(revoke_secret_hash).into());
        }
        let request_index = self
            .commits_requested
            .iter()
            .position(|request| request.revoke_secret_hash == revoke_secret_hash)
            .ok_or(RejectReason::UnrequestedHash(revoke_secret_hash))?;
        let requested = self.commits_requested[request_index].quantity;

        if rawtx.input.len() != 1 {
            return Err(RejectReason::InputCount(rawtx.input.len()).into());
        }
        if rawtx.lock_time != PackedLockTime::ZERO || rawtx.input[0].sequence != Sequence::MAX {
            return Err(RejectReason::TimeLocked.into());
        }
        let script_pubkey = commit_script.to_p2sh();
        let output = rawtx
            .output
            .iter()
            .find(|txout| txout.script_pubkey == script_pubkey)
            .ok_or(RejectReason::MissingOutput)?;
        let fee = builder.fee().channel_fee();
        let quantity = output
            .value
            .checked_sub(fee)
            .ok_or(RejectReason::InsufficientOutput {
                value: output.value,
                fee,
            })?;
        if quantity != requested {
            return Err(RejectReason::QuantityMismatch {
                requested,
                actual: quantity,
            }
            .into());
        }
        let current = self.transferred_amount();
        if quantity <= current {
            return Err(Error::StaleCommit { quantity, current });
        }

        let txin = &rawtx.input[0];
        let spend =
            CooperativeSpend::from_script_sig(&txin.script_sig).map_err(RejectReason::Template)?;
        if spend.deposit_script != deposit.script {
            return Err(RejectReason::ForeignInput.into());
        }
        let prevout = txin.previous_output;
        if matches!(self.commits.deposit_outpoint(), Some(outpoint) if outpoint != prevout) {
            return Err(RejectReason::ForeignInput.into());
        }
        let prev_tx = chain.resolve_tx(prevout.txid)?;
        let input_value = match prev_tx.output.get(prevout.vout as usize) {
            Some(txout) if txout.script_pubkey == deposit.script_pubkey() => txout.value,
            _ => return Err(RejectReason::ForeignInput.into()),
        };
        let required = rawtx
            .output
            .iter()
            .try_fold(0u64, |sum, txout| sum.checked_add(txout.value))
            .and_then(|sum| sum.checked_add(fee))
            .unwrap_or(u64::MAX);
        if input_value < required {
            return Err(RejectReason::InsufficientInput {
                value: input_value,
                required,
            }
            .into());
        }
        let payer_pubkey = &deposit.payer_pubkey;
        if !sign::verify_input(rawtx, 0, &deposit.script, &spend.payer_sig, payer_pubkey)? {
            return Err(RejectReason::InvalidSignature.into());
        }

        let mut state = self.clone();
        state.commits_requested.remove(request_index);
        state.commits.commits_active.push(Commit {
            quantity,
            revoke_secret_hash,
            delay_time: template.delay_time,
            script: commit_script.clone(),
            rawtx: rawtx.clone(),
        });
        info!("Commit of {} sats is accepted for channel {}", quantity, deposit.address);
        Ok(state)
    }

    /// Unsigned transactions claiming published active commits whose delay
    /// has passed.
    pub fn payouts(
        &self,
        builder: &TxBuilder,
        chain: &impl ResolveHistory,
    ) -> Result<Vec<Payout>, Error> {
        let tip_height = chain.tip_height()?;
        let payee = &self.deposit.payee_pubkey;
        let mut payouts = vec![];
        for commit in &self.commits.commits_active {
            for utxo in script_utxos(chain, &commit.script)? {
                match builder.sweep_tx(&utxo, Some(commit.delay_time), tip_height, payee) {
                    Ok(rawtx) => payouts.push(Payout {
                        path: PayoutPath::Delayed,
                        script: commit.script.clone(),
                        rawtx,
                        secret: None,
                    }),
                    Err(Error::NotYetExpired {
                        outpoint,
                        confirmations,
                        required,
                    }) => debug!(
                        "Commit output {} is not mature yet ({}/{})",
                        outpoint, confirmations, required
                    ),
                    Err(Error::InsufficientFunds { available, .. }) => {
                        debug!(
                            "Commit output {} of {} sats is too small to claim",
                            utxo.outpoint, available
                        )
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(payouts)
    }
}
