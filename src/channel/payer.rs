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

use bitcoin::{Address, PublicKey, Script, Transaction};
use mpc_onchain::{unspent, ResolveHistory};
use mpc_scripts::{compile_commit_script, BlockDelay, DepositScript, SecretHash};
use serde_with::As;

use super::{
    check_asset, check_quantity, script_utxos, ChannelState, Commit, CommitLog, Deposit, Payout,
    PayoutPath,
};
use crate::{Error, TxBuilder, TxHex};

/// Parameters of a new channel deposit
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DepositParams {
    /// Asset to lock; only `BTC` is supported
    pub asset: String,
    /// Payer key, also owning the P2PKH outputs funding the deposit
    pub payer_pubkey: PublicKey,
    /// Payee key
    pub payee_pubkey: PublicKey,
    /// Hash of the payee spend secret
    pub spend_secret_hash: SecretHash,
    /// Deposit expiration, in blocks
    pub expire_time: BlockDelay,
    /// Channel quantity, in satoshis
    pub quantity: u64,
}

/// Channel state kept by the payer
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PayerState {
    /// Channel deposit
    pub deposit: Deposit,
    /// Commits created by the payer
    #[serde(flatten)]
    pub commits: CommitLog,
}

/// New payer state together with the unsigned deposit transaction, which
/// must be signed and published by the payer
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DepositProposal {
    /// Payer state of the new channel
    pub state: PayerState,
    /// Unsigned deposit funding transaction
    #[serde(with = "As::<TxHex>")]
    pub topublish: Transaction,
}

/// Unsigned commit transaction and the redeem script of the deposit output
/// it spends
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CommitToSign {
    /// Unsigned commit transaction
    #[serde(with = "As::<TxHex>")]
    pub commit_rawtx: Transaction,
    /// Redeem script of the spent deposit output
    pub deposit_script: Script,
}

/// New payer state together with the commit to be signed by the payer and
/// handed to the payee
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CommitProposal {
    /// Payer state with the new commit recorded
    pub state: PayerState,
    /// Redeem script of the commit output
    pub commit_script: Script,
    /// Commit transaction to be signed by the payer
    pub tosign: CommitToSign,
}

impl ChannelState for PayerState {
    #[inline]
    fn deposit(&self) -> &Deposit { &self.deposit }

    #[inline]
    fn commits(&self) -> &CommitLog { &self.commits }

    #[inline]
    fn commits_mut(&mut self) -> &mut CommitLog { &mut self.commits }
}

impl PayerState {
    /// Opens new channel: compiles deposit script and constructs unsigned
    /// transaction funding the deposit from unspent outputs of the payer
    /// P2PKH address.
    pub fn make_deposit(
        builder: &TxBuilder,
        chain: &impl ResolveHistory,
        params: DepositParams,
    ) -> Result<DepositProposal, Error> {
        check_quantity(params.quantity)?;
        check_asset(&params.asset)?;
        let value = builder.deposit_value(params.quantity)?;

        let template = DepositScript {
            payer_pubkey: params.payer_pubkey,
            payee_pubkey: params.payee_pubkey,
            spend_secret_hash: params.spend_secret_hash,
            expire_time: params.expire_time,
        };
        let deposit = Deposit::with(
            template,
            builder.network(),
            &params.asset,
            Some(params.quantity),
            Some(value),
        )?;

        let payer_script =
            Address::p2pkh(&params.payer_pubkey, builder.network()).script_pubkey();
        let utxos = unspent(&chain.resolve_history(&payer_script)?, &payer_script);
        debug!("Funding deposit from {} payer outputs", utxos.len());

        let topublish =
            builder.deposit_tx(&utxos, &params.payer_pubkey, &deposit.script, params.quantity)?;
        info!(
            "Deposit of {} sats into {} is created by transaction {}",
            params.quantity,
            deposit.address,
            topublish.txid()
        );

        Ok(DepositProposal {
            state: PayerState {
                deposit,
                commits: CommitLog::default(),
            },
            topublish,
        })
    }

    /// Creates commit transferring cumulative `quantity` to the payee, in
    /// response to the payee request carrying `revoke_secret_hash`.
    ///
    /// The deposit must stay unexpired for longer than the commit delay,
    /// otherwise the payer could reclaim the deposit before the payee is
    /// able to claim the commit.
    pub fn create_commit(
        &self,
        builder: &TxBuilder,
        chain: &impl ResolveHistory,
        quantity: u64,
        revoke_secret_hash: SecretHash,
        delay_time: BlockDelay,
    ) -> Result<CommitProposal, Error> {
        check_quantity(quantity)?;
        if self.commits.is_known(&revoke_secret_hash) {
            return Err(Error::DuplicateRevokeHash(revoke_secret_hash));
        }
        let current = self.transferred_amount();
        if quantity <= current {
            return Err(Error::StaleCommit { quantity, current });
        }
        let deposit_quantity = self.deposit.quantity.unwrap_or_default();
        if quantity > deposit_quantity {
            return Err(Error::QuantityExceedsDeposit {
                quantity,
                deposit: deposit_quantity,
            });
        }

        let script_pubkey = self.deposit.script_pubkey();
        let history = chain.resolve_history(&script_pubkey)?;
        let funding = self
            .deposit
            .funding(&history, self.commits.deposit_outpoint())
            .ok_or(Error::DepositNotFound)?;
        let funding_height = funding.mined.height().ok_or(Error::DepositNotFound)?;
        let deposit_utxo = unspent(&history, &script_pubkey)
            .into_iter()
            .find(|utxo| utxo.outpoint == funding.outpoint)
            .ok_or(Error::DepositNotFound)?;
        let ttl = self.deposit.ttl(funding_height, chain.tip_height()?);
        if ttl == 0 {
            return Err(Error::ExpiredDeposit);
        }
        let delay = delay_time.blocks();
        if ttl <= delay {
            return Err(Error::ExpiringDeposit { ttl, delay });
        }

        let commit_script = compile_commit_script(
            self.deposit.payer_pubkey,
            self.deposit.payee_pubkey,
            self.deposit.spend_secret_hash,
            revoke_secret_hash,
            delay_time,
        );
        let commit_rawtx =
            builder.commit_tx(&deposit_utxo, &self.deposit.script, &commit_script, quantity)?;

        let mut state = self.clone();
        state.commits.commits_active.push(Commit {
            quantity,
            revoke_secret_hash,
            delay_time,
            script: commit_script.clone(),
            rawtx: commit_rawtx.clone(),
        });
        info!("Commit of {} sats is created for channel {}", quantity, self.deposit.address);

        Ok(CommitProposal {
            state,
            commit_script,
            tosign: CommitToSign {
                commit_rawtx,
                deposit_script: self.deposit.script.clone(),
            },
        })
    }

    /// Unsigned transactions recovering funds available to the payer:
    /// outputs of published revoked commits and expired deposit outputs.
    pub fn payouts(
        &self,
        builder: &TxBuilder,
        chain: &impl ResolveHistory,
    ) -> Result<Vec<Payout>, Error> {
        let tip_height = chain.tip_height()?;
        let payer = &self.deposit.payer_pubkey;
        let mut payouts = vec![];

        for revoked in &self.commits.commits_revoked {
            let script = &revoked.commit.script;
            for utxo in script_utxos(chain, script)? {
                warn!(
                    "Revoked commit of {} sats is published; claiming {}",
                    revoked.commit.quantity, utxo.outpoint
                );
                payouts.push(Payout {
                    path: PayoutPath::Revoked,
                    script: script.clone(),
                    rawtx: builder.sweep_tx(&utxo, None, tip_height, payer)?,
                    secret: Some(revoked.revoke_secret),
                });
            }
        }

        let expire_time = self.deposit.expire_time;
        for utxo in script_utxos(chain, &self.deposit.script)? {
            match builder.sweep_tx(&utxo, Some(expire_time), tip_height, payer) {
                Ok(rawtx) => payouts.push(Payout {
                    path: PayoutPath::Expired,
                    script: self.deposit.script.clone(),
                    rawtx,
                    secret: None,
                }),
                Err(Error::NotYetExpired {
                    outpoint,
                    confirmations,
                    required,
                }) => {
                    debug!(
                        "Deposit output {} is not expired yet ({}/{})",
                        outpoint, confirmations, required
                    )
                }
                Err(Error::InsufficientFunds { available, .. }) => {
                    debug!(
                        "Deposit output {} of {} sats is too small to claim",
                        utxo.outpoint, available
                    )
                }
                Err(err) => return Err(err),
            }
        }

        Ok(payouts)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use bitcoin::secp256k1::{SecretKey, SECP256K1};
    use bitcoin::{Amount, Network, PrivateKey};
    use mpc_onchain::MemoryChain;
    use mpc_scripts::Secret;

    use super::*;
    use crate::channel::ASSET_BTC;
    use crate::ErrorCode;

    pub(crate) fn key(n: u8) -> PrivateKey {
        PrivateKey::new(SecretKey::from_slice(&[n; 32]).unwrap(), Network::Testnet)
    }

    pub(crate) fn spend_secret() -> Secret { Secret::from([0x5E; 32]) }

    pub(crate) fn deposit_template() -> DepositScript {
        DepositScript {
            payer_pubkey: key(1).public_key(SECP256K1),
            payee_pubkey: key(2).public_key(SECP256K1),
            spend_secret_hash: spend_secret().hash(),
            expire_time: BlockDelay::with(42).unwrap(),
        }
    }

    pub(crate) fn params(quantity: u64) -> DepositParams {
        let template = deposit_template();
        DepositParams {
            asset: ASSET_BTC.to_owned(),
            payer_pubkey: template.payer_pubkey,
            payee_pubkey: template.payee_pubkey,
            spend_secret_hash: template.spend_secret_hash,
            expire_time: template.expire_time,
            quantity,
        }
    }

    /// Chain where the payer owns a single output of one million sats
    pub(crate) fn funded_chain() -> MemoryChain {
        let mut chain = MemoryChain::new();
        let payer = key(1).public_key(SECP256K1);
        chain.fund(Address::p2pkh(&payer, Network::Testnet).script_pubkey(), 1_000_000);
        chain
    }

    /// Payer state with the deposit of 100 000 sats published on chain
    pub(crate) fn opened_channel(chain: &mut MemoryChain) -> PayerState {
        let builder = TxBuilder::default();
        let proposal = PayerState::make_deposit(&builder, chain, params(100_000)).unwrap();
        // scripts are not executed by the memory chain
        chain.publish(proposal.topublish).unwrap();
        proposal.state
    }

    #[test]
    fn deposit_creation() {
        let builder = TxBuilder::default();
        let chain = funded_chain();
        let proposal = PayerState::make_deposit(&builder, &chain, params(100_000)).unwrap();
        let deposit = &proposal.state.deposit;
        assert_eq!(deposit.quantity, Some(100_000));
        assert_eq!(deposit.asset, ASSET_BTC);
        assert_eq!(deposit.script, deposit_template().to_script());
        assert_eq!(deposit.address.script_pubkey(), deposit.script_pubkey());
        assert_eq!(proposal.topublish.output[0].script_pubkey, deposit.script_pubkey());
        assert_eq!(proposal.topublish.output[0].value, builder.deposit_value(100_000).unwrap());
        assert_eq!(deposit.value, Some(builder.deposit_value(100_000).unwrap()));
        assert_eq!(proposal.state.transferred_amount(), 0);
        assert_eq!(proposal.state.highest_commit(), None);
    }

    #[test]
    fn deposit_errors() {
        let builder = TxBuilder::default();
        let chain = funded_chain();
        assert!(matches!(
            PayerState::make_deposit(&builder, &chain, params(0)),
            Err(Error::ZeroQuantity)
        ));
        let mut xcp = params(10);
        xcp.asset = s!("XCP");
        let err = PayerState::make_deposit(&builder, &chain, xcp).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
        assert!(matches!(
            PayerState::make_deposit(&builder, &chain, params(1_000_000)),
            Err(Error::InsufficientFunds {
                available: 1_000_000,
                ..
            })
        ));
        assert!(matches!(
            PayerState::make_deposit(&builder, &MemoryChain::new(), params(10)),
            Err(Error::InsufficientFunds { available: 0, .. })
        ));
        for quantity in [u64::MAX, Amount::MAX_MONEY.to_sat() + 1] {
            let err = PayerState::make_deposit(&builder, &chain, params(quantity)).unwrap_err();
            assert!(matches!(err, Error::QuantityOutOfRange(q) if q == quantity));
            assert_eq!(err.code(), ErrorCode::InvalidInput);
        }
    }

    #[test]
    fn commit_creation() {
        let builder = TxBuilder::default();
        let mut chain = funded_chain();
        let state = opened_channel(&mut chain);
        let hash = Secret::from([1u8; 32]).hash();
        let delay = BlockDelay::with(2).unwrap();

        let proposal = state.create_commit(&builder, &chain, 17, hash, delay).unwrap();
        assert_eq!(proposal.state.transferred_amount(), 17);
        assert_eq!(state.transferred_amount(), 0);
        assert_eq!(proposal.tosign.deposit_script, state.deposit.script);
        let rawtx = &proposal.tosign.commit_rawtx;
        assert_eq!(rawtx.output[0].script_pubkey, proposal.commit_script.to_p2sh());
        assert_eq!(rawtx.output[0].value, 17 + builder.fee().channel_fee());

        let commit = proposal.state.highest_commit().unwrap();
        assert_eq!(commit.revoke_secret_hash, hash);
        assert_eq!(commit.script, proposal.commit_script);
    }

    #[test]
    fn commit_errors() {
        let builder = TxBuilder::default();
        let delay = BlockDelay::with(2).unwrap();
        let hash = |n: u8| Secret::from([n; 32]).hash();

        let mut chain = funded_chain();
        let proposal = PayerState::make_deposit(&builder, &chain, params(100_000)).unwrap();
        assert!(matches!(
            proposal.state.create_commit(&builder, &chain, 5, hash(1), delay),
            Err(Error::DepositNotFound)
        ));
        chain.mempool(proposal.topublish).unwrap();
        assert!(matches!(
            proposal.state.create_commit(&builder, &chain, 5, hash(1), delay),
            Err(Error::DepositNotFound)
        ));
        chain.mine_block();

        let state = proposal.state.create_commit(&builder, &chain, 5, hash(1), delay).unwrap().state;
        assert!(matches!(
            state.create_commit(&builder, &chain, 5, hash(2), delay),
            Err(Error::StaleCommit {
                quantity: 5,
                current: 5
            })
        ));
        assert!(matches!(
            state.create_commit(&builder, &chain, 7, hash(1), delay),
            Err(Error::DuplicateRevokeHash(_))
        ));
        assert!(matches!(
            state.create_commit(&builder, &chain, 0, hash(2), delay),
            Err(Error::ZeroQuantity)
        ));
        let err = state.create_commit(&builder, &chain, 100_001, hash(2), delay).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantity);
        let err = state.create_commit(&builder, &chain, u64::MAX, hash(2), delay).unwrap_err();
        assert!(matches!(err, Error::QuantityOutOfRange(u64::MAX)));
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        // ttl 3 leaves a two-block commit claimable before the deposit expires
        chain.mine_blocks(39);
        assert_eq!(state.deposit_ttl(&chain).unwrap(), Some(3));
        assert!(state.create_commit(&builder, &chain, 7, hash(2), delay).is_ok());
        assert!(matches!(
            state.create_commit(&builder, &chain, 7, hash(2), BlockDelay::with(3).unwrap()),
            Err(Error::ExpiringDeposit { ttl: 3, delay: 3 })
        ));
        chain.mine_block();
        let err = state.create_commit(&builder, &chain, 7, hash(2), delay).unwrap_err();
        assert!(matches!(err, Error::ExpiringDeposit { ttl: 2, delay: 2 }));
        assert_eq!(err.code(), ErrorCode::ExpiredDeposit);
        chain.mine_block();
        assert!(matches!(
            state.create_commit(&builder, &chain, 7, hash(2), delay),
            Err(Error::ExpiringDeposit { ttl: 1, delay: 2 })
        ));
        chain.mine_block();
        assert!(matches!(
            state.create_commit(&builder, &chain, 7, hash(2), delay),
            Err(Error::ExpiredDeposit)
        ));
    }

    #[test]
    fn third_party_deposit_payment_is_ignored() {
        let builder = TxBuilder::default();
        let mut chain = funded_chain();
        let proposal = PayerState::make_deposit(&builder, &chain, params(100_000)).unwrap();
        let state = proposal.state;
        let deposit_value = builder.deposit_value(100_000).unwrap();

        // someone pays a small amount to the deposit address before funding
        chain.fund(state.deposit.script_pubkey(), 600);
        assert_eq!(state.deposit_ttl(&chain).unwrap(), None);
        chain.publish(proposal.topublish).unwrap();
        assert_eq!(state.deposit_ttl(&chain).unwrap(), Some(42));
        chain.mine_block();
        assert_eq!(state.deposit_ttl(&chain).unwrap(), Some(41));

        let hash = Secret::from([1u8; 32]).hash();
        let delay = BlockDelay::with(2).unwrap();
        let proposal = state.create_commit(&builder, &chain, 17, hash, delay).unwrap();
        let rawtx = &proposal.tosign.commit_rawtx;
        let funding = state
            .deposit
            .funding(&chain.resolve_history(&state.deposit.script_pubkey()).unwrap(), None)
            .unwrap();
        assert_eq!(funding.value, deposit_value);
        assert_eq!(rawtx.input[0].previous_output, funding.outpoint);
        assert_eq!(
            rawtx.output.iter().map(|txout| txout.value).sum::<u64>(),
            deposit_value - builder.fee().channel_fee()
        );
        assert_eq!(proposal.state.commits.deposit_outpoint(), Some(funding.outpoint));
        assert_eq!(proposal.state.deposit_ttl(&chain).unwrap(), Some(41));

        // the small output can not be claimed and is skipped
        chain.mine_blocks(40);
        let payouts = state.payouts(&builder, &chain).unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].rawtx.input[0].previous_output, funding.outpoint);
        assert_eq!(payouts[0].rawtx.output[0].value, deposit_value - builder.fee().channel_fee());
    }

    #[test]
    fn deposit_ttl_and_expiry() {
        let builder = TxBuilder::default();
        let mut chain = funded_chain();
        let proposal = PayerState::make_deposit(&builder, &chain, params(100_000)).unwrap();
        let state = proposal.state;
        assert_eq!(state.deposit_ttl(&chain).unwrap(), None);
        chain.publish(proposal.topublish).unwrap();
        assert_eq!(state.deposit_ttl(&chain).unwrap(), Some(42));
        chain.mine_block();
        assert_eq!(state.deposit_ttl(&chain).unwrap(), Some(41));
        assert!(state.payouts(&builder, &chain).unwrap().is_empty());

        chain.mine_blocks(39);
        assert_eq!(state.deposit_ttl(&chain).unwrap(), Some(2));
        assert!(state.payouts(&builder, &chain).unwrap().is_empty());

        // 42 confirmations: refund can be mined in the next block
        chain.mine_block();
        assert_eq!(state.deposit_ttl(&chain).unwrap(), Some(1));
        let payouts = state.payouts(&builder, &chain).unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].path, PayoutPath::Expired);
        assert_eq!(payouts[0].script, state.deposit.script);
        assert_eq!(payouts[0].rawtx.input[0].sequence, state.deposit.expire_time.to_sequence());
        assert_eq!(payouts[0].secret, None);
        chain.mine_blocks(2);
        assert_eq!(state.deposit_ttl(&chain).unwrap(), Some(0));
        assert_eq!(state.payouts(&builder, &chain).unwrap().len(), 1);
    }
}
