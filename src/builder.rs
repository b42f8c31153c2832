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

//! Construction of unsigned channel transactions.

use bitcoin::{
    Address, Network, PackedLockTime, PublicKey, Script, Sequence, Transaction, TxIn, TxOut,
    Witness,
};
use mpc_onchain::Utxo;
use mpc_scripts::BlockDelay;

use crate::{Config, Error, FeePolicy};

/// Version enabling relative time locks (BIP-68)
const TX_VERSION: i32 = 2;

/// Builder of unsigned channel transactions for a given network and fee
/// policy.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct TxBuilder {
    config: Config,
}

impl TxBuilder {
    /// Constructs builder using given configuration
    #[inline]
    pub fn with(config: Config) -> TxBuilder { TxBuilder { config } }

    /// Builder configuration
    #[inline]
    pub fn config(&self) -> Config { self.config }

    /// Network of the constructed transactions
    #[inline]
    pub fn network(&self) -> Network { self.config.network }

    /// Fee policy applied to the constructed transactions
    #[inline]
    pub fn fee(&self) -> FeePolicy { self.config.fee }

    /// Value of the deposit output for a channel of `quantity` sats.
    pub fn deposit_value(&self, quantity: u64) -> Result<u64, Error> {
        quantity
            .checked_add(self.fee().deposit_reserve())
            .ok_or(Error::QuantityOutOfRange(quantity))
    }

    /// Constructs transaction funding channel deposit from payer P2PKH
    /// outputs. Returns transaction with deposit output first, followed by
    /// change to the payer address, if the change is above dust limit.
    pub fn deposit_tx(
        &self,
        utxos: &[Utxo],
        payer_pubkey: &PublicKey,
        deposit_script: &Script,
        quantity: u64,
    ) -> Result<Transaction, Error> {
        let fee = self.fee();
        let mut utxos = utxos.to_vec();
        utxos.sort_by_key(|utxo| utxo.outpoint);

        let available = utxos.iter().map(|utxo| utxo.value).sum::<u64>();
        let deposit_value = self.deposit_value(quantity)?;
        let required = deposit_value
            .checked_add(fee.p2pkh_fee(utxos.len(), 1))
            .ok_or(Error::QuantityOutOfRange(quantity))?;
        if utxos.is_empty() || available < required {
            return Err(Error::InsufficientFunds {
                available,
                required,
            });
        }

        let mut output = vec![TxOut {
            value: deposit_value,
            script_pubkey: deposit_script.to_p2sh(),
        }];
        let change = available
            .saturating_sub(deposit_value)
            .saturating_sub(fee.p2pkh_fee(utxos.len(), 2));
        if change >= fee.dust_size {
            output.push(TxOut {
                value: change,
                script_pubkey: Address::p2pkh(payer_pubkey, self.network()).script_pubkey(),
            });
        }

        Ok(Transaction {
            version: TX_VERSION,
            lock_time: PackedLockTime::ZERO,
            input: utxos
                .iter()
                .map(|utxo| unsigned_input(utxo, Sequence::MAX))
                .collect(),
            output,
        })
    }

    /// Constructs commit transaction spending the deposit output. The commit
    /// output carries `quantity` plus the fee for the payout transaction;
    /// the rest, except the channel fee, returns to the deposit address.
    pub fn commit_tx(
        &self,
        deposit_utxo: &Utxo,
        deposit_script: &Script,
        commit_script: &Script,
        quantity: u64,
    ) -> Result<Transaction, Error> {
        let fee = self.fee();
        let commit_value = quantity
            .checked_add(fee.channel_fee())
            .ok_or(Error::QuantityOutOfRange(quantity))?;
        let required = commit_value
            .checked_add(fee.channel_fee())
            .ok_or(Error::QuantityOutOfRange(quantity))?;
        let change = deposit_utxo
            .value
            .checked_sub(required)
            .ok_or(Error::InsufficientFunds {
                available: deposit_utxo.value,
                required,
            })?;

        let mut output = vec![TxOut {
            value: commit_value,
            script_pubkey: commit_script.to_p2sh(),
        }];
        if change >= fee.dust_size {
            output.push(TxOut {
                value: change,
                script_pubkey: deposit_script.to_p2sh(),
            });
        }

        Ok(Transaction {
            version: TX_VERSION,
            lock_time: PackedLockTime::ZERO,
            input: vec![unsigned_input(deposit_utxo, Sequence::MAX)],
            output,
        })
    }

    /// Constructs transaction sweeping a single channel output to the P2PKH
    /// address of `recipient`, minus channel fee.
    ///
    /// If the spending path is time-locked with `lock`, the output must have
    /// enough confirmations at `tip_height`, otherwise
    /// [`Error::NotYetExpired`] is returned.
    pub fn sweep_tx(
        &self,
        utxo: &Utxo,
        lock: Option<BlockDelay>,
        tip_height: u64,
        recipient: &PublicKey,
    ) -> Result<Transaction, Error> {
        let sequence = match lock {
            None => Sequence::MAX,
            Some(delay) => {
                let confirmations = utxo.mined.confirmations(tip_height);
                if !delay.is_mature(confirmations) {
                    return Err(Error::NotYetExpired {
                        outpoint: utxo.outpoint,
                        confirmations,
                        required: delay.blocks(),
                    });
                }
                delay.to_sequence()
            }
        };

        let fee = self.fee().channel_fee();
        let value = utxo
            .value
            .checked_sub(fee)
            .filter(|value| *value > 0)
            .ok_or(Error::InsufficientFunds {
                available: utxo.value,
                required: fee + 1,
            })?;

        Ok(Transaction {
            version: TX_VERSION,
            lock_time: PackedLockTime::ZERO,
            input: vec![unsigned_input(utxo, sequence)],
            output: vec![TxOut {
                value,
                script_pubkey: Address::p2pkh(recipient, self.network()).script_pubkey(),
            }],
        })
    }
}

fn unsigned_input(utxo: &Utxo, sequence: Sequence) -> TxIn {
    TxIn {
        previous_output: utxo.outpoint,
        script_sig: Script::new(),
        sequence,
        witness: Witness::new(),
    }
}
