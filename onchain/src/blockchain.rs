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

//! Blockchain-specific data types used by channel parties

use std::collections::BTreeSet;

use bitcoin::{OutPoint, Script, Transaction};

/// Information about transaction mining status
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum MiningStatus {
    /// Transaction mining status is undefined
    #[display("undefined")]
    Undefined,

    /// Transaction is unknown
    #[display("unknown_tx")]
    UnknownTx,

    /// Transaction is not mined but present in mempool
    #[display("mempool")]
    Mempool,

    /// Transaction is mined onchain at a block with a given height
    #[display(inner)]
    Blockchain(u64),
}

impl Default for MiningStatus {
    #[inline]
    fn default() -> Self { MiningStatus::Undefined }
}

impl MiningStatus {
    /// Height of the block containing the transaction, if it is mined
    #[inline]
    pub fn height(self) -> Option<u64> {
        match self {
            MiningStatus::Blockchain(height) => Some(height),
            _ => None,
        }
    }

    /// Number of confirmations given the current chain tip height. The block
    /// containing the transaction counts as the first confirmation;
    /// unconfirmed transactions have zero confirmations.
    pub fn confirmations(self, tip_height: u64) -> u32 {
        match self {
            MiningStatus::Blockchain(height) if tip_height >= height => {
                (tip_height - height + 1).min(u32::MAX as u64) as u32
            }
            _ => 0,
        }
    }
}

/// Transaction from the history of some script together with its mining
/// status
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TxRecord {
    /// Transaction paying to or spending from the script
    pub tx: Transaction,
    /// Mining status of the transaction
    pub status: MiningStatus,
}

/// Full UTXO information
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display("{value}@{outpoint}")]
pub struct Utxo {
    /// Status of the transaction containing this UTXO
    pub mined: MiningStatus,
    /// UTXO outpoint
    pub outpoint: OutPoint,
    /// Value stored in the UTXO, in satoshis
    pub value: u64,
}

/// Extracts outputs locked by `script_pubkey` which are not spent by any
/// transaction of the same history.
///
/// The history is expected to contain all transactions spending outputs of
/// the script, which holds for histories returned by
/// [`crate::ResolveHistory`].
pub fn unspent(history: &[TxRecord], script_pubkey: &Script) -> Vec<Utxo> {
    let spent = history
        .iter()
        .flat_map(|record| record.tx.input.iter().map(|txin| txin.previous_output))
        .collect::<BTreeSet<_>>();
    let mut utxos = history
        .iter()
        .flat_map(|record| {
            let txid = record.tx.txid();
            record
                .tx
                .output
                .iter()
                .enumerate()
                .filter(|(_, txout)| txout.script_pubkey == *script_pubkey)
                .map(move |(vout, txout)| Utxo {
                    mined: record.status,
                    outpoint: OutPoint::new(txid, vout as u32),
                    value: txout.value,
                })
        })
        .filter(|utxo| !spent.contains(&utxo.outpoint))
        .collect::<Vec<_>>();
    utxos.dedup_by_key(|utxo| utxo.outpoint);
    utxos
}

#[cfg(test)]
mod test {
    use bitcoin::{PackedLockTime, Sequence, TxIn, TxOut, Witness};

    use super::*;

    fn tx(inputs: &[OutPoint], outputs: &[(&Script, u64)]) -> Transaction {
        Transaction {
            version: 2,
            lock_time: PackedLockTime::ZERO,
            input: inputs
                .iter()
                .map(|prevout| TxIn {
                    previous_output: *prevout,
                    script_sig: Script::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: outputs
                .iter()
                .map(|(script, value)| TxOut {
                    value: *value,
                    script_pubkey: (*script).clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn confirmations() {
        assert_eq!(MiningStatus::Blockchain(10).confirmations(10), 1);
        assert_eq!(MiningStatus::Blockchain(10).confirmations(12), 3);
        assert_eq!(MiningStatus::Blockchain(10).confirmations(9), 0);
        assert_eq!(MiningStatus::Mempool.confirmations(100), 0);
        assert_eq!(MiningStatus::Mempool.height(), None);
        assert_eq!(MiningStatus::Blockchain(7).to_string(), "7");
    }

    #[test]
    fn unspent_outputs() {
        let script = Script::from(vec![0x51]);
        let other = Script::from(vec![0x52]);
        let funding = tx(&[], &[(&script, 1000), (&other, 10), (&script, 500)]);
        let funding_id = funding.txid();
        let spending = tx(&[OutPoint::new(funding_id, 0)], &[(&other, 900)]);
        let history = vec![
            TxRecord {
                tx: funding,
                status: MiningStatus::Blockchain(1),
            },
            TxRecord {
                tx: spending,
                status: MiningStatus::Mempool,
            },
        ];

        let utxos = unspent(&history, &script);
        assert_eq!(utxos, vec![Utxo {
            mined: MiningStatus::Blockchain(1),
            outpoint: OutPoint::new(funding_id, 2),
            value: 500,
        }]);
        assert_eq!(utxos[0].to_string(), format!("500@{}:2", funding_id));
    }
}
