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

use bitcoin::blockdata::script::Builder;
use bitcoin::{
    OutPoint, PackedLockTime, Script, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};

use crate::blockchain::{MiningStatus, TxRecord};
use crate::resolvers::{HistoryResolverError, ResolveHistory, ResolveTx, TxResolverError};

/// Errors accepting transaction into [`MemoryChain`]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum MemoryChainError {
    /// transaction {0} is already known
    DuplicateTx(Txid),

    /// transaction spends unknown output {0}
    UnknownOutput(OutPoint),

    /// output {0} is already spent
    DoubleSpend(OutPoint),
}

/// In-memory blockchain with a mempool, suitable for simulating channel
/// lifecycle without a network connection.
///
/// Scripts are not executed: the chain only checks that transactions spend
/// existing unspent outputs.
#[derive(Clone, Default, Debug)]
pub struct MemoryChain {
    records: Vec<TxRecord>,
    height: u64,
}

impl MemoryChain {
    /// Constructs empty chain with the tip at height 0
    #[inline]
    pub fn new() -> MemoryChain { MemoryChain::default() }

    /// Height of the chain tip
    #[inline]
    pub fn height(&self) -> u64 { self.height }

    /// Creates new coins locked by `script_pubkey` and mines them in a new
    /// block (together with all mempool transactions).
    pub fn fund(&mut self, script_pubkey: Script, value: u64) -> OutPoint {
        let nonce = self.records.len() as i64 + 1;
        let tx = Transaction {
            version: 2,
            lock_time: PackedLockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: Builder::new().push_int(nonce).into_script(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value,
                script_pubkey,
            }],
        };
        let txid = tx.txid();
        self.records.push(TxRecord {
            tx,
            status: MiningStatus::Mempool,
        });
        self.mine_block();
        OutPoint::new(txid, 0)
    }

    /// Adds transaction to the mempool.
    pub fn mempool(&mut self, tx: Transaction) -> Result<Txid, MemoryChainError> {
        let txid = tx.txid();
        if self.record(txid).is_some() {
            return Err(MemoryChainError::DuplicateTx(txid));
        }
        for txin in &tx.input {
            let prevout = txin.previous_output;
            if self.output(prevout).is_none() {
                return Err(MemoryChainError::UnknownOutput(prevout));
            }
            if self.is_spent(prevout) {
                return Err(MemoryChainError::DoubleSpend(prevout));
            }
        }
        self.records.push(TxRecord {
            tx,
            status: MiningStatus::Mempool,
        });
        Ok(txid)
    }

    /// Adds transaction to the mempool and mines a new block.
    pub fn publish(&mut self, tx: Transaction) -> Result<Txid, MemoryChainError> {
        let txid = self.mempool(tx)?;
        self.mine_block();
        Ok(txid)
    }

    /// Mines new block including all mempool transactions; returns new tip
    /// height.
    pub fn mine_block(&mut self) -> u64 {
        self.height += 1;
        let height = self.height;
        self.records
            .iter_mut()
            .filter(|record| record.status == MiningStatus::Mempool)
            .for_each(|record| record.status = MiningStatus::Blockchain(height));
        height
    }

    /// Mines `count` blocks; returns new tip height.
    pub fn mine_blocks(&mut self, count: u64) -> u64 {
        (0..count).for_each(|_| {
            self.mine_block();
        });
        self.height
    }

    /// Mining status of a transaction
    pub fn status(&self, txid: Txid) -> MiningStatus {
        self.record(txid)
            .map(|record| record.status)
            .unwrap_or(MiningStatus::UnknownTx)
    }

    fn record(&self, txid: Txid) -> Option<&TxRecord> {
        self.records.iter().find(|record| record.tx.txid() == txid)
    }

    fn output(&self, outpoint: OutPoint) -> Option<&TxOut> {
        self.record(outpoint.txid)
            .and_then(|record| record.tx.output.get(outpoint.vout as usize))
    }

    fn is_spent(&self, outpoint: OutPoint) -> bool {
        self.records
            .iter()
            .flat_map(|record| &record.tx.input)
            .any(|txin| txin.previous_output == outpoint)
    }
}

impl ResolveTx for MemoryChain {
    fn resolve_tx(&self, txid: Txid) -> Result<Transaction, TxResolverError> {
        self.record(txid)
            .map(|record| record.tx.clone())
            .ok_or_else(|| TxResolverError::with(txid))
    }
}

impl ResolveHistory for MemoryChain {
    fn resolve_history(
        &self,
        script_pubkey: &Script,
    ) -> Result<Vec<TxRecord>, HistoryResolverError> {
        Ok(self
            .records
            .iter()
            .filter(|record| {
                record.tx.output.iter().any(|txout| txout.script_pubkey == *script_pubkey)
                    || record.tx.input.iter().any(|txin| {
                        self.output(txin.previous_output)
                            .map(|txout| txout.script_pubkey == *script_pubkey)
                            .unwrap_or_default()
                    })
            })
            .cloned()
            .collect())
    }

    #[inline]
    fn tip_height(&self) -> Result<u64, HistoryResolverError> { Ok(self.height) }
}
