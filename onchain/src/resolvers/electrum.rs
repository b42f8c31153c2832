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

use bitcoin::{Script, Transaction, Txid};
use electrum_client::{Client, ElectrumApi};

use super::{HistoryResolverError, ResolveHistory, ResolveTx, TxResolverError};
use crate::blockchain::{MiningStatus, TxRecord};

impl ResolveTx for Client {
    fn resolve_tx(&self, txid: Txid) -> Result<Transaction, TxResolverError> {
        self.transaction_get(&txid).map_err(|err| TxResolverError {
            txid,
            err: Some(Box::new(err)),
        })
    }
}

impl ResolveHistory for Client {
    fn resolve_history(
        &self,
        script_pubkey: &Script,
    ) -> Result<Vec<TxRecord>, HistoryResolverError> {
        let mut history = self
            .script_get_history(script_pubkey)
            .map_err(|err| HistoryResolverError {
                details: format!("history of script {:x}", script_pubkey),
                err: Some(Box::new(err)),
            })?;
        // electrum lists mempool entries with zero or negative heights
        history.sort_by_key(|res| if res.height > 0 { res.height } else { i32::MAX });
        history
            .into_iter()
            .map(|res| {
                let tx = self.transaction_get(&res.tx_hash).map_err(|err| HistoryResolverError {
                    details: format!("transaction {}", res.tx_hash),
                    err: Some(Box::new(err)),
                })?;
                let status = if res.height > 0 {
                    MiningStatus::Blockchain(res.height as u64)
                } else {
                    MiningStatus::Mempool
                };
                Ok(TxRecord { tx, status })
            })
            .collect()
    }

    fn tip_height(&self) -> Result<u64, HistoryResolverError> {
        self.block_headers_subscribe()
            .map(|header| header.height as u64)
            .map_err(|err| HistoryResolverError {
                details: s!("chain tip"),
                err: Some(Box::new(err)),
            })
    }
}
