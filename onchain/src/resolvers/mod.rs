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

//! Resolvers are traits allow accessing information from a bitcoin
//! transaction graph (blockchain, indexer, in-memory test chain etc).

#[cfg(feature = "electrum")]
mod electrum;

use std::collections::BTreeMap;

use bitcoin::{Script, Transaction, Txid};

use crate::blockchain::TxRecord;

#[derive(Debug, Display, Error)]
#[display(doc_comments)]
/// unable to locate transaction {txid}
pub struct TxResolverError {
    /// transaction id causing the error
    pub txid: Txid,
    /// error message
    pub err: Option<Box<dyn std::error::Error>>,
}

impl TxResolverError {
    /// Convenience function for constructing resolver error from simple
    /// transaction id without error message
    #[inline]
    pub fn with(txid: Txid) -> TxResolverError { TxResolverError { txid, err: None } }
}

/// Transaction resolver
pub trait ResolveTx {
    /// Tries to find a transaction by transaction id ([`Txid`])
    fn resolve_tx(&self, txid: Txid) -> Result<Transaction, TxResolverError>;
}

impl ResolveTx for BTreeMap<Txid, Transaction> {
    fn resolve_tx(&self, txid: Txid) -> Result<Transaction, TxResolverError> {
        self.get(&txid)
            .cloned()
            .ok_or_else(|| TxResolverError::with(txid))
    }
}

#[derive(Debug, Display, Error)]
#[display(doc_comments)]
/// unable to query script history or chain tip: {details}
pub struct HistoryResolverError {
    /// description of the failed request
    pub details: String,
    /// error message
    pub err: Option<Box<dyn std::error::Error>>,
}

impl HistoryResolverError {
    /// Convenience function for constructing resolver error from a request
    /// description without underlying error
    #[inline]
    pub fn with(details: impl ToString) -> HistoryResolverError {
        HistoryResolverError {
            details: details.to_string(),
            err: None,
        }
    }
}

/// Script history resolver
pub trait ResolveHistory {
    /// Returns all known transactions paying to or spending from outputs
    /// locked with `script_pubkey`, including unconfirmed ones, ordered by
    /// block height with mempool transactions last
    fn resolve_history(&self, script_pubkey: &Script)
        -> Result<Vec<TxRecord>, HistoryResolverError>;

    /// Returns height of the current chain tip
    fn tip_height(&self) -> Result<u64, HistoryResolverError>;
}
