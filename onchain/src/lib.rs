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

//! Library for requesting onchain bitcoin data required by micropayment
//! channels: transactions, script histories, mining status and the chain
//! tip.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs)]

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

pub mod blockchain;
mod memory;
mod resolvers;

pub use blockchain::{unspent, MiningStatus, TxRecord, Utxo};
pub use memory::{MemoryChain, MemoryChainError};
pub use resolvers::{HistoryResolverError, ResolveHistory, ResolveTx, TxResolverError};
