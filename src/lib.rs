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

//! Unidirectional bitcoin micropayment channels.
//!
//! The payer locks funds into a deposit script and pays the payee with a
//! series of commit transactions of increasing value. The payee may return
//! value by revealing revoke secrets of commits; either party recovers its
//! funds with payout transactions once time locks expire.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs)]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate serde_crate as serde;
#[macro_use]
extern crate log;

pub extern crate mpc_onchain as onchain;
pub extern crate mpc_scripts as scripts;

pub mod api;
mod builder;
pub mod channel;
mod config;
mod error;
pub mod sign;
mod txhex;

pub use api::{Api, AnyState, Request, Response};
pub use builder::TxBuilder;
pub use channel::{
    ChannelState, Commit, CommitLog, CommitProposal, CommitRequest, CommitToSign, Deposit,
    DepositParams, DepositProposal, PayeeState, PayerState, Payout, PayoutPath, RevokedCommit,
    ASSET_BTC,
};
pub use config::{Config, FeePolicy, DEFAULT_DUST_SIZE, DEFAULT_FEE_PER_KB};
pub use error::{Error, ErrorCode, RejectReason};
pub use txhex::TxHex;
