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

//! Script templates, hash locks and relative time locks used by
//! unidirectional micropayment channels.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs)]

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod error;
pub mod secret;
pub mod spend;
pub mod templates;
mod timelock;

pub use error::{ScriptKind, TemplateError};
pub use secret::{Secret, SecretHash};
pub use templates::{
    compile_commit_script, compile_deposit_script, script_to_address, CommitScript, DepositScript,
};
pub use timelock::BlockDelay;
