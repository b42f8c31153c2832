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

/// Kinds of scripts recognized by the channel templates
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum ScriptKind {
    /// Deposit locking script
    #[display("deposit")]
    Deposit,

    /// Commit locking script
    #[display("commit")]
    Commit,

    /// Signature script of a cooperative deposit spending
    #[display("cooperative deposit spending")]
    CooperativeSpend,
}

/// Errors constructing or recognizing channel scripts and their components
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum TemplateError {
    /// secret hash must be exactly 20 bytes long, while {0} bytes were given
    HashLength(usize),

    /// secret must be exactly 32 bytes long, while {0} bytes were given
    SecretLength(usize),

    /// invalid hexadecimal encoding
    #[from(bitcoin::hashes::hex::Error)]
    Hex,

    /// public key data does not represent a valid secp256k1 curve point
    #[from(bitcoin::util::key::Error)]
    Pubkey,

    /// time lock of {0} blocks is out of range; it must be positive and not
    /// exceed 65535 blocks
    Timelock(i64),

    /// script does not follow {0} script template
    Mismatch(ScriptKind),

    /// script contains invalid push operations
    #[from(bitcoin::blockdata::script::Error)]
    Malformed,

    /// redeem script of {0} bytes is too large to be used with P2SH
    OversizedScript(usize),
}
