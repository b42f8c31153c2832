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

use bitcoin::OutPoint;
use mpc_onchain::{HistoryResolverError, TxResolverError};
use mpc_scripts::{SecretHash, TemplateError};

/// Stable error classes reported through the message API
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate", rename_all = "snake_case")]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum ErrorCode {
    /// Malformed request data or parameter out of range
    #[display("invalid_input")]
    InvalidInput,

    /// Deposit script does not lock funds for the expected payee
    #[display("script_mismatch")]
    ScriptMismatch,

    /// Quantity violates channel limits
    #[display("invalid_quantity")]
    InvalidQuantity,

    /// Commit does not increase transferred amount
    #[display("stale_commit")]
    StaleCommit,

    /// Commit offered by the payer is invalid
    #[display("commit_rejected")]
    CommitRejected,

    /// Deposit is expired or about to expire
    #[display("expired_deposit")]
    ExpiredDeposit,

    /// Time lock of the spent output has not passed yet
    #[display("not_yet_expired")]
    NotYetExpired,

    /// Deposit funding transaction is not mined or spent
    #[display("deposit_not_found")]
    DepositNotFound,

    /// Not enough funds to construct transaction
    #[display("insufficient_funds")]
    InsufficientFunds,

    /// Failure requesting chain data
    #[display("chain")]
    Chain,

    /// Failure signing or verifying transaction
    #[display("signing")]
    Signing,
}

/// Reasons for the payee to reject a commit offered by the payer
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display(doc_comments)]
pub enum RejectReason {
    /// {0}
    Template(TemplateError),

    /// commit script keys or spend secret hash differ from the ones of the
    /// channel deposit
    ForeignScript,

    /// revoke secret hash {0} belongs to a revoked commit
    RevokedHash(SecretHash),

    /// revoke secret hash {0} was never requested
    UnrequestedHash(SecretHash),

    /// commit transaction must have a single input, while it has {0}
    InputCount(usize),

    /// commit transaction has no output paying to the commit script address
    MissingOutput,

    /// commit output of {value} sats does not cover channel fee of {fee} sats
    InsufficientOutput {
        /// Value of the commit output
        value: u64,
        /// Channel fee
        fee: u64,
    },

    /// commit pays {actual} sats while {requested} sats were requested
    QuantityMismatch {
        /// Quantity of the pending request
        requested: u64,
        /// Quantity paid by the commit
        actual: u64,
    },

    /// commit input does not spend the channel deposit
    ForeignInput,

    /// commit input spends {value} sats, which does not cover {required}
    /// sats of the outputs and channel fee
    InsufficientInput {
        /// Value of the spent deposit output
        value: u64,
        /// Sum of the commit outputs and channel fee
        required: u64,
    },

    /// commit transaction is time-locked and can not be published right away
    TimeLocked,

    /// payer signature is invalid or does not commit to the whole
    /// transaction
    InvalidSignature,
}

/// Errors of channel operations
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// {0}
    #[from]
    Template(TemplateError),

    /// quantity must be positive
    ZeroQuantity,

    /// quantity {0} exceeds total bitcoin supply
    QuantityOutOfRange(u64),

    /// asset {0} is not supported; channels operate with BTC only
    UnsupportedAsset(String),

    /// revoke secret hash {0} is already used in the channel
    DuplicateRevokeHash(SecretHash),

    /// deposit script does not match expected payee key and spend secret hash
    ScriptMismatch,

    /// requested quantity {requested} is below already transferred amount of
    /// {transferred}
    QuantityBelowTransferred {
        /// Requested quantity
        requested: u64,
        /// Quantity of the highest commit
        transferred: u64,
    },

    /// quantity {quantity} exceeds channel deposit of {deposit}
    QuantityExceedsDeposit {
        /// Commit quantity
        quantity: u64,
        /// Channel quantity
        deposit: u64,
    },

    /// commit of {quantity} does not exceed current commit of {current}
    StaleCommit {
        /// Quantity of the new commit
        quantity: u64,
        /// Quantity of the highest commit
        current: u64,
    },

    /// commit is rejected: {0}
    CommitRejected(RejectReason),

    /// channel deposit has expired
    ExpiredDeposit,

    /// channel deposit expires in {ttl} blocks, which leaves no time for a
    /// commit with {delay} blocks delay
    ExpiringDeposit {
        /// Blocks left before the deposit expires
        ttl: u16,
        /// Commit delay
        delay: u16,
    },

    /// output {outpoint} has {confirmations} confirmations, while it can be
    /// spent only after {required}
    NotYetExpired {
        /// Time-locked output
        outpoint: OutPoint,
        /// Confirmations of the output
        confirmations: u32,
        /// Confirmations required by the time lock
        required: u16,
    },

    /// deposit funding transaction is not mined or is already spent
    DepositNotFound,

    /// insufficient funds: {available} sats available, while {required} sats
    /// are required
    InsufficientFunds {
        /// Value of the spendable outputs
        available: u64,
        /// Value required by the transaction
        required: u64,
    },

    /// private key does not control {0}
    KeyMismatch(String),

    /// {0}
    #[from]
    TxResolver(TxResolverError),

    /// {0}
    #[from]
    History(HistoryResolverError),

    /// signature error: {0}
    #[from]
    Signing(secp256k1::Error),

    /// unable to compute signature hash: {0}
    #[from]
    Sighash(bitcoin::util::sighash::Error),

    /// malformed request: {0}
    #[from]
    Request(serde_json::Error),
}

impl Error {
    /// Class of the error reported to API clients
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Template(_)
            | Error::ZeroQuantity
            | Error::QuantityOutOfRange(_)
            | Error::UnsupportedAsset(_)
            | Error::DuplicateRevokeHash(_)
            | Error::Request(_) => ErrorCode::InvalidInput,
            Error::ScriptMismatch => ErrorCode::ScriptMismatch,
            Error::QuantityBelowTransferred { .. } | Error::QuantityExceedsDeposit { .. } => {
                ErrorCode::InvalidQuantity
            }
            Error::StaleCommit { .. } => ErrorCode::StaleCommit,
            Error::CommitRejected(_) => ErrorCode::CommitRejected,
            Error::ExpiredDeposit | Error::ExpiringDeposit { .. } => ErrorCode::ExpiredDeposit,
            Error::NotYetExpired { .. } => ErrorCode::NotYetExpired,
            Error::DepositNotFound => ErrorCode::DepositNotFound,
            Error::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            Error::TxResolver(_) | Error::History(_) => ErrorCode::Chain,
            Error::KeyMismatch(_) | Error::Signing(_) | Error::Sighash(_) => ErrorCode::Signing,
        }
    }
}

impl From<RejectReason> for Error {
    fn from(reason: RejectReason) -> Self { Error::CommitRejected(reason) }
}
