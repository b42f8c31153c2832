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

//! Deposit and commit script templates.
//!
//! Deposit script:
//! ```text
//! OP_IF
//!     2 <payer_pubkey> <payee_pubkey> 2 OP_CHECKMULTISIG
//! OP_ELSE
//!     OP_IF
//!         OP_HASH160 <spend_secret_hash> OP_EQUALVERIFY
//!         <payer_pubkey> OP_CHECKSIG
//!     OP_ELSE
//!         <expire_time> OP_CHECKSEQUENCEVERIFY OP_DROP
//!         <payer_pubkey> OP_CHECKSIG
//!     OP_ENDIF
//! OP_ENDIF
//! ```
//!
//! Commit script:
//! ```text
//! OP_IF
//!     <delay_time> OP_CHECKSEQUENCEVERIFY OP_DROP
//!     OP_HASH160 <spend_secret_hash> OP_EQUALVERIFY
//!     <payee_pubkey> OP_CHECKSIG
//! OP_ELSE
//!     OP_HASH160 <revoke_secret_hash> OP_EQUALVERIFY
//!     <payer_pubkey> OP_CHECKSIG
//! OP_ENDIF
//! ```

use bitcoin::blockdata::opcodes::all::*;
use bitcoin::blockdata::opcodes::All as Opcode;
use bitcoin::blockdata::script::{read_scriptint, Builder, Instruction, Instructions};
use bitcoin::{Address, Network, PublicKey, Script};

use crate::{BlockDelay, ScriptKind, SecretHash, TemplateError};

/// Parameters of a channel deposit script
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct DepositScript {
    /// Key of the party funding the channel
    pub payer_pubkey: PublicKey,
    /// Key of the party receiving channel payments
    pub payee_pubkey: PublicKey,
    /// Hash of the payee secret revealed with the payout
    pub spend_secret_hash: SecretHash,
    /// Number of blocks after which the payer may reclaim the deposit
    pub expire_time: BlockDelay,
}

impl DepositScript {
    /// Compiles the deposit script.
    pub fn to_script(&self) -> Script {
        Builder::new()
            .push_opcode(OP_IF)
            .push_int(2)
            .push_key(&self.payer_pubkey)
            .push_key(&self.payee_pubkey)
            .push_int(2)
            .push_opcode(OP_CHECKMULTISIG)
            .push_opcode(OP_ELSE)
            .push_opcode(OP_IF)
            .push_opcode(OP_HASH160)
            .push_slice(self.spend_secret_hash.as_ref())
            .push_opcode(OP_EQUALVERIFY)
            .push_key(&self.payer_pubkey)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ELSE)
            .push_int(self.expire_time.blocks() as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_key(&self.payer_pubkey)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ENDIF)
            .push_opcode(OP_ENDIF)
            .into_script()
    }

    /// Recovers deposit parameters from a script. Succeeds only if the script
    /// is byte-identical to the one compiled from the recovered parameters.
    pub fn from_script(script: &Script) -> Result<Self, TemplateError> {
        let mut parser = TemplateParser::with(script, ScriptKind::Deposit);
        parser.op(OP_IF)?;
        parser.op(OP_PUSHNUM_2)?;
        let payer_pubkey = parser.key()?;
        let payee_pubkey = parser.key()?;
        parser.op(OP_PUSHNUM_2)?;
        parser.op(OP_CHECKMULTISIG)?;
        parser.op(OP_ELSE)?;
        parser.op(OP_IF)?;
        parser.op(OP_HASH160)?;
        let spend_secret_hash = parser.hash()?;
        parser.op(OP_EQUALVERIFY)?;
        parser.key()?;
        parser.op(OP_CHECKSIG)?;
        parser.op(OP_ELSE)?;
        let expire_time = BlockDelay::with(parser.int()?)?;
        parser.finish_with(
            DepositScript {
                payer_pubkey,
                payee_pubkey,
                spend_secret_hash,
                expire_time,
            },
            DepositScript::to_script,
        )
    }

    /// Returns P2SH address of the deposit for the given network.
    pub fn address(&self, network: Network) -> Result<Address, TemplateError> {
        script_to_address(&self.to_script(), network)
    }
}

/// Parameters of a channel commit script
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CommitScript {
    /// Key of the party funding the channel; used by the revocation branch
    pub payer_pubkey: PublicKey,
    /// Key of the party receiving channel payments; used by the payout
    /// branch
    pub payee_pubkey: PublicKey,
    /// Hash of the payee secret, matching the one from the deposit script
    pub spend_secret_hash: SecretHash,
    /// Hash of the secret revoking this commit
    pub revoke_secret_hash: SecretHash,
    /// Number of blocks the commit must age before the payee can claim it
    pub delay_time: BlockDelay,
}

impl CommitScript {
    /// Compiles the commit script.
    pub fn to_script(&self) -> Script {
        Builder::new()
            .push_opcode(OP_IF)
            .push_int(self.delay_time.blocks() as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_opcode(OP_HASH160)
            .push_slice(self.spend_secret_hash.as_ref())
            .push_opcode(OP_EQUALVERIFY)
            .push_key(&self.payee_pubkey)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ELSE)
            .push_opcode(OP_HASH160)
            .push_slice(self.revoke_secret_hash.as_ref())
            .push_opcode(OP_EQUALVERIFY)
            .push_key(&self.payer_pubkey)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ENDIF)
            .into_script()
    }

    /// Recovers commit parameters from a script. Succeeds only if the script
    /// is byte-identical to the one compiled from the recovered parameters.
    pub fn from_script(script: &Script) -> Result<Self, TemplateError> {
        let mut parser = TemplateParser::with(script, ScriptKind::Commit);
        parser.op(OP_IF)?;
        let delay_time = BlockDelay::with(parser.int()?)?;
        parser.op(OP_CSV)?;
        parser.op(OP_DROP)?;
        parser.op(OP_HASH160)?;
        let spend_secret_hash = parser.hash()?;
        parser.op(OP_EQUALVERIFY)?;
        let payee_pubkey = parser.key()?;
        parser.op(OP_CHECKSIG)?;
        parser.op(OP_ELSE)?;
        parser.op(OP_HASH160)?;
        let revoke_secret_hash = parser.hash()?;
        parser.op(OP_EQUALVERIFY)?;
        let payer_pubkey = parser.key()?;
        parser.finish_with(
            CommitScript {
                payer_pubkey,
                payee_pubkey,
                spend_secret_hash,
                revoke_secret_hash,
                delay_time,
            },
            CommitScript::to_script,
        )
    }

    /// Returns P2SH address of the commit for the given network.
    pub fn address(&self, network: Network) -> Result<Address, TemplateError> {
        script_to_address(&self.to_script(), network)
    }
}

/// Compiles deposit script locking channel funds under the cooperative,
/// spend-secret and expiration branches.
pub fn compile_deposit_script(
    payer_pubkey: PublicKey,
    payee_pubkey: PublicKey,
    spend_secret_hash: SecretHash,
    expire_time: BlockDelay,
) -> Script {
    DepositScript {
        payer_pubkey,
        payee_pubkey,
        spend_secret_hash,
        expire_time,
    }
    .to_script()
}

/// Compiles commit script with delayed payout and revocation branches.
pub fn compile_commit_script(
    payer_pubkey: PublicKey,
    payee_pubkey: PublicKey,
    spend_secret_hash: SecretHash,
    revoke_secret_hash: SecretHash,
    delay_time: BlockDelay,
) -> Script {
    CommitScript {
        payer_pubkey,
        payee_pubkey,
        spend_secret_hash,
        revoke_secret_hash,
        delay_time,
    }
    .to_script()
}

/// Computes P2SH address for a redeem script.
pub fn script_to_address(script: &Script, network: Network) -> Result<Address, TemplateError> {
    Address::p2sh(script, network).map_err(|_| TemplateError::OversizedScript(script.len()))
}

/// Sequential reader over script instructions expecting a fixed template
struct TemplateParser<'script> {
    script: &'script Script,
    instructions: Instructions<'script>,
    kind: ScriptKind,
}

impl<'script> TemplateParser<'script> {
    fn with(script: &'script Script, kind: ScriptKind) -> Self {
        TemplateParser {
            script,
            instructions: script.instructions(),
            kind,
        }
    }

    #[inline]
    fn mismatch(&self) -> TemplateError { TemplateError::Mismatch(self.kind) }

    fn next(&mut self) -> Result<Instruction<'script>, TemplateError> {
        let instruction = self.instructions.next().ok_or_else(|| self.mismatch())?;
        Ok(instruction?)
    }

    fn op(&mut self, expected: Opcode) -> Result<(), TemplateError> {
        match self.next()? {
            Instruction::Op(op) if op == expected => Ok(()),
            _ => Err(self.mismatch()),
        }
    }

    fn data(&mut self) -> Result<&'script [u8], TemplateError> {
        match self.next()? {
            Instruction::PushBytes(data) => Ok(data),
            Instruction::Op(_) => Err(self.mismatch()),
        }
    }

    fn key(&mut self) -> Result<PublicKey, TemplateError> {
        Ok(PublicKey::from_slice(self.data()?)?)
    }

    fn hash(&mut self) -> Result<SecretHash, TemplateError> { SecretHash::from_slice(self.data()?) }

    fn int(&mut self) -> Result<i64, TemplateError> {
        match self.next()? {
            Instruction::PushBytes(data) => Ok(read_scriptint(data)?),
            Instruction::Op(op) => match op.to_u8() {
                code @ 0x51..=0x60 => Ok((code - 0x50) as i64),
                _ => Err(self.mismatch()),
            },
        }
    }

    /// Checks that the parameters collected so far reproduce the whole
    /// script. This also covers the template tail not read by the caller.
    fn finish_with<T>(self, params: T, compile: impl Fn(&T) -> Script) -> Result<T, TemplateError> {
        if compile(&params) != *self.script {
            return Err(self.mismatch());
        }
        Ok(params)
    }
}
