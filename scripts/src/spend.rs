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

//! Signature scripts for spending deposit and commit outputs through each
//! of their branches.

use bitcoin::blockdata::opcodes::all::OP_PUSHNUM_1;
use bitcoin::blockdata::script::{Builder, Instruction};
use bitcoin::{EcdsaSig, Script};

use crate::{ScriptKind, Secret, TemplateError};

/// Cooperative (2-of-2) spending of the deposit, as it is present in the
/// input of a commit transaction
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CooperativeSpend {
    /// Payer signature, present in every commit handed to the payee
    pub payer_sig: EcdsaSig,
    /// Absent while the commit is not finalized by the payee
    pub payee_sig: Option<EcdsaSig>,
    /// Redeem script of the spent deposit output
    pub deposit_script: Script,
}

impl CooperativeSpend {
    /// Constructs signature script:
    /// `OP_0 <payer_sig> <payee_sig> OP_1 <deposit_script>`, where a missing
    /// payee signature is replaced with an empty push.
    pub fn to_script_sig(&self) -> Script {
        let payee_sig = self.payee_sig.as_ref().map(|sig| sig.to_vec()).unwrap_or_default();
        Builder::new()
            .push_int(0)
            .push_slice(&self.payer_sig.to_vec())
            .push_slice(&payee_sig)
            .push_int(1)
            .push_slice(self.deposit_script.as_bytes())
            .into_script()
    }

    /// Parses cooperative deposit spending signature script.
    pub fn from_script_sig(script_sig: &Script) -> Result<Self, TemplateError> {
        let mismatch = TemplateError::Mismatch(ScriptKind::CooperativeSpend);
        let instructions = script_sig.instructions().collect::<Result<Vec<_>, _>>()?;
        match instructions.as_slice() {
            [Instruction::PushBytes(dummy), Instruction::PushBytes(payer_sig), Instruction::PushBytes(payee_sig), Instruction::Op(branch), Instruction::PushBytes(deposit_script)]
                if dummy.is_empty() && *branch == OP_PUSHNUM_1 =>
            {
                let payer_sig = EcdsaSig::from_slice(payer_sig).map_err(|_| mismatch.clone())?;
                let payee_sig = if payee_sig.is_empty() {
                    None
                } else {
                    Some(EcdsaSig::from_slice(payee_sig).map_err(|_| mismatch)?)
                };
                Ok(CooperativeSpend {
                    payer_sig,
                    payee_sig,
                    deposit_script: Script::from(deposit_script.to_vec()),
                })
            }
            _ => Err(mismatch),
        }
    }
}

/// Signature script reclaiming an expired deposit:
/// `<payer_sig> OP_0 OP_0 <deposit_script>`.
pub fn expire_script_sig(payer_sig: &EcdsaSig, deposit_script: &Script) -> Script {
    Builder::new()
        .push_slice(&payer_sig.to_vec())
        .push_int(0)
        .push_int(0)
        .push_slice(deposit_script.as_bytes())
        .into_script()
}

/// Signature script of the payee claiming a matured commit:
/// `<payee_sig> <spend_secret> OP_1 <commit_script>`.
pub fn payout_script_sig(
    payee_sig: &EcdsaSig,
    spend_secret: &Secret,
    commit_script: &Script,
) -> Script {
    Builder::new()
        .push_slice(&payee_sig.to_vec())
        .push_slice(spend_secret.as_ref())
        .push_int(1)
        .push_slice(commit_script.as_bytes())
        .into_script()
}

/// Signature script of the payer claiming a revoked commit:
/// `<payer_sig> <revoke_secret> OP_0 <commit_script>`.
pub fn revoke_script_sig(
    payer_sig: &EcdsaSig,
    revoke_secret: &Secret,
    commit_script: &Script,
) -> Script {
    Builder::new()
        .push_slice(&payer_sig.to_vec())
        .push_slice(revoke_secret.as_ref())
        .push_int(0)
        .push_slice(commit_script.as_bytes())
        .into_script()
}
