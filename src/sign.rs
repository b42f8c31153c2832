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

//! Reference signer for channel transactions.
//!
//! All channel transactions are legacy (non-segwit) P2SH or P2PKH spendings
//! signed with `SIGHASH_ALL`. Private keys are passed as arguments and are
//! never stored in channel state.

use bitcoin::blockdata::script::Builder;
use bitcoin::secp256k1::{Message, SECP256K1};
use bitcoin::util::sighash::SighashCache;
use bitcoin::{EcdsaSig, EcdsaSighashType, PrivateKey, PublicKey, Script, Transaction};
use mpc_onchain::ResolveTx;
use mpc_scripts::spend::{self, CooperativeSpend};
use mpc_scripts::{DepositScript, Secret};

use crate::Error;

/// Computes legacy signature hash of transaction input spending an output
/// with the given script code (redeem script for P2SH).
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
) -> Result<Message, Error> {
    let sighash = SighashCache::new(tx).legacy_signature_hash(
        input_index,
        script_code,
        EcdsaSighashType::All.to_u32(),
    )?;
    Ok(Message::from_slice(&sighash[..])?)
}

/// Produces `SIGHASH_ALL` signature for a transaction input.
pub fn sign_input(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    key: &PrivateKey,
) -> Result<EcdsaSig, Error> {
    let msg = legacy_sighash(tx, input_index, script_code)?;
    Ok(EcdsaSig {
        sig: SECP256K1.sign_ecdsa(&msg, &key.inner),
        hash_ty: EcdsaSighashType::All,
    })
}

/// Checks that `sig` is a valid `SIGHASH_ALL` signature of `pubkey` for a
/// transaction input.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    sig: &EcdsaSig,
    pubkey: &PublicKey,
) -> Result<bool, Error> {
    if sig.hash_ty != EcdsaSighashType::All {
        return Ok(false);
    }
    let msg = legacy_sighash(tx, input_index, script_code)?;
    Ok(SECP256K1.verify_ecdsa(&msg, &sig.sig, &pubkey.inner).is_ok())
}

/// Signs all inputs of a deposit transaction, spending P2PKH outputs of the
/// payer. Spent outputs are looked up with `resolver`.
pub fn sign_deposit(
    tx: &Transaction,
    payer_key: &PrivateKey,
    resolver: &impl ResolveTx,
) -> Result<Transaction, Error> {
    let pubkey = payer_key.public_key(SECP256K1);
    let script_pubkey = Script::new_p2pkh(&pubkey.pubkey_hash());
    let mut signed = tx.clone();
    for (index, txin) in tx.input.iter().enumerate() {
        let prevout = txin.previous_output;
        let prev_tx = resolver.resolve_tx(prevout.txid)?;
        match prev_tx.output.get(prevout.vout as usize) {
            Some(txout) if txout.script_pubkey == script_pubkey => {}
            _ => return Err(Error::KeyMismatch(prevout.to_string())),
        }
        let sig = sign_input(tx, index, &script_pubkey, payer_key)?;
        signed.input[index].script_sig = Builder::new()
            .push_slice(&sig.to_vec())
            .push_key(&pubkey)
            .into_script();
    }
    Ok(signed)
}

/// Adds payer signature to a commit transaction created by the payer. The
/// payee signature slot is left empty.
pub fn sign_created_commit(
    tx: &Transaction,
    payer_key: &PrivateKey,
    deposit_script: &Script,
) -> Result<Transaction, Error> {
    let template = DepositScript::from_script(deposit_script)?;
    check_key(payer_key, &template.payer_pubkey, "deposit payer key")?;
    let payer_sig = sign_input(tx, 0, deposit_script, payer_key)?;
    let mut signed = tx.clone();
    signed.input[0].script_sig = CooperativeSpend {
        payer_sig,
        payee_sig: None,
        deposit_script: deposit_script.clone(),
    }
    .to_script_sig();
    Ok(signed)
}

/// Completes commit transaction signed by the payer with the payee
/// signature, making it ready to be published.
pub fn sign_finalize_commit(
    tx: &Transaction,
    payee_key: &PrivateKey,
    deposit_script: &Script,
) -> Result<Transaction, Error> {
    let template = DepositScript::from_script(deposit_script)?;
    check_key(payee_key, &template.payee_pubkey, "deposit payee key")?;
    let script_sig = tx.input.first().map(|txin| &txin.script_sig).cloned().unwrap_or_default();
    let mut spend = CooperativeSpend::from_script_sig(&script_sig)?;
    spend.payee_sig = Some(sign_input(tx, 0, deposit_script, payee_key)?);
    let mut signed = tx.clone();
    signed.input[0].script_sig = spend.to_script_sig();
    Ok(signed)
}

/// Signs payee payout of a matured commit, revealing the spend secret.
pub fn sign_payout_recover(
    tx: &Transaction,
    payee_key: &PrivateKey,
    commit_script: &Script,
    spend_secret: &Secret,
) -> Result<Transaction, Error> {
    let sig = sign_input(tx, 0, commit_script, payee_key)?;
    let mut signed = tx.clone();
    signed.input[0].script_sig = spend::payout_script_sig(&sig, spend_secret, commit_script);
    Ok(signed)
}

/// Signs payer claim of a published revoked commit.
pub fn sign_revoke_recover(
    tx: &Transaction,
    payer_key: &PrivateKey,
    commit_script: &Script,
    revoke_secret: &Secret,
) -> Result<Transaction, Error> {
    let sig = sign_input(tx, 0, commit_script, payer_key)?;
    let mut signed = tx.clone();
    signed.input[0].script_sig = spend::revoke_script_sig(&sig, revoke_secret, commit_script);
    Ok(signed)
}

/// Signs payer refund of an expired deposit output.
pub fn sign_expire_recover(
    tx: &Transaction,
    payer_key: &PrivateKey,
    deposit_script: &Script,
) -> Result<Transaction, Error> {
    let sig = sign_input(tx, 0, deposit_script, payer_key)?;
    let mut signed = tx.clone();
    signed.input[0].script_sig = spend::expire_script_sig(&sig, deposit_script);
    Ok(signed)
}

fn check_key(key: &PrivateKey, expected: &PublicKey, role: &str) -> Result<(), Error> {
    if key.public_key(SECP256K1) != *expected {
        return Err(Error::KeyMismatch(format!("{} {}", role, expected)));
    }
    Ok(())
}
