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

use std::collections::BTreeMap;

use bitcoin::secp256k1::{SecretKey, SECP256K1};
use bitcoin::{Address, Network, PrivateKey};
use mpc::onchain::MemoryChain;
use mpc::scripts::{BlockDelay, Secret, SecretHash};
use mpc::{
    sign, ChannelState, DepositParams, Error, PayeeState, PayerState, PayoutPath, RejectReason,
    TxBuilder,
};

const PRIMES: [u64; 13] = [1, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41];

struct Channel {
    builder: TxBuilder,
    chain: MemoryChain,
    alice_key: PrivateKey,
    bob_key: PrivateKey,
    spend_secret: Secret,
    alice: PayerState,
    bob: PayeeState,
    /// Revoke secrets Bob generated for his requests
    revoke_secrets: BTreeMap<SecretHash, Secret>,
}

fn key(n: u8) -> PrivateKey {
    PrivateKey::new(SecretKey::from_slice(&[n; 32]).unwrap(), Network::Testnet)
}

fn revoke_secret(quantity: u64) -> Secret { Secret::from([quantity as u8; 32]) }

impl Channel {
    /// Alice deposits `quantity` for Bob; the deposit is signed and mined
    fn open(quantity: u64) -> Channel {
        let builder = TxBuilder::default();
        let alice_key = key(0xA1);
        let bob_key = key(0xB0);
        let spend_secret = Secret::from([0x5E; 32]);
        let alice_pubkey = alice_key.public_key(SECP256K1);
        let bob_pubkey = bob_key.public_key(SECP256K1);

        let mut chain = MemoryChain::new();
        chain.fund(Address::p2pkh(&alice_pubkey, Network::Testnet).script_pubkey(), 1_000_000);

        let proposal = PayerState::make_deposit(&builder, &chain, DepositParams {
            asset: "BTC".to_owned(),
            payer_pubkey: alice_pubkey,
            payee_pubkey: bob_pubkey,
            spend_secret_hash: spend_secret.hash(),
            expire_time: BlockDelay::with(42).unwrap(),
            quantity,
        })
        .unwrap();
        let alice = proposal.state;
        let bob = PayeeState::set_deposit(
            Network::Testnet,
            "BTC",
            &alice.deposit.script,
            bob_pubkey,
            spend_secret.hash(),
        )
        .unwrap();
        assert_eq!(alice.deposit_ttl(&chain).unwrap(), None);
        assert_eq!(bob.deposit_ttl(&chain).unwrap(), None);

        let deposit_tx = sign::sign_deposit(&proposal.topublish, &alice_key, &chain).unwrap();
        chain.publish(deposit_tx).unwrap();
        assert_eq!(alice.deposit_ttl(&chain).unwrap(), Some(42));
        assert_eq!(bob.deposit_ttl(&chain).unwrap(), Some(42));

        Channel {
            builder,
            chain,
            alice_key,
            bob_key,
            spend_secret,
            alice,
            bob,
            revoke_secrets: BTreeMap::new(),
        }
    }

    /// Bob requests a commit, Alice creates and signs it, Bob accepts it
    fn pay(&mut self, quantity: u64) {
        let secret = revoke_secret(quantity);
        self.revoke_secrets.insert(secret.hash(), secret);
        self.bob = self.bob.request_commit(quantity, secret.hash()).unwrap();
        let proposal = self
            .alice
            .create_commit(
                &self.builder,
                &self.chain,
                quantity,
                secret.hash(),
                BlockDelay::with(2).unwrap(),
            )
            .unwrap();
        let signed = sign::sign_created_commit(
            &proposal.tosign.commit_rawtx,
            &self.alice_key,
            &proposal.tosign.deposit_script,
        )
        .unwrap();
        self.bob = self
            .bob
            .add_commit(&self.builder, &self.chain, &signed, &proposal.commit_script)
            .unwrap();
        self.alice = proposal.state;
    }

    /// Bob reveals secrets of commits above `quantity` to both parties
    fn revoke_until(&mut self, quantity: u64) -> usize {
        let hashes = self.bob.revoke_hashes_until(quantity, false);
        assert_eq!(hashes, self.alice.revoke_hashes_until(quantity, false));
        let secrets = hashes.iter().map(|hash| self.revoke_secrets[hash]).collect::<Vec<_>>();
        self.bob = self.bob.revoke_all(secrets.clone());
        self.alice = self.alice.revoke_all(secrets);
        hashes.len()
    }
}

#[test]
fn full_lifecycle() {
    let mut channel = Channel::open(41);

    for quantity in PRIMES {
        channel.pay(quantity);
        assert_eq!(channel.bob.transferred_amount(), quantity);
        assert_eq!(channel.alice.transferred_amount(), channel.bob.transferred_amount());
    }
    assert_eq!(channel.bob.commits.commits_active.len(), 13);
    assert!(channel.bob.commits_requested.is_empty());

    assert_eq!(channel.revoke_until(15), 6);
    assert_eq!(channel.bob.transferred_amount(), 17);
    assert_eq!(channel.alice.transferred_amount(), 17);
    assert_eq!(channel.bob.commits.commits_revoked.len(), 6);

    // Bob closes the channel with the highest commit left
    let commit = channel.bob.highest_commit().unwrap().clone();
    assert_eq!(commit.quantity, 17);
    let commit_tx =
        sign::sign_finalize_commit(&commit.rawtx, &channel.bob_key, &channel.bob.deposit.script)
            .unwrap();
    channel.chain.publish(commit_tx.clone()).unwrap();
    assert_eq!(channel.bob.published_commits(&channel.chain).unwrap(), vec![commit_tx.clone()]);
    assert_eq!(channel.alice.published_commits(&channel.chain).unwrap(), vec![commit_tx]);

    let Channel {
        builder,
        mut chain,
        bob,
        alice,
        bob_key,
        spend_secret,
        ..
    } = channel;
    assert!(bob.payouts(&builder, &chain).unwrap().is_empty());
    chain.mine_block();

    let payouts = bob.payouts(&builder, &chain).unwrap();
    assert_eq!(payouts.len(), 1);
    let payout = &payouts[0];
    assert_eq!(payout.path, PayoutPath::Delayed);
    assert_eq!(payout.secret, None);
    assert_eq!(payout.rawtx.output.len(), 1);
    assert_eq!(payout.rawtx.output[0].value, 17);
    assert_eq!(
        payout.rawtx.output[0].script_pubkey,
        Address::p2pkh(&bob.deposit.payee_pubkey, Network::Testnet).script_pubkey()
    );

    let payout_tx =
        sign::sign_payout_recover(&payout.rawtx, &bob_key, &payout.script, &spend_secret).unwrap();
    chain.publish(payout_tx).unwrap();
    assert!(bob.payouts(&builder, &chain).unwrap().is_empty());
    // nothing for Alice before the deposit change expires
    assert!(alice.payouts(&builder, &chain).unwrap().is_empty());
}

#[test]
fn unrequested_revoke_hash_is_rejected() {
    let mut channel = Channel::open(41);
    channel.pay(5);

    let requested = revoke_secret(7);
    let bob = channel.bob.request_commit(7, requested.hash()).unwrap();
    let proposal = channel
        .alice
        .create_commit(
            &channel.builder,
            &channel.chain,
            7,
            Secret::from([0xEE; 32]).hash(),
            BlockDelay::with(2).unwrap(),
        )
        .unwrap();
    let signed = sign::sign_created_commit(
        &proposal.tosign.commit_rawtx,
        &channel.alice_key,
        &proposal.tosign.deposit_script,
    )
    .unwrap();

    let err = bob
        .add_commit(&channel.builder, &channel.chain, &signed, &proposal.commit_script)
        .unwrap_err();
    assert!(matches!(err, Error::CommitRejected(RejectReason::UnrequestedHash(_))));
    assert_eq!(bob.highest_commit(), channel.bob.highest_commit());
    assert_eq!(bob.transferred_amount(), 5);
}

#[test]
fn stale_commits() {
    let mut channel = Channel::open(41);
    channel.pay(11);

    let secret = revoke_secret(3);
    assert!(channel.bob.request_commit(11, secret.hash()).is_ok());
    assert!(matches!(
        channel.bob.request_commit(3, secret.hash()),
        Err(Error::QuantityBelowTransferred {
            requested: 3,
            transferred: 11
        })
    ));
    assert!(matches!(
        channel.alice.create_commit(
            &channel.builder,
            &channel.chain,
            11,
            secret.hash(),
            BlockDelay::with(2).unwrap()
        ),
        Err(Error::StaleCommit {
            quantity: 11,
            current: 11
        })
    ));
}

#[test]
fn published_revoked_commit_is_punished() {
    let mut channel = Channel::open(41);
    channel.pay(5);
    channel.pay(8);
    assert_eq!(channel.revoke_until(5), 1);
    assert_eq!(channel.alice.transferred_amount(), 5);

    // Bob publishes the commit he has revoked
    let revoked = channel.bob.commits.commits_revoked[0].commit.clone();
    assert_eq!(revoked.quantity, 8);
    let cheat_tx =
        sign::sign_finalize_commit(&revoked.rawtx, &channel.bob_key, &channel.bob.deposit.script)
            .unwrap();
    channel.chain.publish(cheat_tx.clone()).unwrap();
    assert_eq!(channel.alice.published_commits(&channel.chain).unwrap(), vec![cheat_tx]);
    assert!(channel.bob.payouts(&channel.builder, &channel.chain).unwrap().is_empty());

    let payouts = channel.alice.payouts(&channel.builder, &channel.chain).unwrap();
    assert_eq!(payouts.len(), 1);
    let payout = &payouts[0];
    assert_eq!(payout.path, PayoutPath::Revoked);
    assert_eq!(payout.secret, Some(revoke_secret(8)));
    assert_eq!(payout.rawtx.output[0].value, 8);

    let punish_tx = sign::sign_revoke_recover(
        &payout.rawtx,
        &channel.alice_key,
        &payout.script,
        &revoke_secret(8),
    )
    .unwrap();
    channel.chain.publish(punish_tx).unwrap();
    assert!(channel.alice.payouts(&channel.builder, &channel.chain).unwrap().is_empty());
}

#[test]
fn expired_deposit_is_refunded() {
    let mut channel = Channel::open(41);
    channel.chain.mine_blocks(40);
    assert_eq!(channel.alice.deposit_ttl(&channel.chain).unwrap(), Some(2));
    assert!(channel.alice.payouts(&channel.builder, &channel.chain).unwrap().is_empty());

    channel.chain.mine_block();
    assert_eq!(channel.alice.deposit_ttl(&channel.chain).unwrap(), Some(1));
    let payouts = channel.alice.payouts(&channel.builder, &channel.chain).unwrap();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].path, PayoutPath::Expired);
    assert_eq!(payouts[0].rawtx.input[0].sequence.0, 42);
    let refund = &payouts[0];
    let refund_tx =
        sign::sign_expire_recover(&refund.rawtx, &channel.alice_key, &refund.script).unwrap();

    channel.chain.mine_block();
    assert!(matches!(
        channel.alice.create_commit(
            &channel.builder,
            &channel.chain,
            1,
            revoke_secret(1).hash(),
            BlockDelay::with(2).unwrap()
        ),
        Err(Error::ExpiredDeposit)
    ));

    channel.chain.publish(refund_tx).unwrap();
    assert!(channel.alice.payouts(&channel.builder, &channel.chain).unwrap().is_empty());
}
