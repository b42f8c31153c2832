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

use bitcoin::Network;

/// Default fee rate, in satoshis per kilobyte
pub const DEFAULT_FEE_PER_KB: u64 = 25_000;
/// Default minimal value of a relayable output, in satoshis
pub const DEFAULT_DUST_SIZE: u64 = 5_430;

/// Fee parameters shared by both channel parties.
///
/// Both parties must use the same policy, since the payee derives commit
/// quantities from output values.
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate", default)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("{fee_per_kb} sat/kB, dust {dust_size} sat")]
pub struct FeePolicy {
    /// Fee rate, in satoshis per kilobyte
    pub fee_per_kb: u64,
    /// Minimal value of an output, in satoshis
    pub dust_size: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy {
            fee_per_kb: DEFAULT_FEE_PER_KB,
            dust_size: DEFAULT_DUST_SIZE,
        }
    }
}

impl FeePolicy {
    /// Fixed fee paid by each channel transaction. Channel transactions are
    /// always below 512 bytes.
    #[inline]
    pub fn channel_fee(self) -> u64 { self.fee_per_kb / 2 }

    /// Value able to fund `factor` channel transactions with dust-sized
    /// outputs.
    #[inline]
    pub fn fee_multiple(self, factor: u64) -> u64 { (self.channel_fee() + self.dust_size) * factor }

    /// Value added to the deposit on top of the channel quantity to fund the
    /// commit, payout and change transactions.
    #[inline]
    pub fn deposit_reserve(self) -> u64 { self.fee_multiple(3) }

    /// Fee for a transaction spending `inputs` P2PKH outputs into `outputs`
    /// outputs.
    pub fn p2pkh_fee(self, inputs: usize, outputs: usize) -> u64 {
        let size = 10 + 148 * inputs as u64 + 34 * outputs as u64;
        (self.fee_per_kb * size + 999) / 1000
    }
}

/// Channel configuration
#[derive(Serialize, Deserialize)]
#[serde(crate = "serde_crate", default)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("{network} ({fee})")]
pub struct Config {
    /// Network of the channel addresses and transactions
    pub network: Network,
    /// Fee policy of the channel transactions
    pub fee: FeePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: Network::Testnet,
            fee: FeePolicy::default(),
        }
    }
}
