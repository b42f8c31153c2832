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

use bitcoin::consensus::encode::{deserialize, serialize_hex};
use bitcoin::hashes::hex::FromHex;
use bitcoin::Transaction;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use serde_with::{DeserializeAs, SerializeAs};

/// Serializes transactions as hex strings of their consensus encoding, the
/// format used by bitcoin nodes for raw transactions.
///
/// Use as `#[serde(with = "As::<TxHex>")]`.
pub struct TxHex;

impl SerializeAs<Transaction> for TxHex {
    fn serialize_as<S>(tx: &Transaction, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&serialize_hex(tx))
    }
}

impl<'de> DeserializeAs<'de, Transaction> for TxHex {
    fn deserialize_as<D>(deserializer: D) -> Result<Transaction, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        let data = Vec::<u8>::from_hex(&hex).map_err(D::Error::custom)?;
        deserialize(&data).map_err(D::Error::custom)
    }
}
