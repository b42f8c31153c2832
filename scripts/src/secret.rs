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

//! Hash-locked secrets: spend secrets unlocking payouts and revocation
//! secrets voiding superseded commits.

use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use bitcoin::hashes::hex::{FromHex, ToHex};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::rand::{thread_rng, RngCore};
#[cfg(feature = "serde")]
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::TemplateError;

/// One-time 32-byte secret; its [`SecretHash`] is committed into channel
/// scripts before the secret itself is revealed.
#[cfg_attr(feature = "serde", derive(SerializeDisplay, DeserializeFromStr))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Secret([u8; 32]);

impl Secret {
    /// Generates new secret from the thread-local cryptographic random
    /// number generator.
    pub fn random() -> Self {
        let mut data = [0u8; 32];
        thread_rng().fill_bytes(&mut data);
        Secret(data)
    }

    /// Constructs secret from a byte slice, which must be exactly 32 bytes
    /// long.
    pub fn from_slice(data: &[u8]) -> Result<Self, TemplateError> {
        let mut secret = [0u8; 32];
        if data.len() != secret.len() {
            return Err(TemplateError::SecretLength(data.len()));
        }
        secret.copy_from_slice(data);
        Ok(Secret(secret))
    }

    /// Computes hash lock (HASH160) of the secret.
    pub fn hash(&self) -> SecretHash { SecretHash(hash160::Hash::hash(&self.0)) }

    /// Returns secret bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }
}

impl From<[u8; 32]> for Secret {
    fn from(data: [u8; 32]) -> Self { Secret(data) }
}

impl AsRef<[u8]> for Secret {
    fn as_ref(&self) -> &[u8] { &self.0[..] }
}

impl Borrow<[u8]> for Secret {
    fn borrow(&self) -> &[u8] { &self.0[..] }
}

impl Display for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0[..].to_hex()) }
}

impl FromStr for Secret {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = Vec::<u8>::from_hex(s)?;
        Secret::from_slice(&data)
    }
}

/// HASH160 commitment to a [`Secret`], as it is embedded into deposit and
/// commit scripts.
#[cfg_attr(feature = "serde", derive(SerializeDisplay, DeserializeFromStr))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SecretHash(hash160::Hash);

impl SecretHash {
    /// Constructs hash lock from a byte slice, which must be exactly 20
    /// bytes long.
    pub fn from_slice(data: &[u8]) -> Result<Self, TemplateError> {
        hash160::Hash::from_slice(data)
            .map(SecretHash)
            .map_err(|_| TemplateError::HashLength(data.len()))
    }

    /// Checks whether the provided secret is the preimage of this hash.
    #[inline]
    pub fn is_unlocked_by(&self, secret: &Secret) -> bool { secret.hash() == *self }
}

impl From<Secret> for SecretHash {
    fn from(secret: Secret) -> Self { secret.hash() }
}

impl AsRef<[u8]> for SecretHash {
    fn as_ref(&self) -> &[u8] { &self.0[..] }
}

impl Borrow<[u8]> for SecretHash {
    fn borrow(&self) -> &[u8] { &self.0[..] }
}

impl Display for SecretHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0[..].to_hex()) }
}

impl FromStr for SecretHash {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = Vec::<u8>::from_hex(s)?;
        SecretHash::from_slice(&data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_commits_to_secret() {
        let secret = Secret::from([7u8; 32]);
        let hash = secret.hash();
        assert!(hash.is_unlocked_by(&secret));
        assert!(!hash.is_unlocked_by(&Secret::from([8u8; 32])));
        assert_eq!(hash, SecretHash::from(secret));
    }

    #[test]
    fn random_secrets_differ() {
        assert_ne!(Secret::random(), Secret::random());
    }

    #[test]
    fn hex_encoding() {
        let secret = Secret::from([0xab; 32]);
        assert_eq!(secret.to_string(), "ab".repeat(32));
        assert_eq!(Secret::from_str(&secret.to_string()), Ok(secret));

        let hash = secret.hash();
        assert_eq!(hash.to_string().len(), 40);
        assert_eq!(SecretHash::from_str(&hash.to_string()), Ok(hash));
    }

    #[test]
    fn wrong_lengths() {
        assert_eq!(SecretHash::from_slice(&[0u8; 32]), Err(TemplateError::HashLength(32)));
        assert_eq!(SecretHash::from_str("00ff"), Err(TemplateError::HashLength(2)));
        assert_eq!(Secret::from_slice(&[0u8; 20]), Err(TemplateError::SecretLength(20)));
        assert_eq!(Secret::from_str("zz"), Err(TemplateError::Hex));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_as_hex_string() {
        let hash = Secret::from([1u8; 32]).hash();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash));
        assert_eq!(serde_json::from_str::<SecretHash>(&json).unwrap(), hash);
    }
}
