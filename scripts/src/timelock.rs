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

use std::convert::TryFrom;

use bitcoin::Sequence;

use crate::TemplateError;

/// Relative time lock measured in number of blocks since confirmation of the
/// locked output (`OP_CHECKSEQUENCEVERIFY` height lock).
///
/// Values are always positive and fit into the 16-bit height field of the
/// `nSeq` relative lock encoding.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", try_from = "i64", into = "i64")
)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("{0}")]
pub struct BlockDelay(u16);

impl BlockDelay {
    /// Constructs time lock for a given number of blocks, failing on values
    /// which are not positive or exceed `u16::MAX`.
    pub fn with(blocks: i64) -> Result<Self, TemplateError> {
        match u16::try_from(blocks) {
            Ok(0) | Err(_) => Err(TemplateError::Timelock(blocks)),
            Ok(blocks) => Ok(BlockDelay(blocks)),
        }
    }

    /// Number of blocks in the time lock.
    #[inline]
    pub fn blocks(self) -> u16 { self.0 }

    /// Value for the `nSeq` field of an input spending through the
    /// time-locked branch.
    #[inline]
    pub fn to_sequence(self) -> Sequence { Sequence(self.0 as u32) }

    /// Checks whether an output with the given number of confirmations may
    /// already be spent by a transaction mined in the next block.
    #[inline]
    pub fn is_mature(self, confirmations: u32) -> bool { confirmations >= self.0 as u32 }
}

impl TryFrom<i64> for BlockDelay {
    type Error = TemplateError;

    fn try_from(blocks: i64) -> Result<Self, Self::Error> { BlockDelay::with(blocks) }
}

impl From<BlockDelay> for i64 {
    fn from(delay: BlockDelay) -> Self { delay.0 as i64 }
}
