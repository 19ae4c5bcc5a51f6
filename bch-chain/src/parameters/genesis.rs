//! Genesis consensus parameters for each network.

use std::convert::TryFrom;
use std::sync::Arc;

use crate::amount::{Amount, COIN};
use crate::block::{self, Block, Header};
use crate::parameters::Network;
use crate::serialization::datetime_from_wire;
use crate::transaction::{LockTime, Transaction};
use crate::transparent;
use crate::work::difficulty::CompactDifficulty;

/// The previous block hash for the genesis block.
///
/// All known networks use the null value for the parent of the genesis
/// block.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// The newspaper headline embedded in the genesis coinbase, preceded by the
/// original difficulty push.
const GENESIS_COINBASE_DATA: &str =
    "04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e20\
     6272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73";

/// The uncompressed public key the genesis output pays to, as a
/// pay-to-pubkey script.
const GENESIS_OUTPUT_SCRIPT: &str =
    "4104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f355\
     04e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac";

/// Returns the hash for the genesis block in `network`.
pub fn genesis_hash(network: Network) -> block::Hash {
    match network {
        Network::Mainnet => "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        Network::Testnet => "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
        Network::Regtest => "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
    }
    .parse()
    .expect("hard-coded hash parses")
}

/// Builds the genesis block for `network`.
///
/// The coinbase transaction is identical on every network; the headers
/// differ in time, bits, and nonce.
pub fn genesis_block(network: Network) -> Block {
    let coinbase = Transaction::new(
        1,
        vec![transparent::Input::Coinbase {
            data: transparent::CoinbaseData::new(
                hex::decode(GENESIS_COINBASE_DATA).expect("hard-coded data decodes"),
            ),
            sequence: transparent::SEQUENCE_FINAL,
        }],
        vec![transparent::Output {
            value: Amount::try_from(50 * COIN).expect("the genesis subsidy is in range"),
            lock_script: transparent::Script(
                hex::decode(GENESIS_OUTPUT_SCRIPT).expect("hard-coded script decodes"),
            ),
        }],
        LockTime::unlocked(),
    );

    let merkle_root = block::merkle::root_and_mutation(&[coinbase.hash()]).0;

    let (time, bits, nonce) = match network {
        Network::Mainnet => (1_231_006_505, 0x1d00ffff, 2_083_236_893),
        Network::Testnet => (1_296_688_602, 0x1d00ffff, 414_098_458),
        Network::Regtest => (1_296_688_602, 0x207fffff, 2),
    };

    Block {
        header: Header::new(
            1,
            GENESIS_PREVIOUS_BLOCK_HASH,
            merkle_root,
            datetime_from_wire(time),
            CompactDifficulty(bits),
            nonce,
        ),
        transactions: vec![Arc::new(coinbase)],
    }
}
