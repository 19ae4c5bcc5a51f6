//! Transparent address types: Base58Check and cashaddr encodings.

use std::{fmt, io};

use ripemd::Ripemd160;
use secp256k1::PublicKey;
use sha2::{Digest, Sha256};

#[cfg(test)]
use proptest::{arbitrary::Arbitrary, collection::vec, prelude::*};

use crate::{
    parameters::Network,
    serialization::{CashDeserialize, CashSerialize, SerializationError},
};

use super::{cashaddr, Script};

/// The longest Base58Check address we are willing to parse.
const MAX_BASE58_LENGTH: usize = 55;

/// Magic numbers used to identify what networks Base58Check addresses are
/// associated with.
mod magics {
    pub mod p2sh {
        pub const MAINNET: [u8; 1] = [0x05];
        pub const TESTNET: [u8; 1] = [0xc4];
    }

    pub mod p2pkh {
        pub const MAINNET: [u8; 1] = [0x00];
        pub const TESTNET: [u8; 1] = [0x6f];
    }
}

/// Transparent addresses: a payload hash tagged with its script template.
///
/// In the Base58Check encoding a single byte is prepended to the hash to
/// specify the address type and network. The result is then hashed with
/// sha256d, the first four bytes of the output are appended as a checksum,
/// and the result is Base58 encoded. The cashaddr encoding instead carries a
/// human-readable network prefix and a 40-bit polynomial checksum over
/// 5-bit symbols.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub enum Address {
    /// P2SH (Pay to Script Hash) addresses
    PayToScriptHash {
        /// Production, test, or regression-test network.
        network: Network,
        /// 20 bytes specifying a script hash.
        script_hash: [u8; 20],
    },
    /// P2PKH (Pay to Public Key Hash) addresses
    PayToPublicKeyHash {
        /// Production, test, or regression-test network.
        network: Network,
        /// 20 bytes specifying a public key hash, which is a RIPEMD-160
        /// hash of a SHA-256 hash of an ECDSA key encoding.
        pub_key_hash: [u8; 20],
    },
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut debug_struct = f.debug_struct("TransparentAddress");

        match self {
            Address::PayToScriptHash {
                network,
                script_hash,
            } => debug_struct
                .field("network", network)
                .field("script_hash", &hex::encode(script_hash))
                .finish(),
            Address::PayToPublicKeyHash {
                network,
                pub_key_hash,
            } => debug_struct
                .field("network", network)
                .field("pub_key_hash", &hex::encode(pub_key_hash))
                .finish(),
        }
    }
}

/// Displays as Base58Check, the legacy encoding.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = io::Cursor::new(Vec::new());
        let _ = self.cash_serialize(&mut bytes);

        f.write_str(&bs58::encode(bytes.get_ref()).with_check().into_string())
    }
}

/// Parses an untyped address string.
///
/// Mixed-case strings can only be Base58Check, since cashaddr rejects mixed
/// case outright. Everything else is tried as cashaddr first with Base58 as
/// the fallback.
impl std::str::FromStr for Address {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = s.chars().any(|c| c.is_ascii_lowercase());

        if !(has_upper && has_lower) {
            if let Ok(addr) = Address::from_cashaddr(s) {
                return Ok(addr);
            }
        }
        Address::from_base58(s)
    }
}

impl CashSerialize for Address {
    fn cash_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Address::PayToScriptHash {
                network,
                script_hash,
            } => {
                // Regtest reuses the testnet version bytes.
                match *network {
                    Network::Mainnet => writer.write_all(&magics::p2sh::MAINNET[..])?,
                    _ => writer.write_all(&magics::p2sh::TESTNET[..])?,
                }
                writer.write_all(script_hash)?
            }
            Address::PayToPublicKeyHash {
                network,
                pub_key_hash,
            } => {
                match *network {
                    Network::Mainnet => writer.write_all(&magics::p2pkh::MAINNET[..])?,
                    _ => writer.write_all(&magics::p2pkh::TESTNET[..])?,
                }
                writer.write_all(pub_key_hash)?
            }
        }

        Ok(())
    }
}

impl CashDeserialize for Address {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut version_bytes = [0; 1];
        reader.read_exact(&mut version_bytes)?;

        let mut hash_bytes = [0; 20];
        reader.read_exact(&mut hash_bytes)?;

        match version_bytes {
            magics::p2sh::MAINNET => Ok(Address::PayToScriptHash {
                network: Network::Mainnet,
                script_hash: hash_bytes,
            }),
            magics::p2sh::TESTNET => Ok(Address::PayToScriptHash {
                network: Network::Testnet,
                script_hash: hash_bytes,
            }),
            magics::p2pkh::MAINNET => Ok(Address::PayToPublicKeyHash {
                network: Network::Mainnet,
                pub_key_hash: hash_bytes,
            }),
            magics::p2pkh::TESTNET => Ok(Address::PayToPublicKeyHash {
                network: Network::Testnet,
                pub_key_hash: hash_bytes,
            }),
            _ => Err(SerializationError::Parse("bad addr version/type")),
        }
    }
}

pub trait ToAddressWithNetwork {
    /// Convert `self` to an `Address`, given the current `network`.
    fn to_address(&self, network: Network) -> Address;
}

impl ToAddressWithNetwork for Script {
    fn to_address(&self, network: Network) -> Address {
        Address::PayToScriptHash {
            network,
            script_hash: Address::hash_payload(&self.0[..]),
        }
    }
}

impl ToAddressWithNetwork for PublicKey {
    fn to_address(&self, network: Network) -> Address {
        Address::PayToPublicKeyHash {
            network,
            pub_key_hash: Address::hash_payload(&self.serialize()[..]),
        }
    }
}

impl Address {
    pub fn network(&self) -> Network {
        match self {
            Address::PayToScriptHash { network, .. } => *network,
            Address::PayToPublicKeyHash { network, .. } => *network,
        }
    }

    /// The 20-byte payload hash.
    pub fn hash(&self) -> [u8; 20] {
        match self {
            Address::PayToScriptHash { script_hash, .. } => *script_hash,
            Address::PayToPublicKeyHash { pub_key_hash, .. } => *pub_key_hash,
        }
    }

    /// Parse a Base58Check address.
    pub fn from_base58(s: &str) -> Result<Self, SerializationError> {
        if s.len() > MAX_BASE58_LENGTH {
            return Err(SerializationError::Parse("base58 address too long"));
        }
        let result = &bs58::decode(s).with_check(None).into_vec();

        match result {
            // The checksum has been stripped; a valid payload is the version
            // byte plus the 20-byte hash.
            Ok(bytes) if bytes.len() == 21 => Self::cash_deserialize(&bytes[..]),
            Ok(_) => Err(SerializationError::Parse("bad base58 payload length")),
            Err(_) => Err(SerializationError::Parse("base58 decoding error")),
        }
    }

    /// Encode as cashaddr with this address's network prefix.
    pub fn to_cashaddr(&self) -> String {
        let (kind, hash) = match self {
            Address::PayToPublicKeyHash { pub_key_hash, .. } => {
                (cashaddr::Kind::KeyHash, pub_key_hash)
            }
            Address::PayToScriptHash { script_hash, .. } => {
                (cashaddr::Kind::ScriptHash, script_hash)
            }
        };
        cashaddr::encode(self.network().cashaddr_prefix(), kind, hash)
    }

    /// Parse a cashaddr address, with or without its network prefix.
    pub fn from_cashaddr(s: &str) -> Result<Self, cashaddr::Error> {
        let (network, kind, hash) = cashaddr::decode(s)?;
        let mut hash_bytes = [0u8; 20];
        if hash.len() != 20 {
            return Err(cashaddr::Error::UnknownDataLength);
        }
        hash_bytes.copy_from_slice(&hash);
        Ok(match kind {
            cashaddr::Kind::KeyHash => Address::PayToPublicKeyHash {
                network,
                pub_key_hash: hash_bytes,
            },
            cashaddr::Kind::ScriptHash => Address::PayToScriptHash {
                network,
                script_hash: hash_bytes,
            },
        })
    }

    /// The canonical lock script paying to this address.
    pub fn lock_script(&self) -> Script {
        match self {
            Address::PayToPublicKeyHash { pub_key_hash, .. } => {
                // OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG
                let mut script = Vec::with_capacity(25);
                script.extend_from_slice(&[0x76, 0xa9, 0x14]);
                script.extend_from_slice(pub_key_hash);
                script.extend_from_slice(&[0x88, 0xac]);
                Script(script)
            }
            Address::PayToScriptHash { script_hash, .. } => {
                // OP_HASH160 <hash> OP_EQUAL
                let mut script = Vec::with_capacity(23);
                script.extend_from_slice(&[0xa9, 0x14]);
                script.extend_from_slice(script_hash);
                script.push(0x87);
                Script(script)
            }
        }
    }

    /// A hash of a transparent address payload: RIPEMD-160 of SHA-256.
    ///
    /// The resulting hash is always exactly 20 bytes.
    pub fn hash_payload(bytes: &[u8]) -> [u8; 20] {
        let sha_hash = Sha256::digest(bytes);
        let ripe_hash = Ripemd160::digest(&sha_hash);
        let mut payload = [0u8; 20];
        payload[..].copy_from_slice(&ripe_hash[..]);
        payload
    }
}

#[cfg(test)]
impl Address {
    /// Regtest shares the testnet Base58Check magics, so serialized
    /// addresses can only name mainnet or testnet.
    fn network_strategy() -> impl Strategy<Value = Network> {
        prop_oneof![Just(Network::Mainnet), Just(Network::Testnet)]
    }

    fn p2pkh_strategy() -> impl Strategy<Value = Self> {
        (Self::network_strategy(), vec(any::<u8>(), 20))
            .prop_map(|(network, payload_bytes)| {
                let mut bytes = [0; 20];
                bytes.copy_from_slice(payload_bytes.as_slice());
                Self::PayToPublicKeyHash {
                    network,
                    pub_key_hash: bytes,
                }
            })
            .boxed()
    }

    fn p2sh_strategy() -> impl Strategy<Value = Self> {
        (Self::network_strategy(), vec(any::<u8>(), 20))
            .prop_map(|(network, payload_bytes)| {
                let mut bytes = [0; 20];
                bytes.copy_from_slice(payload_bytes.as_slice());
                Self::PayToScriptHash {
                    network,
                    script_hash: bytes,
                }
            })
            .boxed()
    }
}

#[cfg(test)]
impl Arbitrary for Address {
    type Parameters = ();

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![Self::p2pkh_strategy(), Self::p2sh_strategy()].boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_from_hex(s: &str) -> [u8; 20] {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn p2pkh_mainnet_roundtrip() {
        bch_test::init();

        let addr = Address::PayToPublicKeyHash {
            network: Network::Mainnet,
            pub_key_hash: hash_from_hex("e34cce70c86373273efcc54ce7d2a491bb4a0e84"),
        };

        assert_eq!(format!("{}", addr), "1MirQ9bwyQcGVJPwKUgapu5ouK2E2Ey4gX");
        assert_eq!(
            addr.to_cashaddr(),
            "bitcoincash:qr35ennsep3hxfe7lnz5ee7j5jgmkjswssk2puzvgv"
        );

        let parsed: Address = "1MirQ9bwyQcGVJPwKUgapu5ouK2E2Ey4gX".parse().unwrap();
        assert_eq!(parsed, addr);
        let parsed: Address = "bitcoincash:qr35ennsep3hxfe7lnz5ee7j5jgmkjswssk2puzvgv"
            .parse()
            .unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn p2sh_mainnet_roundtrip() {
        bch_test::init();

        let addr = Address::PayToScriptHash {
            network: Network::Mainnet,
            script_hash: hash_from_hex("f815b036d9bbbce5e9f2a00abd1bf3dc91e95510"),
        };

        assert_eq!(format!("{}", addr), "3QJmV3qfvL9SuYo34YihAf3sRCW3qSinyC");
        assert_eq!(
            addr.to_cashaddr(),
            "bitcoincash:pruptvpkmxamee0f72sq40gm70wfr624zq0yyxtycm"
        );

        let parsed: Address = "3QJmV3qfvL9SuYo34YihAf3sRCW3qSinyC".parse().unwrap();
        assert_eq!(parsed, addr);
        let parsed: Address = "bitcoincash:pruptvpkmxamee0f72sq40gm70wfr624zq0yyxtycm"
            .parse()
            .unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn cashaddr_without_prefix() {
        bch_test::init();

        let with_prefix: Address = "bitcoincash:qr35ennsep3hxfe7lnz5ee7j5jgmkjswssk2puzvgv"
            .parse()
            .unwrap();
        let without_prefix: Address = "qr35ennsep3hxfe7lnz5ee7j5jgmkjswssk2puzvgv"
            .parse()
            .unwrap();
        assert_eq!(with_prefix, without_prefix);
    }

    #[test]
    fn lock_script_templates() {
        bch_test::init();

        let hash = hash_from_hex("e34cce70c86373273efcc54ce7d2a491bb4a0e84");
        let p2pkh = Address::PayToPublicKeyHash {
            network: Network::Mainnet,
            pub_key_hash: hash,
        };
        assert_eq!(
            hex::encode(&p2pkh.lock_script().0),
            "76a914e34cce70c86373273efcc54ce7d2a491bb4a0e8488ac"
        );

        let p2sh = Address::PayToScriptHash {
            network: Network::Mainnet,
            script_hash: hash,
        };
        assert_eq!(
            hex::encode(&p2sh.lock_script().0),
            "a914e34cce70c86373273efcc54ce7d2a491bb4a0e8487"
        );
    }

    #[test]
    fn overlong_base58_rejected() {
        bch_test::init();

        let long = "1".repeat(56);
        assert!(Address::from_base58(&long).is_err());
    }
}

#[cfg(test)]
proptest! {

    #[test]
    fn transparent_address_roundtrip(taddr in any::<Address>()) {
        bch_test::init();

        let mut data = Vec::new();

        taddr.cash_serialize(&mut data).expect("t-addr should serialize");

        let taddr2 = Address::cash_deserialize(&data[..]).expect("randomized t-addr should deserialize");

        prop_assert_eq![taddr, taddr2];
    }

    #[test]
    fn cashaddr_roundtrip(taddr in any::<Address>()) {
        bch_test::init();

        let encoded = taddr.to_cashaddr();
        let decoded = Address::from_cashaddr(&encoded).expect("generated cashaddr should decode");

        prop_assert_eq![taddr, decoded];
    }
}
