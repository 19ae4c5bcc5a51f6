//! The cashaddr address encoding.
//!
//! A cashaddr is a human-readable network prefix, a colon, and a payload of
//! 5-bit symbols: one version byte (type and hash size class) followed by
//! the payload hash, protected by a 40-bit BCH-code checksum over both the
//! expanded prefix and the payload.

use thiserror::Error;

use crate::parameters::Network;

/// The 32-character symbol alphabet, shared with bech32.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Hash sizes by the version byte's size-class bits. Only the 160-bit class
/// is in use for P2PKH and P2SH.
const HASH_SIZES: [usize; 8] = [20, 24, 28, 32, 40, 48, 56, 64];

/// The number of 5-bit checksum symbols.
const CHECKSUM_LENGTH: usize = 8;

/// The script template a cashaddr pays to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    KeyHash,
    ScriptHash,
}

impl Kind {
    fn type_bits(self) -> u8 {
        match self {
            Kind::KeyHash => 0,
            Kind::ScriptHash => 1,
        }
    }
}

/// Reasons a cashaddr string fails to decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Upper and lower case letters are mixed.
    #[error("Invalid cashaddr casing")]
    InvalidCasing,
    /// A symbol outside the 32-character alphabet.
    #[error("Invalid cashaddr character")]
    InvalidCharacter,
    /// The network prefix is not one we know.
    #[error("Invalid cashaddr prefix")]
    UnknownPrefix,
    /// The checksum over prefix and payload does not verify.
    #[error("Invalid cashaddr checksum")]
    InvalidChecksum,
    /// The final 8-to-5 bit group carries non-zero filler bits.
    #[error("Non zero padding")]
    NonZeroPadding,
    /// The version byte is malformed or names an unknown type.
    #[error("Invalid cashaddr version")]
    InvalidVersion,
    /// The decoded hash does not match the version byte's size class.
    #[error("Invalid cashaddr data length")]
    UnknownDataLength,
}

/// The BCH-code checksum polynomial over 5-bit symbols.
fn polymod(values: &[u8]) -> u64 {
    let mut checksum: u64 = 1;
    for &value in values {
        let top = (checksum >> 35) as u8;
        checksum = ((checksum & 0x07_ffff_ffff) << 5) ^ u64::from(value);
        if top & 0x01 != 0 {
            checksum ^= 0x98_f2bc_8e61;
        }
        if top & 0x02 != 0 {
            checksum ^= 0x79_b76d_99e2;
        }
        if top & 0x04 != 0 {
            checksum ^= 0xf3_3e5f_b3c4;
        }
        if top & 0x08 != 0 {
            checksum ^= 0xae_2eab_e2a8;
        }
        if top & 0x10 != 0 {
            checksum ^= 0x1e_4f43_e470;
        }
    }
    checksum ^ 1
}

/// The prefix is fed into the checksum as its low 5 bits per character,
/// followed by a zero separator.
fn expand_prefix(prefix: &str) -> Vec<u8> {
    let mut expanded: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    expanded.push(0);
    expanded
}

/// Regroup bits most-significant-bit first.
///
/// With `pad` set, leftover bits are flushed with zero fill (encoding).
/// Without it, leftover bits must be pure zero filler shorter than an input
/// group, otherwise the string was padded incorrectly (decoding).
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, Error> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mask: u32 = (1 << to) - 1;
    let mut result = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        debug_assert!(u32::from(value) >> from == 0);
        acc = (acc << from) | u32::from(value);
        bits += from;
        while bits >= to {
            bits -= to;
            result.push(((acc >> bits) & mask) as u8);
        }
    }

    if pad {
        if bits > 0 {
            result.push(((acc << (to - bits)) & mask) as u8);
        }
    } else {
        if bits >= from {
            return Err(Error::UnknownDataLength);
        }
        if ((acc << (to - bits)) & mask) != 0 {
            return Err(Error::NonZeroPadding);
        }
    }

    Ok(result)
}

/// Encode a payload hash as a cashaddr string with the given network prefix.
pub fn encode(prefix: &str, kind: Kind, hash: &[u8]) -> String {
    let size_bits = HASH_SIZES
        .iter()
        .position(|&size| size == hash.len())
        .expect("cashaddr payloads use a known hash size") as u8;
    let version = (kind.type_bits() << 3) | size_bits;

    let mut payload = Vec::with_capacity(1 + hash.len());
    payload.push(version);
    payload.extend_from_slice(hash);
    let data = convert_bits(&payload, 8, 5, true).expect("8-to-5 with padding cannot fail");

    let mut checksum_input = expand_prefix(prefix);
    checksum_input.extend_from_slice(&data);
    checksum_input.extend_from_slice(&[0; CHECKSUM_LENGTH]);
    let checksum = polymod(&checksum_input);

    let mut out = String::with_capacity(prefix.len() + 1 + data.len() + CHECKSUM_LENGTH);
    out.push_str(prefix);
    out.push(':');
    for value in data {
        out.push(CHARSET[value as usize] as char);
    }
    for i in 0..CHECKSUM_LENGTH {
        let value = (checksum >> (5 * (CHECKSUM_LENGTH - 1 - i))) & 0x1f;
        out.push(CHARSET[value as usize] as char);
    }
    out
}

/// Decode a cashaddr string into its network, kind, and payload hash.
///
/// The prefix may be omitted, in which case every known network prefix is
/// tried against the checksum.
pub fn decode(addr: &str) -> Result<(Network, Kind, Vec<u8>), Error> {
    let has_upper = addr.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = addr.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        return Err(Error::InvalidCasing);
    }
    let addr = addr.to_ascii_lowercase();

    match addr.find(':') {
        Some(pos) => {
            let (prefix, payload) = addr.split_at(pos);
            let network = network_for_prefix(prefix).ok_or(Error::UnknownPrefix)?;
            decode_payload(prefix, network, &payload[1..])
        }
        None => {
            for network in &[Network::Mainnet, Network::Testnet, Network::Regtest] {
                let prefix = network.cashaddr_prefix();
                match decode_payload(prefix, *network, &addr) {
                    Ok(decoded) => return Ok(decoded),
                    Err(Error::InvalidChecksum) => continue,
                    Err(other) => return Err(other),
                }
            }
            Err(Error::InvalidChecksum)
        }
    }
}

fn network_for_prefix(prefix: &str) -> Option<Network> {
    for network in &[Network::Mainnet, Network::Testnet, Network::Regtest] {
        if network.cashaddr_prefix() == prefix {
            return Some(*network);
        }
    }
    None
}

fn decode_payload(prefix: &str, network: Network, payload: &str) -> Result<(Network, Kind, Vec<u8>), Error> {
    if payload.len() <= CHECKSUM_LENGTH {
        return Err(Error::UnknownDataLength);
    }

    let mut values = Vec::with_capacity(payload.len());
    for c in payload.bytes() {
        let value = CHARSET
            .iter()
            .position(|&s| s == c)
            .ok_or(Error::InvalidCharacter)?;
        values.push(value as u8);
    }

    let mut checksum_input = expand_prefix(prefix);
    checksum_input.extend_from_slice(&values);
    if polymod(&checksum_input) != 0 {
        return Err(Error::InvalidChecksum);
    }

    let data = &values[..values.len() - CHECKSUM_LENGTH];
    let payload = convert_bits(data, 5, 8, false)?;
    if payload.is_empty() {
        return Err(Error::UnknownDataLength);
    }

    let version = payload[0];
    if version & 0x80 != 0 {
        return Err(Error::InvalidVersion);
    }
    let kind = match (version >> 3) & 0x0f {
        0 => Kind::KeyHash,
        1 => Kind::ScriptHash,
        _ => return Err(Error::InvalidVersion),
    };
    let hash = payload[1..].to_vec();
    if hash.len() != HASH_SIZES[(version & 0x07) as usize] {
        return Err(Error::UnknownDataLength);
    }

    Ok((network, kind, hash))
}
