//! Script verification flags.
//!
//! Flags are passed explicitly into every verification call; the chain
//! derives them from deployment state, and tests set them directly.

use bitflags::bitflags;

bitflags! {
    /// Bit flags controlling which script rules are enforced.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct VerifyFlags: u32 {
        const NONE = 0;
        /// Evaluate pay-to-script-hash outputs.
        const P2SH = 1 << 0;
        /// Enforce strict signature and public key encodings.
        const STRICTENC = 1 << 1;
        /// Enforce strict DER signature encoding (BIP 66).
        const DERSIG = 1 << 2;
        /// Reject high-S signatures.
        const LOW_S = 1 << 3;
        /// The multisig dummy element must be empty.
        const NULLDUMMY = 1 << 4;
        /// Unlock scripts must be push-only.
        const SIGPUSHONLY = 1 << 5;
        /// Pushes must use the shortest possible encoding, and script
        /// numbers must be minimal.
        const MINIMALDATA = 1 << 6;
        /// Fail on upgradable NOP opcodes.
        const DISCOURAGE_UPGRADABLE_NOPS = 1 << 7;
        /// Exactly one element must remain after evaluation.
        const CLEANSTACK = 1 << 8;
        /// Evaluate OP_CHECKLOCKTIMEVERIFY (BIP 65).
        const CHECKLOCKTIMEVERIFY = 1 << 9;
        /// Evaluate OP_CHECKSEQUENCEVERIFY (BIP 112).
        const CHECKSEQUENCEVERIFY = 1 << 10;
        /// A failed signature check must carry an empty signature.
        const NULLFAIL = 1 << 14;
        /// Public keys must be compressed.
        const COMPRESSED_PUBKEYTYPE = 1 << 15;
        /// Accept (and require) FORKID signature hashing.
        const SIGHASH_FORKID = 1 << 16;
        /// Mangle the fork value so pre-fork signatures never validate.
        const REPLAY_PROTECTION = 1 << 17;
        /// Enable the OP_CHECKDATASIG opcodes.
        const CHECKDATASIG = 1 << 18;
    }
}

impl VerifyFlags {
    /// The rules every block must pass, independent of deployment state.
    pub fn mandatory() -> VerifyFlags {
        VerifyFlags::P2SH | VerifyFlags::STRICTENC | VerifyFlags::SIGHASH_FORKID
    }

    /// The relay-policy ruleset layered on top of [`VerifyFlags::mandatory`].
    pub fn standard() -> VerifyFlags {
        Self::mandatory()
            | VerifyFlags::DERSIG
            | VerifyFlags::LOW_S
            | VerifyFlags::NULLDUMMY
            | VerifyFlags::MINIMALDATA
            | VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS
            | VerifyFlags::CLEANSTACK
            | VerifyFlags::CHECKLOCKTIMEVERIFY
            | VerifyFlags::CHECKSEQUENCEVERIFY
            | VerifyFlags::NULLFAIL
    }
}
