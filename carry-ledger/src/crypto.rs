//! Cryptographic operations for the carry ledger
//!
//! This module provides:
//! - Ed25519 key pairs for the operator, command signing and verification
//! - The SHA-256 state commitment over `(net_carry, tick_count, last_update_sequence)`

use crate::types::{
    signing_bytes, Carry, CarryState, Command, Identity, Precondition, Signature, SignedCommand,
};
use crate::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// 32-byte state commitment
pub type Commitment = [u8; 32];

/// Ed25519 key pair for signing commands
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Identity of this key pair (public key bytes)
    pub fn identity(&self) -> Identity {
        Identity::from_bytes(self.verifying_key.to_bytes())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::from_bytes(signature.to_bytes())
    }

    /// Sign a command against the state it expects to apply to
    pub fn sign_command(
        &self,
        command: Command,
        precondition: Precondition,
    ) -> Result<SignedCommand> {
        let signature = self.sign(&signing_bytes(&precondition, &command)?);
        Ok(SignedCommand {
            command,
            precondition,
            caller: self.identity(),
            signature,
        })
    }
}

/// Verify a signature with a public key
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &Identity) -> bool {
    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());

    let verifying_key = match VerifyingKey::from_bytes(public_key.as_bytes()) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key.verify(message, &dalek_sig).is_ok()
}

/// Verify a signed command and return the caller it proves
pub fn verify_command(signed: &SignedCommand) -> Result<Identity> {
    let message = signing_bytes(&signed.precondition, &signed.command)?;
    if verify_signature(&message, &signed.signature, &signed.caller) {
        Ok(signed.caller)
    } else {
        Err(Error::SignatureError(format!(
            "signature does not match caller {}",
            signed.caller
        )))
    }
}

/// Encode a signed value into a 32-byte big-endian word, sign-extended
fn signed_word(value: Carry) -> [u8; 32] {
    let fill = if value < 0 { 0xff } else { 0x00 };
    let mut word = [fill; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Encode an unsigned value into a 32-byte big-endian word
fn unsigned_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Canonical 96-byte encoding of the committed state triple
pub fn commitment_preimage(state: &CarryState) -> [u8; 96] {
    let mut buf = [0u8; 96];
    buf[..32].copy_from_slice(&signed_word(state.net_carry));
    buf[32..64].copy_from_slice(&unsigned_word(state.tick_count));
    buf[64..].copy_from_slice(&unsigned_word(state.last_update_sequence));
    buf
}

/// SHA-256 commitment binding `(net_carry, tick_count, last_update_sequence)`
pub fn state_commitment(state: &CarryState) -> Commitment {
    hash_bytes(&commitment_preimage(state))
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LegId;

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let keypair1 = KeyPair::from_seed(&seed);
        let keypair2 = KeyPair::from_seed(&seed);

        // Same seed should produce same identity
        assert_eq!(keypair1.identity(), keypair2.identity());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"carry tick";
        let signature = keypair.sign(message);

        assert!(verify_signature(message, &signature, &keypair.identity()));
        assert!(!verify_signature(b"other", &signature, &keypair.identity()));

        let stranger = KeyPair::generate();
        assert!(!verify_signature(message, &signature, &stranger.identity()));
    }

    #[test]
    fn test_verify_command() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let signed = keypair
            .sign_command(
                Command::PushCarry {
                    leg_id: LegId::from_label("legA"),
                    delta_carry: 500_00000,
                },
                Precondition::default(),
            )
            .unwrap();

        assert_eq!(verify_command(&signed).unwrap(), keypair.identity());
    }

    #[test]
    fn test_verify_command_rejects_tampering() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let mut signed = keypair
            .sign_command(Command::Snapshot { epoch_id: 1 }, Precondition::default())
            .unwrap();
        signed.command = Command::Snapshot { epoch_id: 2 };

        let err = verify_command(&signed).unwrap_err();
        assert!(matches!(err, Error::SignatureError(_)));
    }

    #[test]
    fn test_verify_command_binds_precondition() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let mut signed = keypair
            .sign_command(Command::Snapshot { epoch_id: 1 }, Precondition::default())
            .unwrap();
        signed.precondition.state.tick_count = 5;

        let err = verify_command(&signed).unwrap_err();
        assert!(matches!(err, Error::SignatureError(_)));
    }

    #[test]
    fn test_commitment_preimage_layout() {
        let state = CarryState {
            net_carry: -1,
            tick_count: 2,
            last_update_sequence: 3,
        };
        let buf = commitment_preimage(&state);

        assert!(buf[..32].iter().all(|b| *b == 0xff));
        assert_eq!(buf[63], 2);
        assert!(buf[32..63].iter().all(|b| *b == 0));
        assert_eq!(buf[95], 3);
    }

    #[test]
    fn test_commitment_binds_every_field() {
        let base = CarryState {
            net_carry: 300_00000,
            tick_count: 2,
            last_update_sequence: 105,
        };
        let c = state_commitment(&base);
        assert_eq!(c, state_commitment(&base));

        let mut other = base;
        other.net_carry += 1;
        assert_ne!(c, state_commitment(&other));

        let mut other = base;
        other.tick_count += 1;
        assert_ne!(c, state_commitment(&other));

        let mut other = base;
        other.last_update_sequence += 1;
        assert_ne!(c, state_commitment(&other));
    }
}
