//! Recovery-phrase to signing-key derivation.
//!
//! The phrase is validated against the English BIP-39 wordlist (including its
//! checksum), stretched into a 64-byte seed, and walked down a hardened-only
//! SLIP-0010 ed25519 path. The resulting key never leaves [`Keypair`].

use std::fmt;

use bip39::{Language, Mnemonic};
use ed25519_dalek::{Signer, SigningKey};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::address::AccountAddress;

/// Default derivation path for the watched account.
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/314159'/0'";

const HARDENED_OFFSET: u32 = 0x8000_0000;
const ED25519_CURVE_KEY: &[u8] = b"ed25519 seed";

type HmacSha512 = Hmac<Sha512>;
type Secret32Pair = (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid recovery phrase")]
    InvalidRecoveryPhrase,
    #[error("invalid derivation path `{0}`")]
    InvalidPath(String),
    #[error("key derivation failed: {0}")]
    Derivation(String),
}

/// Recovery phrase held only long enough to derive a key.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct RecoveryPhrase(String);

impl RecoveryPhrase {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(phrase.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryPhrase(***)")
    }
}

/// Hardened-only derivation path such as `m/44'/314159'/0'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    pub fn parse(path: &str) -> Result<Self, KeyError> {
        let invalid = || KeyError::InvalidPath(path.to_string());
        let mut segments = path.trim().split('/');
        if segments.next() != Some("m") {
            return Err(invalid());
        }

        let indices = segments
            .map(|segment| {
                let index = segment
                    .strip_suffix('\'')
                    .or_else(|| segment.strip_suffix('h'))
                    .ok_or_else(invalid)?;
                let index: u32 = index.parse().map_err(|_| invalid())?;
                if index >= HARDENED_OFFSET {
                    return Err(invalid());
                }
                Ok(index + HARDENED_OFFSET)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if indices.is_empty() {
            return Err(invalid());
        }
        Ok(Self(indices))
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }
}

impl Default for DerivationPath {
    /// `m/44'/314159'/0'`
    fn default() -> Self {
        Self(vec![
            44 + HARDENED_OFFSET,
            314_159 + HARDENED_OFFSET,
            HARDENED_OFFSET,
        ])
    }
}

/// Signing keypair for the watched account.
///
/// `Debug` prints the public address only; the signing key is zeroized on
/// drop and is reachable solely through transaction signing.
pub struct Keypair {
    address: AccountAddress,
    signing_key: SigningKey,
}

impl Keypair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        let signing_key = SigningKey::from_bytes(&seed);
        let address = AccountAddress::from_public_key(signing_key.verifying_key().to_bytes());
        Self {
            address,
            signing_key,
        }
    }

    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    pub fn public_key(&self) -> [u8; 32] {
        *self.address.as_bytes()
    }

    /// Last four bytes of the public key, attached to each signature.
    pub(crate) fn signature_hint(&self) -> [u8; 4] {
        let key = self.address.as_bytes();
        [key[28], key[29], key[30], key[31]]
    }

    pub(crate) fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .field("signing_key", &"***")
            .finish()
    }
}

/// Validates `phrase` and derives the keypair at `path`.
pub fn derive_keypair(
    phrase: &RecoveryPhrase,
    path: &DerivationPath,
) -> Result<Keypair, KeyError> {
    let normalized = Zeroizing::new(
        phrase
            .expose()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    );
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|_| KeyError::InvalidRecoveryPhrase)?;
    let seed = Zeroizing::new(mnemonic.to_seed(""));

    let (mut key, mut chain_code) = slip10_step(ED25519_CURVE_KEY, &[&seed[..]])?;
    for index in path.indices() {
        let (child_key, child_chain) = slip10_step(
            &chain_code[..],
            &[&[0u8][..], &key[..], &index.to_be_bytes()[..]],
        )?;
        key = child_key;
        chain_code = child_chain;
    }

    Ok(Keypair::from_seed(*key))
}

/// One HMAC-SHA512 round; returns (key, chain code).
fn slip10_step(hmac_key: &[u8], data: &[&[u8]]) -> Result<Secret32Pair, KeyError> {
    let mut mac = HmacSha512::new_from_slice(hmac_key)
        .map_err(|err| KeyError::Derivation(err.to_string()))?;
    for chunk in data {
        mac.update(chunk);
    }
    let mut output = Zeroizing::new([0u8; 64]);
    output.copy_from_slice(&mac.finalize().into_bytes());

    let mut key = Zeroizing::new([0u8; 32]);
    let mut chain_code = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&output[..32]);
    chain_code.copy_from_slice(&output[32..]);
    Ok((key, chain_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str =
        "illness spike retreat truth genius clock brain pass fit cave bargain toe";

    #[test]
    fn derives_known_account_for_reference_path() {
        let path = DerivationPath::parse("m/44'/148'/0'").unwrap();
        let keypair = derive_keypair(&RecoveryPhrase::new(PHRASE), &path).expect("derives");
        assert_eq!(
            keypair.address().as_str(),
            "GDRXE2BQUC3AZNPVFSCEZ76NJ3WWL25FYFK6RGZGIEKWE4SOOHSUJUJ6"
        );
    }

    #[test]
    fn derivation_is_deterministic_and_path_sensitive() {
        let path = DerivationPath::parse(DEFAULT_DERIVATION_PATH).unwrap();
        let phrase = RecoveryPhrase::new(PHRASE);
        let a = derive_keypair(&phrase, &path).unwrap();
        let spaced = RecoveryPhrase::new(format!("  {}  ", PHRASE.replace(' ', "   ")));
        let b = derive_keypair(&spaced, &path).unwrap();
        assert_eq!(a.address(), b.address());

        let other = DerivationPath::parse("m/44'/314159'/1'").unwrap();
        let c = derive_keypair(&phrase, &other).unwrap();
        assert_ne!(a.address(), c.address());
    }

    #[test]
    fn rejects_bad_checksum_and_unknown_words() {
        let path = DerivationPath::parse(DEFAULT_DERIVATION_PATH).unwrap();
        // All-zero entropy only checksums with "about" as the final word.
        let bad_checksum = vec!["abandon"; 12].join(" ");
        assert_eq!(
            derive_keypair(&RecoveryPhrase::new(bad_checksum), &path).unwrap_err(),
            KeyError::InvalidRecoveryPhrase
        );
        assert_eq!(
            derive_keypair(&RecoveryPhrase::new("not a real phrase"), &path).unwrap_err(),
            KeyError::InvalidRecoveryPhrase
        );
        assert_eq!(
            derive_keypair(&RecoveryPhrase::new(""), &path).unwrap_err(),
            KeyError::InvalidRecoveryPhrase
        );
    }

    #[test]
    fn path_parser_requires_hardened_segments() {
        assert_eq!(
            DerivationPath::parse("m/44'/314159'/0'").unwrap().indices(),
            &[44 + HARDENED_OFFSET, 314_159 + HARDENED_OFFSET, HARDENED_OFFSET]
        );
        assert!(DerivationPath::parse("m/44'/314159'/0").is_err());
        assert!(DerivationPath::parse("44'/0'").is_err());
        assert!(DerivationPath::parse("m").is_err());
        assert!(DerivationPath::parse("m/x'").is_err());
        assert_eq!(
            DerivationPath::default(),
            DerivationPath::parse(DEFAULT_DERIVATION_PATH).unwrap()
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let phrase = RecoveryPhrase::new(PHRASE);
        assert_eq!(format!("{phrase:?}"), "RecoveryPhrase(***)");

        let keypair = Keypair::from_seed([3u8; 32]);
        let rendered = format!("{keypair:?}");
        assert!(rendered.contains(keypair.address().as_str()));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn signatures_verify_against_public_key() {
        use ed25519_dalek::{Signature, Verifier, VerifyingKey};

        let keypair = Keypair::from_seed([5u8; 32]);
        let signature = Signature::from_bytes(&keypair.sign(b"payload"));
        let verifying = VerifyingKey::from_bytes(&keypair.public_key()).unwrap();
        assert!(verifying.verify(b"payload", &signature).is_ok());
        assert_eq!(&keypair.signature_hint(), &keypair.public_key()[28..]);
    }
}
