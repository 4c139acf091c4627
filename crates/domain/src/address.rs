//! Public account addresses in the ledger's `G...` strkey form.
//!
//! ```text
//! ┌──────────────┬──────────┬─────────────────────────────────────┐
//! │ version byte │ 1 byte   │ 6 << 3 (ed25519 public key)         │
//! │ key          │ 32 bytes │ raw ed25519 public key              │
//! │ checksum     │ 2 bytes  │ CRC16-XMODEM of the above, LE       │
//! └──────────────┴──────────┴─────────────────────────────────────┘
//! ```
//!
//! The 35 raw bytes are base32 encoded (RFC 4648, no padding) into 56 chars.

use std::{fmt, str::FromStr};

use crc::{Crc, CRC_16_XMODEM};
use data_encoding::BASE32_NOPAD;
use thiserror::Error;

const ACCOUNT_VERSION_BYTE: u8 = 6 << 3;
const RAW_LEN: usize = 35;
/// Encoded length of an account address.
pub const ADDRESS_LENGTH: usize = 56;

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("account address must be exactly {ADDRESS_LENGTH} characters")]
    WrongLength,
    #[error("account address is not valid base32")]
    Encoding,
    #[error("address is not an account public key (version byte {0:#04x})")]
    VersionByte(u8),
    #[error("account address checksum mismatch")]
    Checksum,
}

/// A validated account address. Equality is on the underlying key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccountAddress {
    key: [u8; 32],
    encoded: String,
}

impl AccountAddress {
    pub fn from_public_key(key: [u8; 32]) -> Self {
        let mut raw = Vec::with_capacity(RAW_LEN);
        raw.push(ACCOUNT_VERSION_BYTE);
        raw.extend_from_slice(&key);
        let checksum = XMODEM.checksum(&raw);
        raw.extend_from_slice(&checksum.to_le_bytes());

        Self {
            key,
            encoded: BASE32_NOPAD.encode(&raw),
        }
    }

    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let address = address.trim();
        if address.len() != ADDRESS_LENGTH {
            return Err(AddressError::WrongLength);
        }

        let raw = BASE32_NOPAD
            .decode(address.as_bytes())
            .map_err(|_| AddressError::Encoding)?;
        if raw.len() != RAW_LEN {
            return Err(AddressError::Encoding);
        }
        if raw[0] != ACCOUNT_VERSION_BYTE {
            return Err(AddressError::VersionByte(raw[0]));
        }

        let (body, checksum) = raw.split_at(RAW_LEN - 2);
        let expected = XMODEM.checksum(body).to_le_bytes();
        if checksum != expected {
            return Err(AddressError::Checksum);
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&body[1..]);
        Ok(Self {
            key,
            encoded: address.to_string(),
        })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for AccountAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccountAddress").field(&self.encoded).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "GDRXE2BQUC3AZNPVFSCEZ76NJ3WWL25FYFK6RGZGIEKWE4SOOHSUJUJ6";

    #[test]
    fn parses_and_reencodes_account_address() {
        let address = AccountAddress::parse(SAMPLE).expect("valid address");
        let rebuilt = AccountAddress::from_public_key(*address.as_bytes());

        assert_eq!(rebuilt.as_str(), SAMPLE);
        assert_eq!(rebuilt, address);
    }

    #[test]
    fn encoded_keys_round_trip() {
        let address = AccountAddress::from_public_key([7u8; 32]);
        assert_eq!(address.as_str().len(), ADDRESS_LENGTH);
        assert!(address.as_str().starts_with('G'));
        assert_eq!(AccountAddress::parse(address.as_str()), Ok(address));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut corrupted = SAMPLE.to_string();
        corrupted.replace_range(10..11, if &SAMPLE[10..11] == "A" { "B" } else { "A" });

        let err = AccountAddress::parse(&corrupted).unwrap_err();
        assert_eq!(err, AddressError::Checksum);
    }

    #[test]
    fn rejects_wrong_length_and_alphabet() {
        assert_eq!(
            AccountAddress::parse("GABC"),
            Err(AddressError::WrongLength)
        );
        let lowercase = SAMPLE.to_ascii_lowercase();
        assert_eq!(
            AccountAddress::parse(&lowercase),
            Err(AddressError::Encoding)
        );
    }

    #[test]
    fn rejects_secret_seed_version() {
        // Secret seeds share the format but carry version byte 18 << 3.
        let mut raw = vec![18u8 << 3];
        raw.extend_from_slice(&[1u8; 32]);
        let checksum = XMODEM.checksum(&raw);
        raw.extend_from_slice(&checksum.to_le_bytes());
        let seed = BASE32_NOPAD.encode(&raw);

        assert_eq!(
            AccountAddress::parse(&seed),
            Err(AddressError::VersionByte(18 << 3))
        );
    }
}
