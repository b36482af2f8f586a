//! Detached OpenPGP signature verification against a trusted keyring.

use pgp::{Deserializable, SignedPublicKey, StandaloneSignature};
use std::io::Cursor;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Fedora's release signing keys, used for CoreOS tooling.
pub const FEDORA_KEYRING_URL: &str = "https://fedoraproject.org/fedora.gpg";

const ARMOR_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";

/// A set of trusted public keys.
#[derive(Debug, Clone)]
pub struct Keyring {
    keys: Vec<SignedPublicKey>,
}

impl Keyring {
    /// Parse a keyring, either ASCII-armored (one or more key blocks) or
    /// binary (concatenated transferable public keys).
    ///
    /// Unparseable keys are skipped; an empty result is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no key could be read.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut keys = Vec::new();
        match std::str::from_utf8(data) {
            Ok(text) if text.contains(ARMOR_HEADER) => {
                for block in text.split(ARMOR_HEADER).skip(1) {
                    let armored = format!("{ARMOR_HEADER}{block}");
                    match SignedPublicKey::from_string(&armored) {
                        Ok((key, _)) => keys.push(key),
                        Err(e) => warn!(error = %e, "Skipping unreadable key block"),
                    }
                }
            }
            _ => {
                for key in SignedPublicKey::from_bytes_many(Cursor::new(data)) {
                    match key {
                        Ok(key) => keys.push(key),
                        Err(e) => warn!(error = %e, "Skipping unreadable key"),
                    }
                }
            }
        }

        if keys.is_empty() {
            return Err(Error::configuration("keyring contains no usable public keys"));
        }
        debug!(count = keys.len(), "Loaded keyring");
        Ok(Self { keys })
    }

    /// Number of primary keys in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring is empty. Always false for a parsed keyring.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Verify an armored detached signature over `content`.
    ///
    /// Succeeds if any primary key or subkey in the ring validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignatureInvalid`] if the signature cannot be parsed
    /// or no key validates it.
    pub fn verify_detached(&self, content: &[u8], armored_signature: &str, tool: &str, asset: &str) -> Result<()> {
        let (signature, _) = StandaloneSignature::from_string(armored_signature)
            .map_err(|e| Error::signature_invalid(tool, asset, format!("unreadable signature: {e}")))?;

        for key in &self.keys {
            if signature.verify(key, content).is_ok() {
                return Ok(());
            }
            if key
                .public_subkeys
                .iter()
                .any(|sub| signature.verify(sub, content).is_ok())
            {
                return Ok(());
            }
        }
        Err(Error::signature_invalid(
            tool,
            asset,
            "no trusted key validates the signature",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Keyring::parse(b"definitely not a key").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    const PAYLOAD: &[u8] = include_bytes!("../tests/fixtures/gpg/payload");
    const TRUSTED_ARMORED: &str = include_str!("../tests/fixtures/gpg/trusted.asc");
    const TRUSTED_BINARY: &[u8] = include_bytes!("../tests/fixtures/gpg/trusted.gpg");
    const GOOD_SIGNATURE: &str = include_str!("../tests/fixtures/gpg/payload.asc");
    const OTHER_SIGNATURE: &str = include_str!("../tests/fixtures/gpg/payload.other.asc");

    #[test]
    fn test_valid_signature_verifies() {
        let keyring = Keyring::parse(TRUSTED_ARMORED.as_bytes()).unwrap();
        assert_eq!(keyring.len(), 1);
        keyring
            .verify_detached(PAYLOAD, GOOD_SIGNATURE, "butane", "butane-x86_64-unknown-linux-gnu")
            .unwrap();
    }

    #[test]
    fn test_binary_keyring_verifies() {
        let keyring = Keyring::parse(TRUSTED_BINARY).unwrap();
        keyring
            .verify_detached(PAYLOAD, GOOD_SIGNATURE, "butane", "butane")
            .unwrap();
    }

    #[test]
    fn test_signature_from_other_key_is_rejected() {
        let keyring = Keyring::parse(TRUSTED_ARMORED.as_bytes()).unwrap();
        let err = keyring
            .verify_detached(PAYLOAD, OTHER_SIGNATURE, "butane", "butane")
            .unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid { .. }), "got {err:?}");
    }

    #[test]
    fn test_tampered_content_is_rejected() {
        let keyring = Keyring::parse(TRUSTED_ARMORED.as_bytes()).unwrap();
        let err = keyring
            .verify_detached(b"butane binary, patched\n", GOOD_SIGNATURE, "butane", "butane")
            .unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid { .. }));
    }

    #[test]
    fn test_unreadable_signature_is_rejected() {
        let keyring = Keyring::parse(TRUSTED_ARMORED.as_bytes()).unwrap();
        let err = keyring
            .verify_detached(PAYLOAD, "not a signature", "butane", "butane")
            .unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid { .. }));
    }

    #[test]
    fn test_parse_rejects_broken_armor() {
        let text = format!("{ARMOR_HEADER}\n\nbm90IGEga2V5\n-----END PGP PUBLIC KEY BLOCK-----\n");
        assert!(Keyring::parse(text.as_bytes()).is_err());
    }
}
