//! Instance identity: a stable UUID plus an Ed25519 key pair.
//!
//! The identity is created on first run, persisted as JSON with
//! owner-only permissions, and loaded unchanged on later runs. It signs
//! every activate and snapshot request, so the collector can verify
//! that snapshots come from the registered instance.
//!
//! # File format
//!
//! ```json
//! {
//!   "instance_id": "<uuid-v4>",
//!   "private_key": "<hex, 64-byte Ed25519 keypair>",
//!   "public_key": "<hex, 32-byte Ed25519 public key>"
//! }
//! ```

use std::fs;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey, KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// On-disk identity representation.
#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    instance_id: String,
    private_key: String,
    public_key: String,
}

/// The agent's cryptographic identity. Immutable once loaded.
#[derive(Debug)]
pub struct Identity {
    /// Stable instance identifier (UUID v4).
    pub instance_id: String,
    signing_key: SigningKey,
}

impl Identity {
    /// Load the identity from `path`, generating and persisting a new
    /// one if the file does not exist.
    pub fn load_or_generate(path: &Path) -> Result<Self, AgentError> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::generate(path)
        }
    }

    /// Load an existing identity file.
    ///
    /// Validates hex encodings and key sizes; a corrupt or truncated
    /// file is a fatal error.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let data = fs::read_to_string(path).map_err(|e| {
            AgentError::Identity(format!("reading {}: {e}", path.display()))
        })?;

        let stored: StoredIdentity = serde_json::from_str(&data).map_err(|e| {
            AgentError::Identity(format!("parsing {}: {e}", path.display()))
        })?;

        let private_key = hex::decode(&stored.private_key)
            .map_err(|e| AgentError::Identity(format!("decoding private key: {e}")))?;
        let public_key = hex::decode(&stored.public_key)
            .map_err(|e| AgentError::Identity(format!("decoding public key: {e}")))?;

        let keypair_bytes: [u8; KEYPAIR_LENGTH] =
            private_key.as_slice().try_into().map_err(|_| {
                AgentError::Identity(format!(
                    "invalid private key size: got {}, want {}",
                    private_key.len(),
                    KEYPAIR_LENGTH
                ))
            })?;
        let public_bytes: [u8; PUBLIC_KEY_LENGTH] =
            public_key.as_slice().try_into().map_err(|_| {
                AgentError::Identity(format!(
                    "invalid public key size: got {}, want {}",
                    public_key.len(),
                    PUBLIC_KEY_LENGTH
                ))
            })?;

        let signing_key = SigningKey::from_keypair_bytes(&keypair_bytes)
            .map_err(|e| AgentError::Identity(format!("invalid private key: {e}")))?;

        let verifying_key = VerifyingKey::from_bytes(&public_bytes)
            .map_err(|e| AgentError::Identity(format!("invalid public key: {e}")))?;
        if verifying_key != signing_key.verifying_key() {
            return Err(AgentError::Identity(
                "public key does not match private key".to_owned(),
            ));
        }

        Ok(Self {
            instance_id: stored.instance_id,
            signing_key,
        })
    }

    /// Generate a fresh identity and persist it at `path`.
    pub fn generate(path: &Path) -> Result<Self, AgentError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let identity = Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            signing_key,
        };
        identity.save(path)?;
        Ok(identity)
    }

    /// Persist the identity as JSON with owner-only permissions.
    ///
    /// The parent directory is created with mode 0700 if absent, the
    /// file is written with mode 0600.
    fn save(&self, path: &Path) -> Result<(), AgentError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_private_dir(parent).map_err(|e| {
                    AgentError::Identity(format!(
                        "creating identity directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let stored = StoredIdentity {
            instance_id: self.instance_id.clone(),
            private_key: hex::encode(self.signing_key.to_keypair_bytes()),
            public_key: hex::encode(self.signing_key.verifying_key().to_bytes()),
        };
        let data = serde_json::to_vec_pretty(&stored)
            .map_err(|e| AgentError::Identity(format!("encoding identity: {e}")))?;

        write_private_file(path, &data).map_err(|e| {
            AgentError::Identity(format!("writing {}: {e}", path.display()))
        })?;

        Ok(())
    }

    /// Sign a message, returning the hex-encoded Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }

    /// Hex-encoded public key, as sent in the register request.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Verifying half of the key pair.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

/// Create a directory (and parents) with mode 0700.
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        let mut builder = fs::DirBuilder::new();
        builder.mode(0o700).recursive(true);
        builder.create(path)
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)
    }
}

/// Write a file with mode 0600.
fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(data)
    }
    #[cfg(not(unix))]
    {
        fs::write(path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    #[test]
    fn generate_persist_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let generated = Identity::generate(&path).unwrap();
        let loaded = Identity::load(&path).unwrap();

        assert_eq!(loaded.instance_id, generated.instance_id);
        assert_eq!(loaded.public_key_hex(), generated.public_key_hex());
        assert_eq!(
            loaded.signing_key.to_keypair_bytes(),
            generated.signing_key.to_keypair_bytes()
        );
    }

    #[test]
    fn loaded_key_verifies_generator_signature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let generated = Identity::generate(&path).unwrap();
        let loaded = Identity::load(&path).unwrap();

        let message = b"snapshot body";
        let sig_hex = generated.sign(message);
        let sig_bytes: [u8; 64] = hex::decode(sig_hex).unwrap().try_into().unwrap();
        let signature = Signature::from_bytes(&sig_bytes);

        loaded
            .verifying_key()
            .verify(message, &signature)
            .expect("signature should verify with the loaded key");
    }

    #[test]
    fn load_or_generate_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let first = Identity::load_or_generate(&path).unwrap();
        let second = Identity::load_or_generate(&path).unwrap();
        assert_eq!(first.instance_id, second.instance_id);
        assert_eq!(first.public_key_hex(), second.public_key_hex());
    }

    #[test]
    fn instance_id_is_uuid_v4() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let identity = Identity::generate(&path).unwrap();

        let parsed = uuid::Uuid::parse_str(&identity.instance_id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn identity_file_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let subdir = dir.path().join("state");
        let path = subdir.join("identity.json");
        Identity::generate(&path).unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);

        let dir_mode = fs::metadata(&subdir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn wrong_private_key_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let stored = StoredIdentity {
            instance_id: "00000000-0000-4000-8000-000000000000".to_owned(),
            private_key: hex::encode([0u8; 32]),
            public_key: hex::encode([0u8; 32]),
        };
        fs::write(&path, serde_json::to_vec(&stored).unwrap()).unwrap();

        let err = Identity::load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid private key size"));
    }

    #[test]
    fn wrong_public_key_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let key = SigningKey::generate(&mut OsRng);
        let stored = StoredIdentity {
            instance_id: "00000000-0000-4000-8000-000000000000".to_owned(),
            private_key: hex::encode(key.to_keypair_bytes()),
            public_key: hex::encode([0u8; 16]),
        };
        fs::write(&path, serde_json::to_vec(&stored).unwrap()).unwrap();

        let err = Identity::load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid public key size"));
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let stored = StoredIdentity {
            instance_id: "00000000-0000-4000-8000-000000000000".to_owned(),
            private_key: hex::encode(key.to_keypair_bytes()),
            public_key: hex::encode(other.verifying_key().to_bytes()),
        };
        fs::write(&path, serde_json::to_vec(&stored).unwrap()).unwrap();

        let err = Identity::load(&path).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn invalid_hex_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(
            &path,
            r#"{"instance_id":"x","private_key":"zz","public_key":"zz"}"#,
        )
        .unwrap();

        let err = Identity::load(&path).unwrap_err();
        assert!(err.to_string().contains("decoding"));
    }

    #[test]
    fn garbage_file_is_rejected_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, "not json").unwrap();

        let err = Identity::load(&path).unwrap_err();
        assert!(err.to_string().contains("identity.json"));
    }
}
