//! Encrypted local secret store (spec §4.1). One ciphertext file per
//! `(service, key)` under the vault directory, plus a `vault.toml` holding
//! the PBKDF2 salt and iteration count. Crypto envelope follows the
//! AES-256-GCM / PBKDF2-HMAC-SHA256 pattern used elsewhere in the pack for
//! local credential vaults.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::VaultError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultManifest {
    salt_base64: String,
    iterations: u32,
    created_at: i64,
}

/// A single encrypted secret on disk. Fields mirror the Secret Record shape:
/// `{name, service, key, ciphertext, nonce, created_at, updated_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    pub service: String,
    pub key: String,
    ciphertext_base64: String,
    nonce_base64: String,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct Vault {
    dir: PathBuf,
    manifest: VaultManifest,
    derived_key: [u8; KEY_LEN],
}

impl Vault {
    fn manifest_path(dir: &Path) -> PathBuf {
        dir.join("vault.toml")
    }

    fn record_path(dir: &Path, service: &str, key: &str) -> PathBuf {
        dir.join(format!("{service}__{key}.secret.toml"))
    }

    /// Creates a new vault at `dir`. Fails unless `force` when a manifest
    /// already exists, to avoid orphaning previously stored secrets.
    pub fn init(dir: &Path, master_password: &str, iterations: u32, force: bool) -> Result<Self, VaultError> {
        let manifest_path = Self::manifest_path(dir);
        if manifest_path.exists() && !force {
            return Err(VaultError::AlreadyInitialized(manifest_path));
        }
        std::fs::create_dir_all(dir)?;

        let mut salt = [0u8; 16];
        rand::rng().fill_bytes(&mut salt);
        let manifest = VaultManifest {
            salt_base64: BASE64.encode(salt),
            iterations,
            created_at: Utc::now().timestamp(),
        };

        let derived_key = derive_key(master_password, &salt, iterations);
        write_manifest(dir, &manifest)?;
        set_owner_only_permissions(dir);

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            derived_key,
        })
    }

    /// Opens an existing vault, deriving the content key from `master_password`.
    /// Does not itself verify the password; the first failed `get`/`set`
    /// round-trip will surface `authentication_failed`.
    pub fn open(dir: &Path, master_password: &str) -> Result<Self, VaultError> {
        let manifest_path = Self::manifest_path(dir);
        if !manifest_path.exists() {
            return Err(VaultError::NotInitialized);
        }
        let text = std::fs::read_to_string(&manifest_path)?;
        let manifest: VaultManifest = toml::from_str(&text)?;
        let salt = BASE64
            .decode(&manifest.salt_base64)
            .map_err(VaultError::Base64)?;
        let derived_key = derive_key(master_password, &salt, manifest.iterations);
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            derived_key,
        })
    }

    pub fn set(&self, service: &str, key: &str, value: &str) -> Result<(), VaultError> {
        let (ciphertext, nonce) = self.encrypt(service, key, value.as_bytes())?;
        let path = Self::record_path(&self.dir, service, key);
        let now = Utc::now().timestamp();
        let created_at = match self.get_record(service, key) {
            Ok(existing) => existing.created_at,
            Err(_) => now,
        };
        let record = SecretRecord {
            service: service.to_string(),
            key: key.to_string(),
            ciphertext_base64: BASE64.encode(ciphertext),
            nonce_base64: BASE64.encode(nonce),
            created_at,
            updated_at: now,
        };
        let content = toml::to_string_pretty(&record).map_err(|e| {
            VaultError::Serde(toml::de::Error::custom(e.to_string()))
        })?;
        std::fs::write(&path, content)?;
        set_owner_only_permissions(&path);
        Ok(())
    }

    pub fn get(&self, service: &str, key: &str) -> Result<String, VaultError> {
        let record = self.get_record(service, key)?;
        let ciphertext = BASE64.decode(&record.ciphertext_base64)?;
        let nonce = BASE64.decode(&record.nonce_base64)?;
        let plaintext = self.decrypt(service, key, &ciphertext, &nonce)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::AuthenticationFailed)
    }

    fn get_record(&self, service: &str, key: &str) -> Result<SecretRecord, VaultError> {
        let path = Self::record_path(&self.dir, service, key);
        if !path.exists() {
            return Err(VaultError::NotFound {
                service: service.to_string(),
                key: key.to_string(),
            });
        }
        let text = std::fs::read_to_string(&path)?;
        toml::from_str(&text).map_err(VaultError::Serde)
    }

    /// Lists stored (service, key) pairs; values replaced by a fixed mask
    /// unless `mask` is false.
    pub fn list(&self, mask: bool) -> Result<Vec<(String, String, Option<String>)>, VaultError> {
        let mut out = Vec::new();
        if !self.dir.exists() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".secret.toml") {
                continue;
            }
            let text = std::fs::read_to_string(entry.path())?;
            let record: SecretRecord = toml::from_str(&text).map_err(VaultError::Serde)?;
            let value = if mask {
                None
            } else {
                self.get(&record.service, &record.key).ok()
            };
            out.push((record.service, record.key, value));
        }
        out.sort();
        Ok(out)
    }

    pub fn delete(&self, service: &str, key: &str) -> Result<(), VaultError> {
        let path = Self::record_path(&self.dir, service, key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Imports every `(service, env_var)` pair whose environment variable is
    /// set, storing it under the same key name as the env var.
    pub fn import_env(&self, pairs: &[(&str, &str)]) -> Result<Vec<String>, VaultError> {
        let mut imported = Vec::new();
        for (service, env_var) in pairs {
            if let Ok(value) = std::env::var(env_var) {
                if !value.is_empty() {
                    self.set(service, env_var, &value)?;
                    imported.push((*env_var).to_string());
                }
            }
        }
        Ok(imported)
    }

    /// Exports decrypted secrets as `(service, key, value)` triples.
    pub fn export(&self) -> Result<Vec<(String, String, String)>, VaultError> {
        let mut out = Vec::new();
        for (service, key, _) in self.list(true)? {
            let value = self.get(&service, &key)?;
            out.push((service, key, value));
        }
        Ok(out)
    }

    /// Atomically rotates the master password: stages a new vault under a
    /// temp directory, re-encrypts every record with the new key, then swaps.
    /// The original vault is left untouched on any failure.
    pub fn rotate(&self, new_master_password: &str) -> Result<Vault, VaultError> {
        let staging_dir = self.dir.with_extension("rotating");
        if staging_dir.exists() {
            std::fs::remove_dir_all(&staging_dir)?;
        }

        let result = (|| -> Result<Vault, VaultError> {
            let staged = Vault::init(
                &staging_dir,
                new_master_password,
                self.manifest.iterations,
                true,
            )?;
            for (service, key, _) in self.list(true)? {
                let value = self.get(&service, &key)?;
                staged.set(&service, &key, &value)?;
            }
            Ok(staged)
        })();

        match result {
            Ok(_) => {
                std::fs::remove_dir_all(&self.dir)?;
                std::fs::rename(&staging_dir, &self.dir)?;
                Vault::open(&self.dir, new_master_password)
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging_dir);
                Err(e)
            }
        }
    }

    /// Binds ciphertext to its `(service, key)` slot as AEAD associated data,
    /// so a record can't be copied to a different slot and still decrypt.
    fn associated_data(service: &str, key: &str) -> Vec<u8> {
        format!("{key}:{service}").into_bytes()
    }

    fn encrypt(
        &self,
        service: &str,
        key: &str,
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; NONCE_LEN]), VaultError> {
        let cipher_key = Key::<Aes256Gcm>::from_slice(&self.derived_key);
        let cipher = Aes256Gcm::new(cipher_key);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let aad = Self::associated_data(service, key);
        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| VaultError::AuthenticationFailed)?;
        Ok((ciphertext, nonce_bytes))
    }

    fn decrypt(
        &self,
        service: &str,
        key: &str,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        let cipher_key = Key::<Aes256Gcm>::from_slice(&self.derived_key);
        let cipher = Aes256Gcm::new(cipher_key);
        let nonce = Nonce::from_slice(nonce);
        let aad = Self::associated_data(service, key);
        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| VaultError::AuthenticationFailed)
    }
}

fn derive_key(master_password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(master_password.as_bytes(), salt, iterations, &mut key);
    key
}

fn write_manifest(dir: &Path, manifest: &VaultManifest) -> Result<(), VaultError> {
    let content = toml::to_string_pretty(manifest).map_err(|e| {
        VaultError::Serde(toml::de::Error::custom(e.to_string()))
    })?;
    std::fs::write(Vault::manifest_path(dir), content)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(0o700);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let vault = Vault::init(dir.path(), "correct horse", 1000, false).unwrap();
        vault.set("openai", "OPENAI_API_KEY", "sk-test-123").unwrap();
        assert_eq!(vault.get("openai", "OPENAI_API_KEY").unwrap(), "sk-test-123");
    }

    #[test]
    fn wrong_master_password_fails_without_partial_decrypt() {
        let dir = tempdir().unwrap();
        let vault = Vault::init(dir.path(), "correct horse", 1000, false).unwrap();
        vault.set("openai", "OPENAI_API_KEY", "sk-test-123").unwrap();

        let reopened = Vault::open(dir.path(), "wrong password").unwrap();
        assert!(reopened.get("openai", "OPENAI_API_KEY").is_err());
    }

    #[test]
    fn ciphertext_copied_to_another_slot_fails_to_decrypt() {
        let dir = tempdir().unwrap();
        let vault = Vault::init(dir.path(), "correct horse", 1000, false).unwrap();
        vault.set("openai", "OPENAI_API_KEY", "sk-test-123").unwrap();
        let record = vault.get_record("openai", "OPENAI_API_KEY").unwrap();

        let forged = SecretRecord {
            service: "anthropic".to_string(),
            key: "OPENAI_API_KEY".to_string(),
            ..record
        };
        let content = toml::to_string_pretty(&forged).unwrap();
        std::fs::write(Vault::record_path(dir.path(), "anthropic", "OPENAI_API_KEY"), content).unwrap();

        assert!(vault.get("anthropic", "OPENAI_API_KEY").is_err());
    }

    #[test]
    fn reinit_without_force_fails_over_existing_vault() {
        let dir = tempdir().unwrap();
        Vault::init(dir.path(), "pw", 1000, false).unwrap();
        let result = Vault::init(dir.path(), "pw2", 1000, false);
        assert!(result.is_err());
    }

    #[test]
    fn rotate_preserves_all_secrets_under_new_password() {
        let dir = tempdir().unwrap();
        let vault = Vault::init(dir.path(), "old-pw", 1000, false).unwrap();
        vault.set("anthropic", "ANTHROPIC_API_KEY", "sk-ant-1").unwrap();
        vault.set("gemini", "GEMINI_API_KEY", "g-key-2").unwrap();

        let rotated = vault.rotate("new-pw").unwrap();
        assert_eq!(rotated.get("anthropic", "ANTHROPIC_API_KEY").unwrap(), "sk-ant-1");
        assert_eq!(rotated.get("gemini", "GEMINI_API_KEY").unwrap(), "g-key-2");

        let reopened_old = Vault::open(dir.path(), "old-pw").unwrap();
        assert!(reopened_old.get("anthropic", "ANTHROPIC_API_KEY").is_err());
    }

    #[test]
    fn delete_removes_secret() {
        let dir = tempdir().unwrap();
        let vault = Vault::init(dir.path(), "pw", 1000, false).unwrap();
        vault.set("openai", "OPENAI_API_KEY", "sk-test").unwrap();
        vault.delete("openai", "OPENAI_API_KEY").unwrap();
        assert!(vault.get("openai", "OPENAI_API_KEY").is_err());
    }

    #[test]
    fn list_masks_values_by_default() {
        let dir = tempdir().unwrap();
        let vault = Vault::init(dir.path(), "pw", 1000, false).unwrap();
        vault.set("openai", "OPENAI_API_KEY", "sk-test").unwrap();
        let listed = vault.list(true).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].2.is_none());
    }
}
