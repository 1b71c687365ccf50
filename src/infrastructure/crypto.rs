use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key file not found: {}", .0.display())]
    KeyFileNotFound(PathBuf),
    #[error("could not read key file {}: {source}", .path.display())]
    KeyFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {kind} key")]
    InvalidKey { kind: &'static str },
    #[error("encryption failed: {0}")]
    Encrypt(rsa::Error),
    #[error("signing failed: {0}")]
    Sign(rsa::signature::Error),
    #[error("signature verification failed for {0}")]
    InvalidSignature(&'static str),
}

/// Gateway public key plus merchant private key. Loaded once, at adapter construction.
#[derive(Clone)]
pub struct RsaKeyPair {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl RsaKeyPair {
    pub fn new(public: RsaPublicKey, private: RsaPrivateKey) -> Self {
        Self { public, private }
    }

    /// Reads both PEM files. Either one missing is fatal.
    pub fn load(public_path: &Path, private_path: &Path) -> Result<Self, CryptoError> {
        let public_pem = read_key_file(public_path)?;
        let private_pem = read_key_file(private_path)?;
        Ok(Self::new(
            parse_public_key(&public_pem)?,
            parse_private_key(&private_pem)?,
        ))
    }

    /// RSA PKCS#1 v1.5 encryption with the gateway public key, base64-encoded.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut rng = rand::thread_rng();
        let ciphertext = self
            .public
            .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext.as_bytes())
            .map_err(CryptoError::Encrypt)?;
        Ok(BASE64_STANDARD.encode(ciphertext))
    }

    /// RSA-SHA1 signature with the merchant private key, base64-encoded.
    pub fn sign(&self, canonical: &str) -> Result<String, CryptoError> {
        let signing_key = SigningKey::<Sha1>::new(self.private.clone());
        let signature = signing_key
            .try_sign(canonical.as_bytes())
            .map_err(CryptoError::Sign)?;
        Ok(BASE64_STANDARD.encode(signature.to_bytes()))
    }

    /// RSA-SHA1 verification against the gateway public key. Undecodable
    /// signatures verify as false.
    pub fn verify(&self, data: &str, signature_b64: &str) -> bool {
        let Ok(raw) = BASE64_STANDARD.decode(signature_b64.trim()) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(raw.as_slice()) else {
            return false;
        };
        VerifyingKey::<Sha1>::new(self.public.clone())
            .verify(data.as_bytes(), &signature)
            .is_ok()
    }
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair").finish_non_exhaustive()
    }
}

fn read_key_file(path: &Path) -> Result<String, CryptoError> {
    if !path.exists() {
        return Err(CryptoError::KeyFileNotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path).map_err(|source| CryptoError::KeyFileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded key file");
    Ok(contents.trim().to_string())
}

/// Accepts SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|_| CryptoError::InvalidKey { kind: "public" })
}

/// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM.
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| CryptoError::InvalidKey { kind: "private" })
}
