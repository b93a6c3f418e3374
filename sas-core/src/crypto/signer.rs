//! In-process signer implementations
//!
//! `MemorySigner` holds a secp256k1 keypair in memory with secure erasure on
//! drop; `EnvSigner` is the same signer sourced from an environment variable,
//! the recommended shape for deployments that inject secrets at runtime.

use std::env;
use std::fmt;

use secp256k1::schnorr::Signature;
use secp256k1::{All, Keypair, Message, Secp256k1};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{Signer, SignerError, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

/// A signer holding its 32-byte secret in memory.
///
/// # Security
/// The secret bytes are zeroized when the signer is dropped. The public key
/// is cached separately so accessors never touch secret material, and the
/// `Debug` implementation redacts it. There is intentionally no accessor for
/// the secret and no serde support.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MemorySigner {
    /// Raw secret key bytes, erased on drop.
    secret: [u8; 32],
    /// Cached x-only public key. Public information, no zeroization needed.
    #[zeroize(skip)]
    public_key: [u8; PUBLIC_KEY_SIZE],
    /// Keypair used for signing. Holds a copy of the secret internally,
    /// which is why the struct-level erasure keeps the raw bytes too.
    #[zeroize(skip)]
    keypair: Keypair,
    #[zeroize(skip)]
    secp: Secp256k1<All>,
}

impl MemorySigner {
    /// Create a signer from raw secret bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, SignerError> {
        let secp = Secp256k1::new();
        let keypair =
            Keypair::from_seckey_slice(&secp, secret).map_err(|_| SignerError::InvalidSecret)?;
        let (xonly, _parity) = keypair.x_only_public_key();

        Ok(MemorySigner {
            secret: *secret,
            public_key: xonly.serialize(),
            keypair,
            secp,
        })
    }

    /// Create a signer from a 64-character hex secret.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, SignerError> {
        if secret_hex.len() != 64 {
            return Err(SignerError::InvalidSecret);
        }
        let decoded =
            Zeroizing::new(hex::decode(secret_hex).map_err(|_| SignerError::InvalidSecret)?);
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&decoded);
        Self::from_secret_bytes(&secret)
    }

    /// Generate a signer with a fresh random key.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut rand::thread_rng());
        let (xonly, _parity) = keypair.x_only_public_key();
        MemorySigner {
            secret: keypair.secret_bytes(),
            public_key: xonly.serialize(),
            keypair,
            secp,
        }
    }

    /// Verify a signature produced for this signer's key.
    pub fn verify(&self, digest: &[u8; 32], signature: &[u8; SIGNATURE_SIZE]) -> bool {
        let Ok(message) = Message::from_digest_slice(digest) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        let (xonly, _parity) = self.keypair.x_only_public_key();
        self.secp
            .verify_schnorr(&signature, &message, &xonly)
            .is_ok()
    }
}

impl Signer for MemorySigner {
    fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key
    }

    fn sign(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_SIZE], SignerError> {
        let message = Message::from_digest_slice(digest)
            .map_err(|_| SignerError::InvalidDigest(digest.len()))?;
        let signature = self.secp.sign_schnorr(&message, &self.keypair);
        Ok(*signature.as_ref())
    }
}

impl fmt::Debug for MemorySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySigner")
            .field("public_key", &hex::encode(self.public_key))
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A signer whose secret comes from a named environment variable.
pub struct EnvSigner {
    inner: MemorySigner,
    var: String,
}

impl EnvSigner {
    /// Default environment variable consulted by `EnvSigner::new`.
    pub const DEFAULT_VAR: &'static str = "SAS_PRIVATE_KEY";

    pub fn new() -> Result<Self, SignerError> {
        Self::from_var(Self::DEFAULT_VAR)
    }

    pub fn from_var(var: &str) -> Result<Self, SignerError> {
        let secret_hex = Zeroizing::new(
            env::var(var).map_err(|_| SignerError::MissingEnvVar(var.to_string()))?,
        );
        Ok(EnvSigner {
            inner: MemorySigner::from_secret_hex(&secret_hex)?,
            var: var.to_string(),
        })
    }
}

impl Signer for EnvSigner {
    fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.inner.public_key()
    }

    fn sign(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_SIZE], SignerError> {
        self.inner.sign(digest)
    }
}

impl fmt::Debug for EnvSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSigner")
            .field("var", &self.var)
            .field("public_key", &hex::encode(self.inner.public_key()))
            .field("secret", &"<redacted>")
            .finish()
    }
}
