use argon2::{
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::{HasherKind, PasswordConfig};

/// One-way password hashing with a per-call random salt.
///
/// `verify` compares in constant time; both implementations delegate the
/// comparison to their hashing crate.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> anyhow::Result<String>;
    fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool>;
}

pub fn from_config(cfg: &PasswordConfig) -> Box<dyn PasswordHasher> {
    Box::new(SchemeHasher {
        primary: cfg.hasher,
        bcrypt: BcryptHasher::new(cfg.bcrypt_cost),
        argon2: Argon2Hasher,
    })
}

/// Hashes with the configured scheme; verifies with the scheme named by the
/// stored hash's prefix.
#[derive(Debug, Clone, Copy)]
pub struct SchemeHasher {
    primary: HasherKind,
    bcrypt: BcryptHasher,
    argon2: Argon2Hasher,
}

fn scheme_of(hash: &str) -> Option<HasherKind> {
    if hash.starts_with("$argon2") {
        Some(HasherKind::Argon2)
    } else if hash.starts_with("$2") {
        Some(HasherKind::Bcrypt)
    } else {
        None
    }
}

impl SchemeHasher {
    fn pick(&self, kind: HasherKind) -> &dyn PasswordHasher {
        match kind {
            HasherKind::Bcrypt => &self.bcrypt,
            HasherKind::Argon2 => &self.argon2,
        }
    }
}

impl PasswordHasher for SchemeHasher {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        self.pick(self.primary).hash(plain)
    }

    fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let kind = scheme_of(hash).ok_or_else(|| {
            error!("stored password hash has an unknown format");
            anyhow::anyhow!("unrecognized password hash format")
        })?;
        self.pick(kind).verify(plain, hash)
    }
}

/// Longest input bcrypt reads; anything past it would be ignored.
const BCRYPT_MAX_BYTES: usize = 72;

#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        anyhow::ensure!(
            plain.len() <= BCRYPT_MAX_BYTES,
            "password exceeds {BCRYPT_MAX_BYTES} bytes"
        );
        bcrypt::hash(plain, self.cost).map_err(|e| {
            error!(error = %e, "bcrypt hash error");
            anyhow::anyhow!("failed to hash password: {e}")
        })
    }

    fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        // Such a password can never have been hashed here.
        if plain.len() > BCRYPT_MAX_BYTES {
            return Ok(false);
        }
        bcrypt::verify(plain, hash).map_err(|e| {
            error!(error = %e, "bcrypt verify error");
            anyhow::anyhow!("failed to verify password: {e}")
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum bcrypt cost keeps the suite fast.
    fn bcrypt() -> BcryptHasher {
        BcryptHasher::new(4)
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        for hasher in [&bcrypt() as &dyn PasswordHasher, &Argon2Hasher] {
            let hash = hasher.hash(password).expect("hashing should succeed");
            assert!(hasher.verify(password, &hash).expect("verify should succeed"));
        }
    }

    #[test]
    fn same_password_hashes_differently_each_time() {
        let hasher = bcrypt();
        let a = hasher.hash("Secret1").unwrap();
        let b = hasher.hash("Secret1").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("Secret1", &a).unwrap());
        assert!(hasher.verify("Secret1", &b).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        for hasher in [&bcrypt() as &dyn PasswordHasher, &Argon2Hasher] {
            let hash = hasher.hash(password).expect("hashing should succeed");
            assert!(!hasher
                .verify("wrong-password", &hash)
                .expect("verify should not error"));
        }
    }

    #[test]
    fn default_cost_is_embedded_in_hash() {
        let cfg = PasswordConfig {
            hasher: HasherKind::Bcrypt,
            bcrypt_cost: crate::config::DEFAULT_BCRYPT_COST,
        };
        let hash = from_config(&cfg).hash("Secret1").unwrap();
        assert!(hash.starts_with("$2b$10$"), "unexpected hash prefix: {hash}");
    }

    #[test]
    fn bcrypt_refuses_input_it_would_truncate() {
        let hasher = bcrypt();
        let shared = "x".repeat(72);
        assert!(hasher.hash(&format!("{shared}A")).is_err());

        let hash = hasher.hash(&shared).unwrap();
        assert!(!hasher.verify(&format!("{shared}B"), &hash).unwrap());
        assert!(hasher.verify(&shared, &hash).unwrap());
    }

    fn configured(hasher: HasherKind) -> Box<dyn PasswordHasher> {
        from_config(&PasswordConfig {
            hasher,
            bcrypt_cost: 4,
        })
    }

    #[test]
    fn verifier_follows_the_stored_scheme() {
        let bcrypt_hash = configured(HasherKind::Bcrypt).hash("Secret1").unwrap();
        let argon_hash = configured(HasherKind::Argon2).hash("Secret1").unwrap();
        assert!(argon_hash.starts_with("$argon2"));

        for kind in [HasherKind::Bcrypt, HasherKind::Argon2] {
            let hasher = configured(kind);
            assert!(hasher.verify("Secret1", &bcrypt_hash).unwrap());
            assert!(hasher.verify("Secret1", &argon_hash).unwrap());
            assert!(!hasher.verify("Wrong", &bcrypt_hash).unwrap());
            assert!(!hasher.verify("Wrong", &argon_hash).unwrap());
        }
    }

    #[test]
    fn unknown_hash_format_is_an_error() {
        assert!(configured(HasherKind::Bcrypt).verify("x", "plaintext").is_err());
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        assert!(bcrypt().verify("anything", "not-a-valid-hash").is_err());
        let err = Argon2Hasher.verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
