use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;
use vigil_core::Embedding;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("user id must not be empty")]
    EmptyUserId,
    #[error("user id '{0}' is already enrolled")]
    AlreadyEnrolled(String),
    #[error("embedding is empty")]
    EmptyEmbedding,
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidEmbeddingValue,
    #[error("stored embedding for '{user_id}' has {actual} bytes, expected {expected}")]
    InvalidBlob {
        user_id: String,
        expected: usize,
        actual: usize,
    },
    #[error("embedding encryption failed")]
    EncryptionFailed,
    #[error("embedding decryption failed: key mismatch or corrupted data")]
    DecryptionFailed,
    #[error("encryption key I/O error: {0}")]
    KeyIo(#[source] std::io::Error),
}

/// Enrolled identity metadata (no embedding data).
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserInfo {
    pub user_id: String,
    pub dim: usize,
    pub created_at: String,
}

/// SQLite-backed enrollment store, one embedding per user id.
///
/// Embeddings are AES-256-GCM encrypted at rest with a per-installation key
/// kept in `.key` next to the database (mode 0600).
pub struct EmbeddingStore {
    conn: Connection,
    enc_key: [u8; 32],
}

impl EmbeddingStore {
    /// Open (or create) the database at `db_path` and run migrations.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let enc_key = if db_path == Path::new(":memory:") {
            // In-memory DB (tests): fixed all-zeros key
            [0u8; 32]
        } else {
            let dir = db_path.parent().unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir).map_err(StoreError::KeyIo)?;
            load_or_generate_key(&dir.join(".key"))?
        };

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS embeddings (
                 user_id TEXT PRIMARY KEY,
                 embedding BLOB NOT NULL,
                 dim INTEGER NOT NULL,
                 created_at TEXT NOT NULL
             );",
        )?;

        Ok(Self { conn, enc_key })
    }

    /// Enroll `user_id`. Ids are unique; re-enrolling an id is an error.
    pub fn insert(&self, user_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(StoreError::EmptyUserId);
        }
        let blob = self.encrypt_embedding(&embedding.values)?;
        let created_at = chrono::Utc::now().to_rfc3339();

        let inserted = self.conn.execute(
            "INSERT INTO embeddings (user_id, embedding, dim, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO NOTHING",
            params![user_id, blob, embedding.dim() as i64, created_at],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyEnrolled(user_id.to_string()));
        }
        tracing::debug!(user_id, dim = embedding.dim(), "embedding stored");
        Ok(())
    }

    #[cfg(test)]
    fn get(&self, user_id: &str) -> Result<Option<Embedding>, StoreError> {
        use rusqlite::OptionalExtension;
        let row: Option<(Vec<u8>, i64)> = self
            .conn
            .query_row(
                "SELECT embedding, dim FROM embeddings WHERE user_id = ?1",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(blob, dim)| self.decrypt_embedding(user_id, &blob, dim as usize))
            .transpose()
    }

    /// Remove an enrollment. Returns whether anything was deleted.
    pub fn remove(&self, user_id: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM embeddings WHERE user_id = ?1", [user_id])?;
        Ok(affected > 0)
    }

    pub fn list(&self) -> Result<Vec<UserInfo>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, dim, created_at FROM embeddings ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(UserInfo {
                user_id: row.get(0)?,
                dim: row.get::<_, i64>(1)? as usize,
                created_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every enrolled identity with its decrypted embedding.
    pub fn gallery(&self) -> Result<Vec<(String, Embedding)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, embedding, dim FROM embeddings ORDER BY user_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(user_id, blob, dim)| {
                let embedding = self.decrypt_embedding(&user_id, &blob, dim as usize)?;
                Ok((user_id, embedding))
            })
            .collect()
    }

    // ── Encryption helpers ────────────────────────────────────────────────────

    /// Output: 12-byte random nonce || ciphertext || 16-byte GCM tag.
    fn encrypt_embedding(&self, values: &[f32]) -> Result<Vec<u8>, StoreError> {
        validate_embedding_values(values)?;
        let plaintext: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.enc_key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| StoreError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn decrypt_embedding(
        &self,
        user_id: &str,
        blob: &[u8],
        dim: usize,
    ) -> Result<Embedding, StoreError> {
        if blob.len() <= NONCE_LEN {
            return Err(StoreError::InvalidBlob {
                user_id: user_id.to_string(),
                expected: NONCE_LEN + dim * 4,
                actual: blob.len(),
            });
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.enc_key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| StoreError::DecryptionFailed)?;

        if plaintext.len() != dim * 4 {
            return Err(StoreError::InvalidBlob {
                user_id: user_id.to_string(),
                expected: dim * 4,
                actual: plaintext.len(),
            });
        }
        let values: Vec<f32> = plaintext
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        validate_embedding_values(&values)?;
        Ok(Embedding::new(values))
    }
}

// ── Key management ────────────────────────────────────────────────────────────

/// Load the encryption key from disk, or generate and persist a new one.
fn load_or_generate_key(key_path: &Path) -> Result<[u8; 32], StoreError> {
    if key_path.exists() {
        let bytes = std::fs::read(key_path).map_err(StoreError::KeyIo)?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            StoreError::KeyIo(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "encryption key file has wrong length ({} bytes, expected 32)",
                    bytes.len()
                ),
            ))
        })?;
        tracing::debug!(path = %key_path.display(), "loaded encryption key");
        return Ok(key);
    }

    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);

    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(key_path)
        .map_err(StoreError::KeyIo)?;
    f.write_all(&key).map_err(StoreError::KeyIo)?;

    tracing::info!(path = %key_path.display(), "generated new embedding encryption key");
    Ok(key)
}

fn validate_embedding_values(values: &[f32]) -> Result<(), StoreError> {
    if values.is_empty() {
        return Err(StoreError::EmptyEmbedding);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::InvalidEmbeddingValue);
    }
    Ok(())
}
