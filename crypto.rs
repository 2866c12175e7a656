//! Key handling and the AES-256-CBC stream transforms.
//!
//! Every upload gets a fresh 256-bit key; the key is handed to the client
//! URL-safe-base64 encoded and is never stored by the pipeline. Ciphertext
//! uses CBC with PKCS#7 padding and a fixed all-zero IV: the IV is part of
//! the on-disk layout that existing objects and issued keys depend on, and a
//! key is never reused across objects. Moving to a per-object nonce requires
//! versioning the stored format (see DESIGN.md).
//!
//! ## Security Properties
//!
//! - Key material comes from the OS secure RNG and is zeroized on drop
//! - Wrong keys surface as invalid padding, reported distinctly from I/O
//!   failures

use std::fmt;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::ShelterError;
use crate::transform::Transform;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const KEY_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

/// Fixed IV shared by all objects; see the module docs.
const INIT_VECTOR: [u8; BLOCK_LEN] = [0u8; BLOCK_LEN];

/// 256-bit symmetric key material, zeroized on drop.
pub struct CipherKey([u8; KEY_LEN]);

impl Drop for CipherKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

impl PartialEq for CipherKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl CipherKey {
    /// Generates a fresh key from the OS secure RNG.
    pub fn generate() -> Result<Self, ShelterError> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| ShelterError::KeyGeneration(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// URL-safe base64 representation handed to clients.
    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    /// Parses a client-supplied key string. Rejects bad encoding and any
    /// decoded length other than 32 bytes.
    pub fn decode(s: &str) -> Result<Self, ShelterError> {
        let decoded = URL_SAFE.decode(s).map_err(|_| ShelterError::MalformedKey)?;
        let bytes: [u8; KEY_LEN] = decoded
            .try_into()
            .map_err(|_| ShelterError::MalformedKey)?;
        Ok(Self(bytes))
    }

    fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// CBC encryption stage: buffers to block alignment, pads the final block
/// with PKCS#7 on finish.
pub struct EncryptStage {
    cipher: Aes256CbcEnc,
    pending: Vec<u8>,
}

impl EncryptStage {
    pub fn new(key: &CipherKey) -> Self {
        let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &INIT_VECTOR)
            .expect("BUG: key and IV lengths are fixed");
        Self {
            cipher,
            pending: Vec::with_capacity(BLOCK_LEN),
        }
    }
}

impl Transform for EncryptStage {
    fn update(&mut self, input: &[u8]) -> Result<Vec<u8>, ShelterError> {
        self.pending.extend_from_slice(input);
        let usable = self.pending.len() - self.pending.len() % BLOCK_LEN;
        let mut out: Vec<u8> = self.pending.drain(..usable).collect();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(out)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, ShelterError> {
        // pending is always shorter than a block here, so padding yields
        // exactly one final block. Empty input still produces a padding block.
        let pad = (BLOCK_LEN - self.pending.len() % BLOCK_LEN) as u8;
        let mut block = std::mem::take(&mut self.pending);
        block.resize(BLOCK_LEN, pad);
        self.cipher
            .encrypt_block_mut(GenericArray::from_mut_slice(&mut block));
        Ok(block)
    }
}

/// CBC decryption stage. Holds back the trailing block until end of stream
/// so PKCS#7 padding can be validated and stripped; invalid padding is the
/// wrong-key signal.
pub struct DecryptStage {
    cipher: Aes256CbcDec,
    pending: Vec<u8>,
}

impl DecryptStage {
    pub fn new(key: &CipherKey) -> Self {
        let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), &INIT_VECTOR)
            .expect("BUG: key and IV lengths are fixed");
        Self {
            cipher,
            pending: Vec::new(),
        }
    }
}

impl Transform for DecryptStage {
    fn update(&mut self, input: &[u8]) -> Result<Vec<u8>, ShelterError> {
        self.pending.extend_from_slice(input);
        let complete = self.pending.len() / BLOCK_LEN;
        // A block-aligned buffer may end in the padding block, which must not
        // be emitted before end of stream.
        let emit_blocks = if self.pending.len() % BLOCK_LEN == 0 {
            complete.saturating_sub(1)
        } else {
            complete
        };
        let emit = emit_blocks * BLOCK_LEN;

        let mut out: Vec<u8> = self.pending.drain(..emit).collect();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(out)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, ShelterError> {
        if self.pending.len() != BLOCK_LEN {
            return Err(ShelterError::file_read(format!(
                "encrypted stream is not block aligned ({} trailing bytes)",
                self.pending.len()
            )));
        }
        let mut block = std::mem::take(&mut self.pending);
        self.cipher
            .decrypt_block_mut(GenericArray::from_mut_slice(&mut block));

        let pad = *block.last().unwrap_or(&0) as usize;
        if pad == 0 || pad > BLOCK_LEN || block[BLOCK_LEN - pad..].iter().any(|&b| b as usize != pad)
        {
            return Err(ShelterError::InvalidKey);
        }
        block.truncate(BLOCK_LEN - pad);
        Ok(block)
    }
}
