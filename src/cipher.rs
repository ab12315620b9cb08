//! AES-CBC decryption of TeslaCrypt payloads and plaintext validation.

use crate::error::CipherError;
use crate::header::CipherHeader;
use crate::signatures::SignatureRegistry;
use crate::types::{AesKey, BLOCK_LEN};
use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use std::sync::LazyLock;

static SIGNATURES: LazyLock<SignatureRegistry> = LazyLock::new(SignatureRegistry::default_documents);

enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(key: &[u8]) -> Result<Self, CipherError> {
        let invalid = |_| CipherError::InvalidKeyLength(key.len());
        match key.len() {
            16 => Aes128::new_from_slice(key).map(Self::Aes128).map_err(invalid),
            24 => Aes192::new_from_slice(key).map(Self::Aes192).map_err(invalid),
            32 => Aes256::new_from_slice(key).map(Self::Aes256).map_err(invalid),
            n => Err(CipherError::InvalidKeyLength(n)),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.decrypt_block(block),
            Self::Aes192(c) => c.decrypt_block(block),
            Self::Aes256(c) => c.decrypt_block(block),
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }
}

/// AES-CBC decryption without padding removal.
pub fn decrypt(ciphertext: &[u8], key: &AesKey, iv: &[u8; 16]) -> Result<Vec<u8>, CipherError> {
    if ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CipherError::UnalignedCiphertext(ciphertext.len()));
    }
    let cipher = BlockCipher::new(key.as_bytes())?;

    let mut out = ciphertext.to_vec();
    let mut prev = *iv;
    for block in out.chunks_exact_mut(BLOCK_LEN) {
        let mut saved = [0u8; BLOCK_LEN];
        saved.copy_from_slice(block);

        cipher.decrypt_block(block);
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        prev = saved;
    }
    Ok(out)
}

/// AES-CBC encryption, zero-padding the last block.
pub fn encrypt(plaintext: &[u8], key: &AesKey, iv: &[u8; 16]) -> Result<Vec<u8>, CipherError> {
    let cipher = BlockCipher::new(key.as_bytes())?;

    let padded_len = plaintext.len().div_ceil(BLOCK_LEN) * BLOCK_LEN;
    let mut out = plaintext.to_vec();
    out.resize(padded_len, 0);

    let mut prev = *iv;
    for block in out.chunks_exact_mut(BLOCK_LEN) {
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(block);
        prev.copy_from_slice(block);
    }
    Ok(out)
}

/// Decrypts a whole payload and cuts it to the size recorded in the header.
pub fn decrypt_body(header: &CipherHeader, body: &[u8], key: &AesKey) -> Result<Vec<u8>, CipherError> {
    let size = header.original_size() as usize;
    if size > body.len() {
        return Err(CipherError::SizeMismatch {
            recorded: header.original_size() as u64,
            available: body.len(),
        });
    }
    let mut plain = decrypt(body, key, header.iv())?;
    plain.truncate(size);
    Ok(plain)
}

/// Decrypts only the first block, cut to the recorded size.
pub fn decrypt_prefix(
    header: &CipherHeader,
    body: &[u8],
    key: &AesKey,
) -> Result<Vec<u8>, CipherError> {
    let n = body.len().min(BLOCK_LEN);
    if n < BLOCK_LEN {
        return Err(CipherError::UnalignedCiphertext(body.len()));
    }
    let mut plain = decrypt(&body[..n], key, header.iv())?;
    plain.truncate((header.original_size() as usize).min(BLOCK_LEN));
    Ok(plain)
}

/// Whether a decrypted prefix looks like a real file.
///
/// A known extension must match its own signature; otherwise any known
/// signature or plausible text is accepted.
pub fn looks_valid(prefix: &[u8], expected_extension: Option<&str>) -> bool {
    if prefix.is_empty() {
        return false;
    }
    match expected_extension.and_then(|ext| SIGNATURES.type_for_extension(ext)) {
        Some(file_type) => SIGNATURES.matches_type(file_type, prefix),
        None => {
            SIGNATURES.identify(prefix).is_some() || crate::signatures::looks_like_text(prefix)
        }
    }
}
