/*!
Crypto things

Refresh tokens are kept AES_256_GCM encrypted at rest using the
application secret `ENC_KEY` and a nonce generated per value.
*/
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::SecureRandom;

/// `n` bytes from the system's secure random source
pub fn rand_bytes(n: usize) -> crate::Result<Vec<u8>> {
    let mut buf = vec![0; n];
    ring::rand::SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| se!("Error getting random bytes"))?;
    Ok(buf)
}

pub fn new_nonce() -> crate::Result<Vec<u8>> {
    rand_bytes(NONCE_LEN)
}

// nonce uniqueness is left to the caller, see `new_nonce`
fn aead_key(pass: &[u8]) -> crate::Result<LessSafeKey> {
    let key = UnboundKey::new(&AES_256_GCM, pass)
        .map_err(|_| se!("Invalid key, expected {} bytes", AES_256_GCM.key_len()))?;
    Ok(LessSafeKey::new(key))
}

fn aead_nonce(nonce: &[u8]) -> crate::Result<Nonce> {
    Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| se!("Invalid nonce, expected {} bytes", NONCE_LEN).into())
}

/// Seal `bytes` with AES_256_GCM. `nonce` must be 12 bytes and `pass` 32.
/// The returned ciphertext has the auth tag appended.
pub fn encrypt_bytes(bytes: &[u8], nonce: &[u8], pass: &[u8]) -> crate::Result<Vec<u8>> {
    let key = aead_key(pass)?;
    let mut in_out = bytes.to_vec();
    key.seal_in_place_append_tag(aead_nonce(nonce)?, Aad::empty(), &mut in_out)
        .map_err(|_| se!("Failed encrypting bytes"))?;
    Ok(in_out)
}

/// Open bytes sealed by `encrypt_bytes`, in place
pub fn decrypt_bytes<'a>(
    bytes: &'a mut [u8],
    nonce: &[u8],
    pass: &[u8],
) -> crate::Result<&'a [u8]> {
    let key = aead_key(pass)?;
    let plain = key
        .open_in_place(aead_nonce(nonce)?, Aad::empty(), bytes)
        .map_err(|_| se!("Failed decrypting bytes"))?;
    Ok(plain)
}

/// A hex encoded encrypted value and the nonce it was sealed with
#[derive(Debug, Clone, PartialEq)]
pub struct Enc {
    pub value: String,
    pub nonce: String,
}

pub fn encrypt_with(s: &str, key: &[u8]) -> crate::Result<Enc> {
    let nonce = new_nonce()?;
    let b = encrypt_bytes(s.as_bytes(), &nonce, key)?;
    Ok(Enc {
        value: hex::encode(&b),
        nonce: hex::encode(&nonce),
    })
}

pub fn decrypt_with(enc: &Enc, key: &[u8]) -> crate::Result<String> {
    let nonce = hex::decode(&enc.nonce).map_err(|e| se!("nonce hex decode error {}", e))?;
    let mut value = hex::decode(&enc.value).map_err(|e| se!("value hex decode error {}", e))?;
    let bytes = decrypt_bytes(value.as_mut_slice(), &nonce, key)?;
    Ok(String::from_utf8(bytes.to_vec()).map_err(|e| se!("decrypted utf8 error {}", e))?)
}

/// Encrypt `s` with the application secret
pub fn encrypt(s: &str) -> crate::Result<Enc> {
    encrypt_with(s, crate::CONFIG.enc_key.as_bytes())
}

/// Decrypt `enc` with the application secret
pub fn decrypt(enc: &Enc) -> crate::Result<String> {
    decrypt_with(enc, crate::CONFIG.enc_key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"abcdefghijklmnopqrstuvwxyz012345";

    #[test]
    fn sealed_value_opens_with_same_key() {
        let enc = encrypt_with("refresh-me", KEY).unwrap();
        assert_ne!(enc.value, hex::encode("refresh-me"));
        assert_eq!(hex::decode(&enc.nonce).unwrap().len(), 12);
        assert_eq!(decrypt_with(&enc, KEY).unwrap(), "refresh-me");
    }

    #[test]
    fn wrong_key_fails() {
        let enc = encrypt_with("refresh-me", KEY).unwrap();
        assert!(decrypt_with(&enc, b"00000000000000000000000000000000").is_err());
    }

    #[test]
    fn tampered_value_fails() {
        let mut enc = encrypt_with("refresh-me", KEY).unwrap();
        let mut raw = hex::decode(&enc.value).unwrap();
        raw[0] ^= 0xff;
        enc.value = hex::encode(raw);
        assert!(decrypt_with(&enc, KEY).is_err());
    }

    #[test]
    fn nonces_differ_per_value() {
        let a = encrypt_with("same", KEY).unwrap();
        let b = encrypt_with("same", KEY).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(encrypt_with("x", b"short").is_err());
    }
}
