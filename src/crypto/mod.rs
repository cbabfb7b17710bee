use std::num::NonZeroU32;

use anyhow::bail;
use rand::RngCore;
use ring::{aead, pbkdf2};

// Length of the random salt prepended to every encrypted config blob.
const SALT_LEN: usize = 32;
// AES-256-GCM nonce length.
const NONCE_LEN: usize = 12;
// PBKDF2-HMAC-SHA256 iteration count for deriving the sealing key from
// the admin secret.
const PBKDF2_ITERATIONS: u32 = 10_000;

fn derive_key(secret: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).unwrap(),
        salt,
        secret.as_bytes(),
        &mut key,
    );
    key
}

// Encrypts configuration data with a key derived from the admin secret.
// Output layout: salt | nonce | ciphertext+tag.
pub fn encrypt_config_data(secret: &str, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let key = aead::LessSafeKey::new(
        aead::UnboundKey::new(&aead::AES_256_GCM, &derive_key(secret, &salt))
            .map_err(|_| anyhow::anyhow!("unable to initialize sealing key"))?,
    );

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        aead::Nonce::assume_unique_for_key(nonce),
        aead::Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| anyhow::anyhow!("unable to seal configuration data"))?;

    let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + in_out.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&in_out);
    Ok(blob)
}

// Decrypts a blob produced by `encrypt_config_data`. Fails on a wrong
// secret or corrupted data instead of returning garbage, the GCM tag
// authenticates the whole payload.
pub fn decrypt_config_data(secret: &str, blob: &[u8]) -> anyhow::Result<Vec<u8>> {
    if blob.len() < SALT_LEN + NONCE_LEN + aead::AES_256_GCM.tag_len() {
        bail!("encrypted configuration data is truncated");
    }

    let (salt, rest) = blob.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = aead::LessSafeKey::new(
        aead::UnboundKey::new(&aead::AES_256_GCM, &derive_key(secret, salt))
            .map_err(|_| anyhow::anyhow!("unable to initialize opening key"))?,
    );

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(nonce);

    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(
            aead::Nonce::assume_unique_for_key(nonce_bytes),
            aead::Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| anyhow::anyhow!("unable to decrypt configuration data"))?;

    Ok(plaintext.to_vec())
}
