//! VNC authentication (security type 2).
//!
//! The server sends a 16-byte challenge; the client DES-encrypts it in two
//! 8-byte ECB blocks and returns the ciphertext. The DES key is the
//! password truncated or zero-padded to 8 bytes - with each key byte
//! bit-reversed, a VNC-specific quirk inherited from the original AT&T
//! implementation.

use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use des::Des;

/// Compute the 16-byte response for a VNC authentication challenge.
pub fn encrypt_challenge(password: &str, challenge: &[u8; 16]) -> [u8; 16] {
    let key = key_from_password(password);
    let cipher = Des::new_from_slice(&key).expect("DES key is always 8 bytes");

    let mut response = [0u8; 16];
    for (i, chunk) in challenge.chunks_exact(8).enumerate() {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        response[i * 8..(i + 1) * 8].copy_from_slice(&block);
    }
    response
}

/// Derive the DES key: pad/truncate the password to 8 bytes, then reverse
/// the bits of every byte.
pub fn key_from_password(password: &str) -> [u8; 8] {
    let mut key = [0u8; 8];
    for (slot, byte) in key.iter_mut().zip(password.bytes()) {
        *slot = reverse_bits(byte);
    }
    key
}

/// Reverse the bit order of a byte (bit i becomes bit 7-i).
pub fn reverse_bits(byte: u8) -> u8 {
    let mut out = 0u8;
    for i in 0..8 {
        out |= ((byte >> i) & 1) << (7 - i);
    }
    out
}
