//! Hand-ported request/response obfuscation. The site ships a tiny script
//! that derives these values at runtime; the transformation rules are
//! hard-coded here instead of evaluating fetched code. When the site rotates
//! them server-side, handlers start failing with `MalformedResponse` and the
//! adapter needs a code update.

use crate::{Result, SourceError};
use aes::Aes256;
use base64::Engine as _;
use cipher::{BlockDecryptMut, KeyInit, block_padding::NoPadding};

pub(crate) const HEADER_VER: &str = "1.7.5";
pub(crate) const APP_VERSION: &str = "2.0.6";
const TOKEN_SECRET: &str = "18comicAPP";
const DATA_SECRET: &str = "185Hcomic3PAPP7R";

type Aes256EcbDec = ecb::Decryptor<Aes256>;

pub(crate) fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// (`token`, `tokenparam`) header values for a request issued at `ts`.
pub(crate) fn token_headers(ts: i64) -> (String, String) {
    let token = md5_hex(&format!("{ts}{TOKEN_SECRET}"));
    let tokenparam = format!("{ts},{HEADER_VER}");
    (token, tokenparam)
}

/// Decrypt the base64 AES-256-ECB response envelope. The key is derived from
/// the same timestamp the token headers were built with.
pub(crate) fn decode_envelope(data_b64: &str, ts: i64) -> Result<String> {
    let key = md5_hex(&format!("{ts}{DATA_SECRET}")).into_bytes();

    let mut ciphertext = base64::engine::general_purpose::STANDARD
        .decode(data_b64.trim())
        .map_err(|e| SourceError::MalformedResponse(format!("envelope base64: {e}")))?;

    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(SourceError::MalformedResponse(format!(
            "envelope length {} is not a block multiple",
            ciphertext.len()
        )));
    }

    let cipher = Aes256EcbDec::new_from_slice(&key)
        .map_err(|e| SourceError::MalformedResponse(format!("cipher init: {e}")))?;

    let decrypted = cipher
        .decrypt_padded_mut::<NoPadding>(&mut ciphertext)
        .map_err(|e| SourceError::MalformedResponse(format!("envelope decrypt: {e}")))?
        .to_vec();

    let text = String::from_utf8(strip_trailing_padding(decrypted))
        .map_err(|e| SourceError::MalformedResponse(format!("envelope utf8: {e}")))?;

    if !looks_like_json(&text) {
        return Err(SourceError::MalformedResponse(
            "decoded envelope is not JSON".to_string(),
        ));
    }
    Ok(text)
}

// The server pads PKCS7-style; the pad length is the value of the last byte.
fn strip_trailing_padding(mut data: Vec<u8>) -> Vec<u8> {
    if let Some(&pad) = data.last() {
        let pad = pad as usize;
        if pad >= 1 && pad <= 16 && pad <= data.len() {
            data.truncate(data.len() - pad);
        }
    }
    data
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start_matches(['\u{0000}', ' ', '\n', '\r', '\t']);
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Build an envelope the way the server does; fixtures only.
#[cfg(test)]
pub(crate) fn encode_envelope(plain: &str, ts: i64) -> String {
    use cipher::BlockEncryptMut;
    type Aes256EcbEnc = ecb::Encryptor<Aes256>;

    let key = md5_hex(&format!("{ts}{DATA_SECRET}")).into_bytes();
    let mut data = plain.as_bytes().to_vec();
    let pad = 16 - data.len() % 16;
    data.extend(std::iter::repeat(pad as u8).take(pad));

    let len = data.len();
    let encrypted = Aes256EcbEnc::new_from_slice(&key)
        .expect("key is 32 bytes")
        .encrypt_padded_mut::<NoPadding>(&mut data, len)
        .expect("buffer is block aligned")
        .to_vec();

    base64::engine::general_purpose::STANDARD.encode(encrypted)
}
