use base64::{engine::general_purpose, Engine as _};

/// Whether `input` is canonical standard Base64, i.e. decoding and
/// re-encoding it gives back the same text.
///
/// Blank input is never Base64.
pub fn is_valid_base64(input: &str) -> bool {
    if input.trim().is_empty() {
        return false;
    }
    match general_purpose::STANDARD.decode(input) {
        Ok(decoded) => general_purpose::STANDARD.encode(decoded) == input,
        Err(_) => false,
    }
}
