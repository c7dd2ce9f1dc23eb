// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use crate::DecodeError;

/// Errors raised while validating a length-prefixed UTF-8 string per RFC 3629
/// and the restrictions MQTT-1.5.4-1/2/3 place on top of it.
#[derive(Debug)]
pub enum StringError {
    InvalidUtf8,
    ContainsNull,
    ContainsSurrogate,
    TooLong,
}

/// Decode `bytes` as a UTF-8 string, rejecting the code points MQTT forbids:
/// null (U+0000) and surrogate halves (U+D800..=U+DFFF, which a well-formed
/// UTF-8 stream never actually encodes, so this mostly guards against
/// CESU-8/WTF-8 producers upstream).
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = std::str::from_utf8(bytes).map_err(|_e| StringError::InvalidUtf8)?.to_string();
    validate_utf8_string(&s)?;
    Ok(s)
}

/// Validate a string already known to be valid Rust UTF-8 against MQTT's
/// additional restrictions.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > u16::MAX as usize {
        return Err(StringError::TooLong);
    }
    for c in s.chars() {
        let code = c as u32;
        if code == 0x0000 {
            return Err(StringError::ContainsNull);
        }
        if (0xD800..=0xDFFF).contains(&code) {
            return Err(StringError::ContainsSurrogate);
        }
    }
    Ok(())
}

/// Validate that binary payload data fits the two-byte length prefix MQTT
/// uses for binary fields (will message, password, ...).
pub fn validate_two_bytes_data(data: &[u8]) -> Result<(), StringError> {
    if data.len() > u16::MAX as usize {
        Err(StringError::TooLong)
    } else {
        Ok(())
    }
}

/// Errors raised while validating a client identifier.
#[derive(Debug)]
pub enum ClientIdError {
    /// No chars.
    IsEmpty,

    /// Larger than 23 chars (the MQTT 3.1.1 mandated minimum a server must
    /// accept; this codec enforces it strictly since a zero-length id is
    /// handled separately by the CONNECT decoder).
    TooLong,

    /// Can only contain `0-9a-zA-Z`.
    InvalidChars,
}

/// Check that `client_id` meets MQTT-3.1.3-5: 1 to 23 bytes, all drawn from
/// the alphanumeric charset a server is required to accept. Callers decide
/// separately whether a zero-length id is acceptable (it is, in CONNECT,
/// when `clean_session` is set).
pub fn validate_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.is_empty() {
        return Err(ClientIdError::IsEmpty);
    }
    if client_id.len() > 23 {
        return Err(ClientIdError::TooLong);
    }
    if !client_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ClientIdError::InvalidChars);
    }
    Ok(())
}

/// Check `keep_alive` is in range: zero disables the keep-alive timer, any
/// other value below 5 seconds is rejected as impractical.
pub const fn validate_keep_alive(keep_alive: u16) -> Result<(), DecodeError> {
    if keep_alive != 0 && keep_alive < 5 {
        Err(DecodeError::InvalidKeepAlive)
    } else {
        Ok(())
    }
}
