use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::Digest;
use sha2::Sha256;

/// Serialized Python state is an opaque byte string of the form
/// `version || payload` (§3). The Rust side never inspects `payload` beyond
/// validating its decoded size and computing its content hash — the pickle
/// itself is produced and consumed entirely by the Python REPL driver.
pub const MAX_DECODED_STATE_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateVersion {
    /// `payload` is a raw pickled mapping.
    Raw = 1,
    /// `payload` is the pickled mapping compressed with LZ4 frame format.
    Lz4 = 2,
}

impl StateVersion {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(StateVersion::Raw),
            2 => Some(StateVersion::Lz4),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state blob is empty")]
    Empty,
    #[error("unknown state version byte: {0}")]
    UnknownVersion(u8),
    #[error("state exceeds maximum decoded size of {max} bytes (got {actual})")]
    TooLarge { max: usize, actual: usize },
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("corrupt lz4 frame: {0}")]
    Lz4(String),
}

/// A parsed, validated serialized-state blob together with its
/// content-addressed hash (§3: SHA-256 of the raw bytes, first 16 hex
/// chars).
#[derive(Debug, Clone)]
pub struct SerializedState {
    /// The raw `version || payload` bytes, exactly as stored/transported.
    raw: Vec<u8>,
}

impl SerializedState {
    /// Validate raw (pre-base64) state bytes: non-empty, known version byte,
    /// and decoded payload size within the 50 MiB cap.
    pub fn parse(raw: Vec<u8>) -> Result<Self, StateError> {
        let Some(&version_byte) = raw.first() else {
            return Err(StateError::Empty);
        };
        let version = StateVersion::from_byte(version_byte)
            .ok_or(StateError::UnknownVersion(version_byte))?;
        let payload = &raw[1..];

        let decoded_len = match version {
            StateVersion::Raw => payload.len(),
            StateVersion::Lz4 => decompressed_len(payload)?,
        };
        if decoded_len > MAX_DECODED_STATE_BYTES {
            return Err(StateError::TooLarge {
                max: MAX_DECODED_STATE_BYTES,
                actual: decoded_len,
            });
        }

        Ok(Self { raw })
    }

    pub fn from_base64(s: &str) -> Result<Self, StateError> {
        let raw = BASE64.decode(s)?;
        Self::parse(raw)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.raw)
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn version(&self) -> StateVersion {
        // Safe: construction always validates a known first byte.
        StateVersion::from_byte(self.raw[0]).expect("validated on construction")
    }

    /// First 16 lowercase hex characters of SHA-256 over the full
    /// `version || payload` byte string (§3, §4.5).
    pub fn hash16(&self) -> String {
        hash16(&self.raw)
    }
}

pub fn hash16(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let full = format!("{digest:x}");
    full[..16].to_string()
}

fn decompressed_len(lz4_frame: &[u8]) -> Result<usize, StateError> {
    lz4_flex::frame::FrameDecoder::new(lz4_frame)
        .read_to_end_len()
        .map_err(|e| StateError::Lz4(e.to_string()))
}

/// `lz4_flex`'s frame decoder doesn't expose a cheap "decoded length" probe,
/// so this streams through a bounded decoder that aborts as soon as the
/// cumulative output would exceed the cap, rather than materializing the
/// whole buffer up front.
trait FrameDecoderLenExt {
    fn read_to_end_len(self) -> std::io::Result<usize>;
}

impl<R: std::io::Read> FrameDecoderLenExt for lz4_flex::frame::FrameDecoder<R> {
    fn read_to_end_len(mut self) -> std::io::Result<usize> {
        use std::io::Read;
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0usize;
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            total += n;
            if total > MAX_DECODED_STATE_BYTES {
                return Ok(total);
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lz4_wrap(payload: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
        enc.write_all(payload).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn raw_state_round_trips() {
        let mut raw = vec![1u8];
        raw.extend_from_slice(b"pickled-bytes");
        let state = SerializedState::parse(raw.clone()).unwrap();
        assert_eq!(state.version(), StateVersion::Raw);
        assert_eq!(state.raw_bytes(), raw.as_slice());
    }

    #[test]
    fn lz4_state_round_trips_and_reports_raw_version() {
        let compressed = lz4_wrap(b"some pickled payload, repeated repeated repeated");
        let mut raw = vec![2u8];
        raw.extend_from_slice(&compressed);
        let state = SerializedState::parse(raw).unwrap();
        assert_eq!(state.version(), StateVersion::Lz4);
    }

    #[test]
    fn unknown_version_byte_is_rejected() {
        let err = SerializedState::parse(vec![9, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, StateError::UnknownVersion(9)));
    }

    #[test]
    fn empty_blob_is_rejected() {
        assert!(matches!(
            SerializedState::parse(vec![]).unwrap_err(),
            StateError::Empty
        ));
    }

    #[test]
    fn oversized_raw_payload_is_rejected() {
        let mut raw = vec![1u8];
        raw.extend(std::iter::repeat(0u8).take(MAX_DECODED_STATE_BYTES + 1));
        let err = SerializedState::parse(raw).unwrap_err();
        assert!(matches!(err, StateError::TooLarge { .. }));
    }

    #[test]
    fn exactly_max_size_raw_payload_is_accepted() {
        let mut raw = vec![1u8];
        raw.extend(std::iter::repeat(0u8).take(MAX_DECODED_STATE_BYTES));
        assert!(SerializedState::parse(raw).is_ok());
    }

    #[test]
    fn hash16_is_first_sixteen_hex_chars_of_sha256() {
        let raw = vec![1u8, b'x', b'y', b'z'];
        let h = hash16(&raw);
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn base64_round_trip() {
        let mut raw = vec![1u8];
        raw.extend_from_slice(b"hello");
        let state = SerializedState::parse(raw).unwrap();
        let b64 = state.to_base64();
        let parsed = SerializedState::from_base64(&b64).unwrap();
        assert_eq!(parsed.raw_bytes(), state.raw_bytes());
    }
}
