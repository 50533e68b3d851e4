use serde::Deserialize;
use serde::Serialize;

/// Every frame on the REPL's stdio is a UTF-8 JSON object followed by this
/// literal byte sequence (§4.3). The delimiter is fixed and must never be
/// permitted to appear inside a serialized JSON value — `serde_json` always
/// escapes control bytes and backslashes, so a well-formed frame body can
/// never contain it verbatim.
pub const FRAME_DELIMITER: &[u8] = b"\n---END---\n";

#[derive(Debug, Clone, Serialize)]
pub struct ReplRequest {
    pub code: String,
    /// Timeout in seconds, per the wire contract (§4.3 Request frame).
    pub timeout: u64,
    pub working_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_state: Option<bool>,
}

/// Frames emitted by the REPL driver are a closed sum type at this layer
/// (§9 Design Notes: "Runtime type-tagging of REPL responses" must become
/// an explicit decoder instead of duck-typed JSON). The driver itself emits
/// plain JSON objects distinguished by the presence/absence of fields (a
/// `status` field for the startup frame, `exit_code` for every response
/// frame thereafter); this type reconstructs the closed sum from that wire
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplFrame {
    Ready,
    Completed(ReplResponse),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ReplResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_errors: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplFrameError {
    #[error("malformed frame json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is neither a ready frame nor a completed-execution frame")]
    UnrecognizedShape,
}

impl ReplFrame {
    /// Decode one already-delimiter-stripped frame body.
    pub fn decode(body: &[u8]) -> Result<Self, ReplFrameError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        if let Some(status) = value.get("status").and_then(|v| v.as_str()) {
            if status == "ready" {
                return Ok(ReplFrame::Ready);
            }
        }
        if value.get("exit_code").is_some() {
            let resp: ReplResponse = serde_json::from_value(value)?;
            return Ok(ReplFrame::Completed(resp));
        }
        Err(ReplFrameError::UnrecognizedShape)
    }
}

impl ReplRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut body =
            serde_json::to_vec(self).expect("ReplRequest always serializes to valid JSON");
        body.extend_from_slice(FRAME_DELIMITER);
        body
    }
}

/// Scans an accumulating read buffer for the next complete frame, returning
/// the frame body (delimiter stripped) and how many leading bytes of `buf`
/// it consumed. Used by both the spawner (reading the startup frame) and
/// the driver-side executor (reading a response frame) since framing is not
/// multiplexed — one frame in, one frame out, stdout carries only frames
/// (§4.3).
pub fn find_frame(buf: &[u8]) -> Option<(&[u8], usize)> {
    let idx = find_subslice(buf, FRAME_DELIMITER)?;
    Some((&buf[..idx], idx + FRAME_DELIMITER.len()))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_frame_decodes() {
        let frame = ReplFrame::decode(br#"{"status":"ready","pid":123}"#).unwrap();
        assert_eq!(frame, ReplFrame::Ready);
    }

    #[test]
    fn completed_frame_decodes() {
        let body = br#"{"exit_code":0,"stdout":"42\n","stderr":""}"#;
        let frame = ReplFrame::decode(body).unwrap();
        match frame {
            ReplFrame::Completed(resp) => {
                assert_eq!(resp.exit_code, 0);
                assert_eq!(resp.stdout, "42\n");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_shape_is_an_error() {
        let err = ReplFrame::decode(br#"{"foo":"bar"}"#).unwrap_err();
        assert!(matches!(err, ReplFrameError::UnrecognizedShape));
    }

    #[test]
    fn request_encodes_with_trailing_delimiter() {
        let req = ReplRequest {
            code: "print(1)".to_string(),
            timeout: 5,
            working_dir: "/mnt/data".to_string(),
            args: None,
            initial_state: None,
            capture_state: Some(true),
        };
        let encoded = req.encode();
        assert!(encoded.ends_with(FRAME_DELIMITER));
    }

    #[test]
    fn find_frame_splits_on_first_delimiter_and_reports_consumed_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(br#"{"status":"ready"}"#);
        buf.extend_from_slice(FRAME_DELIMITER);
        buf.extend_from_slice(b"partial-next-frame");

        let (body, consumed) = find_frame(&buf).unwrap();
        assert_eq!(body, br#"{"status":"ready"}"#);
        assert_eq!(consumed, buf.len() - b"partial-next-frame".len());
    }

    #[test]
    fn find_frame_returns_none_without_a_delimiter() {
        assert!(find_frame(b"{\"status\":\"ready\"").is_none());
    }
}
