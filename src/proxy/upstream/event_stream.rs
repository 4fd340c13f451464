// CodeWhisperer binary event stream decoder
// Frame layout: totalLength(4, BE) + headerLength(4, BE) + 4 reserved bytes +
// header bytes (ignored) + JSON payload + 4 trailing bytes.

use serde_json::Value;
use tracing::debug;

/// Decode a complete response buffer into the JSON events embedded in its
/// frames. Malformed frames are skipped, never fatal: a corrupt frame must
/// not abort decoding of the rest of the stream.
pub fn decode_event_stream(data: &[u8]) -> Vec<Value> {
    let mut events = Vec::new();
    let mut offset = 0usize;

    while offset + 12 <= data.len() {
        let total_len = read_i32(data, offset);
        let header_len = read_i32(data, offset + 4);

        if total_len <= 0 || header_len < 0 {
            // Corrupt length fields, nothing trustworthy past this point.
            break;
        }
        let total_len = total_len as usize;
        let header_len = header_len as usize;

        if offset + total_len > data.len() {
            break;
        }

        let payload_start = offset + 8 + header_len;
        let payload_end = match (offset + total_len).checked_sub(4) {
            Some(end) => end,
            None => 0,
        };

        if payload_start >= payload_end || payload_end > data.len() {
            offset += total_len;
            continue;
        }

        // The slice still carries the reserved bytes ahead of the JSON;
        // scanning for the first '{' drops them along with any header noise.
        let payload = String::from_utf8_lossy(&data[payload_start..payload_end]);
        let trimmed = payload.trim();
        if let Some(json_index) = trimmed.find('{') {
            match serde_json::from_str::<Value>(&trimmed[json_index..]) {
                Ok(event) => events.push(event),
                Err(err) => debug!("Failed to parse event payload as JSON: {}", err),
            }
        }

        offset += total_len;
    }

    events
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
