use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Wraps a base64 PNG payload as a `data:image/png;base64,...` URL.
pub fn png_data_url(base64_payload: &str) -> String {
    format!("{PNG_DATA_URL_PREFIX}{base64_payload}")
}

/// Encodes raw PNG bytes as a data URL.
pub fn png_bytes_to_data_url(png: &[u8]) -> String {
    png_data_url(&STANDARD.encode(png))
}

/// Returns the base64 payload following the first comma of a data URL, or the
/// input itself when it carries no `data:` header.
pub fn data_url_payload(data_url: &str) -> &str {
    let trimmed = data_url.trim();
    if !trimmed.starts_with("data:") {
        return trimmed;
    }
    trimmed
        .split_once(',')
        .map(|(_, payload)| payload)
        .unwrap_or_default()
}

/// Decodes the payload of a base64 data URL into raw bytes.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data_url_payload(data_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_strips_header() {
        assert_eq!(data_url_payload("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(data_url_payload("data:image/jpeg;base64,"), "");
        assert_eq!(data_url_payload("QUJD"), "QUJD");
    }

    #[test]
    fn test_bytes_round_trip_through_data_url() {
        let url = png_bytes_to_data_url(b"ABC");
        assert_eq!(url, "data:image/png;base64,QUJD");
        assert_eq!(decode_data_url(&url).unwrap(), b"ABC");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }
}
