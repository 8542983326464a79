//! Response header parsing helpers.

/// Parse filename from a Content-Disposition header value.
/// Parses both `filename="name.pdf"` and `filename*=UTF-8''name.pdf` formats.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(start) = header.find("filename*=") {
        let rest = &header[start + 10..];
        if let Some(quote_start) = rest.find("''") {
            let encoded = rest[quote_start + 2..].split([';', ' ']).next()?;
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let filename = decoded.trim().to_string();
                if !filename.is_empty() {
                    return Some(filename);
                }
            }
        }
    }

    // Try filename= (standard format)
    if let Some(start) = header.find("filename=") {
        let rest = &header[start + 9..];
        let filename = if let Some(quoted) = rest.strip_prefix('"') {
            quoted.split('"').next()
        } else {
            rest.split([';', ' ']).next()
        };

        if let Some(name) = filename {
            let name = name.trim().to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    None
}

/// Parse the complete resource size from a Content-Range header value,
/// e.g. `bytes 100-1023/1024` -> 1024. Returns None for unknown (`/*`).
pub fn content_range_total(value: &str) -> Option<u64> {
    let total = value.rsplit('/').next()?.trim();
    total.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_filename() {
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=\"report.pdf\""),
            Some("report.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_unquoted_filename() {
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=data.csv"),
            Some("data.csv".to_string())
        );
    }

    #[test]
    fn test_parse_rfc5987_filename() {
        assert_eq!(
            parse_content_disposition_filename("attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"),
            Some("résumé.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_missing_filename() {
        assert_eq!(parse_content_disposition_filename("inline"), None);
        assert_eq!(parse_content_disposition_filename("attachment; filename="), None);
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("bytes 100-1023/1024"), Some(1024));
        assert_eq!(content_range_total("bytes */2048"), Some(2048));
        assert_eq!(content_range_total("bytes 0-99/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }
}
