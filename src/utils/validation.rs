/// Validate that a string is not empty after trimming
pub fn is_not_empty(s: &str) -> bool {
    !s.trim().is_empty()
}

/// Validate email format
pub fn is_valid_email(email: &str) -> bool {
    // Simple email validation
    email.contains('@') && email.contains('.') && email.len() >= 5
}

/// Validate URL format
pub fn is_valid_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Validate that a string is a well-formed UUID (any RFC 4122 version).
/// Room ids are rejected before any database round trip if this fails.
pub fn is_valid_uuid(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}

/// Validate a room-secret hash: 64 lowercase hex characters (sha256 digest).
pub fn is_valid_password_hash(hash: &str) -> bool {
    hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Validate a target URL (link-type file payload). Only http/https schemes
/// are accepted; bare hosts and other schemes (javascript:, data:, file:)
/// are rejected.
pub fn is_valid_target_url(url: &str) -> bool {
    is_valid_url(url) && url::Url::parse(url).is_ok()
}

/// Validate an uploaded filename before it is used to construct a blob key.
/// Rejects path separators and null bytes, per the one boundary case the
/// storage layer must never see reach `S3Service`.
pub fn is_valid_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_empty() {
        assert!(is_not_empty("hello"));
        assert!(!is_not_empty(""));
        assert!(!is_not_empty("   "));
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://example.com"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("example.com"));
    }

    #[test]
    fn test_is_valid_uuid() {
        assert!(is_valid_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_valid_uuid("not-a-uuid"));
        assert!(!is_valid_uuid(""));
    }

    #[test]
    fn test_is_valid_password_hash() {
        let hash = "a".repeat(64);
        assert!(is_valid_password_hash(&hash));
        assert!(!is_valid_password_hash(&"A".repeat(64)));
        assert!(!is_valid_password_hash("abc123"));
    }

    #[test]
    fn test_is_valid_target_url() {
        assert!(is_valid_target_url("https://example.com/path"));
        assert!(!is_valid_target_url("javascript:alert(1)"));
        assert!(!is_valid_target_url("not a url"));
    }

    #[test]
    fn test_is_valid_filename() {
        assert!(is_valid_filename("report.pdf"));
        assert!(!is_valid_filename("../etc/passwd"));
        assert!(!is_valid_filename("a/b.txt"));
        assert!(!is_valid_filename("null\0byte"));
        assert!(!is_valid_filename(""));
    }
}
