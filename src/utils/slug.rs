use slug::slugify;

/// Generate the zip archive base name for a room's bulk download.
pub fn generate_simple_slug(title: &str) -> String {
    slugify(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_simple_slug() {
        let slug = generate_simple_slug("Hello World!");
        assert_eq!(slug, "hello-world");
    }

    #[test]
    fn test_unicode_slug() {
        let slug = generate_simple_slug("नेपाल Tourism");
        // Unicode characters are transliterated or removed
        assert!(!slug.is_empty());
    }
}
