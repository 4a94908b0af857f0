//! Masking of sensitive values in log fields.

/// Masks tokens, chat ids and email addresses when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Redactor {
    enabled: bool,
}

impl Redactor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// The value as it may appear in a log line.
    pub fn mask(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }
        if let Some((local, domain)) = value.split_once('@') {
            let first: String = local.chars().take(1).collect();
            return format!("{first}***@{domain}");
        }
        let visible: String = value.chars().take(3).collect();
        if value.chars().count() <= 3 {
            "***".to_string()
        } else {
            format!("{visible}***")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_passes_through() {
        let r = Redactor::new(false);
        assert_eq!(r.mask("abc123"), "abc123");
    }

    #[test]
    fn masks_tokens_and_addresses() {
        let r = Redactor::new(true);
        assert_eq!(r.mask("abc123"), "abc***");
        assert_eq!(r.mask("ab"), "***");
        assert_eq!(r.mask("alice@example.com"), "a***@example.com");
    }
}
