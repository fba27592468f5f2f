//! Masking of personal data in audit details.

const MASK: &str = "***";

/// Mask an email address, keeping the first two characters of the local
/// part and the full domain: `jordan@example.com` becomes `jo***@example.com`.
///
/// Values without an `@` are fully masked; empty values stay empty.
pub fn mask_email(email: &str) -> String {
    if email.is_empty() {
        return String::new();
    }
    match email.split_once('@') {
        Some((name, domain)) if !domain.is_empty() => {
            let prefix: String = name.chars().take(2).collect();
            format!("{prefix}{MASK}@{domain}")
        }
        _ => MASK.to_string(),
    }
}
