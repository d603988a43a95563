//! Pure, stateless input validation for identifiers, addresses, and secrets.
//! Each check returns a diagnostic describing the first failure rather than
//! a bare bool, so callers can surface something actionable.

const RESERVED_IDENTIFIERS: &[&str] = &[
    "admin",
    "administrator",
    "root",
    "system",
    "moderator",
    "mod",
    "support",
    "help",
    "server",
    "guest",
    "test",
    "null",
];

/// `(valid, diagnostic)`. `diagnostic` is empty when `valid` is true.
pub type Validation = (bool, &'static str);

fn ok() -> Validation {
    (true, "")
}

fn fail(reason: &'static str) -> Validation {
    (false, reason)
}

fn is_special(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

/// Identifier rules: length in [3, 32]; first char a letter; characters in
/// `[A-Za-z0-9._-]`; no two consecutive special characters; does not end
/// with a special character; not a reserved word (case-insensitive).
pub fn validate_identifier(identifier: &str) -> Validation {
    let len = identifier.chars().count();
    if !(3..=32).contains(&len) {
        return fail("identifier length must be between 3 and 32 characters");
    }

    let mut chars = identifier.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() {
        return fail("identifier must start with a letter");
    }

    let mut prev_special = false;
    for c in identifier.chars() {
        if !(c.is_ascii_alphanumeric() || is_special(c)) {
            return fail("identifier contains an invalid character");
        }
        if is_special(c) {
            if prev_special {
                return fail("identifier cannot contain consecutive special characters");
            }
            prev_special = true;
        } else {
            prev_special = false;
        }
    }

    if is_special(identifier.chars().last().unwrap()) {
        return fail("identifier cannot end with a special character");
    }

    if RESERVED_IDENTIFIERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(identifier))
    {
        return fail("identifier is a reserved word");
    }

    ok()
}

const LOCAL_PART_SPECIALS: &str = "!#$%&'*+/=?^_`{|}~.-";

/// Address (email-like) format rules.
pub fn validate_address(address: &str) -> Validation {
    if address.chars().count() > 254 {
        return fail("address exceeds maximum length");
    }

    let at_count = address.matches('@').count();
    if at_count != 1 {
        return fail("address must contain exactly one '@'");
    }

    let (local, domain) = address.split_once('@').unwrap();

    if local.is_empty() || local.chars().count() > 64 {
        return fail("address local part length must be between 1 and 64 characters");
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || LOCAL_PART_SPECIALS.contains(c))
    {
        return fail("address local part contains an invalid character");
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return fail("address local part has a leading, trailing, or consecutive dot");
    }

    if domain.is_empty() || domain.chars().count() > 253 {
        return fail("address domain length must be between 1 and 253 characters");
    }
    if !domain.contains('.') {
        return fail("address domain must contain at least one dot");
    }
    if domain.contains("..") {
        return fail("address domain cannot contain consecutive dots");
    }
    for label in domain.split('.') {
        let label_len = label.chars().count();
        if !(1..=63).contains(&label_len) {
            return fail("address domain label length must be between 1 and 63 characters");
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return fail("address domain label contains an invalid character");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return fail("address domain label cannot start or end with a hyphen");
        }
    }

    ok()
}

/// Secret (password) rules: length in `[min_length, 128]`; at least one
/// upper-case letter, one lower-case letter, one digit, one non-alphanumeric.
pub fn validate_secret(secret: &str, min_length: usize) -> Validation {
    let len = secret.chars().count();
    if len < min_length || len > 128 {
        return fail("secret length is outside the allowed range");
    }

    let has_upper = secret.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = secret.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = secret.chars().any(|c| c.is_ascii_digit());
    let has_symbol = secret.chars().any(|c| !c.is_ascii_alphanumeric());

    if !has_upper {
        return fail("secret must contain an upper-case letter");
    }
    if !has_lower {
        return fail("secret must contain a lower-case letter");
    }
    if !has_digit {
        return fail("secret must contain a digit");
    }
    if !has_symbol {
        return fail("secret must contain a non-alphanumeric character");
    }

    ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_accepts_typical_username() {
        assert_eq!(validate_identifier("Alice1").0, true);
    }

    #[test]
    fn identifier_rejects_too_short() {
        assert_eq!(validate_identifier("ab").0, false);
    }

    #[test]
    fn identifier_rejects_leading_digit() {
        assert_eq!(validate_identifier("1alice").0, false);
    }

    #[test]
    fn identifier_rejects_consecutive_specials() {
        assert_eq!(validate_identifier("alice--bob").0, false);
    }

    #[test]
    fn identifier_rejects_trailing_special() {
        assert_eq!(validate_identifier("alice-").0, false);
    }

    #[test]
    fn identifier_rejects_reserved_word_case_insensitive() {
        assert_eq!(validate_identifier("Admin").0, false);
        assert_eq!(validate_identifier("ROOT").0, false);
    }

    #[test]
    fn address_accepts_typical_email() {
        assert_eq!(validate_address("a@b.co").0, true);
    }

    #[test]
    fn address_rejects_missing_at() {
        assert_eq!(validate_address("ab.co").0, false);
    }

    #[test]
    fn address_rejects_multiple_at() {
        assert_eq!(validate_address("a@b@c.co").0, false);
    }

    #[test]
    fn address_rejects_consecutive_dots_in_domain() {
        assert_eq!(validate_address("a@b..co").0, false);
    }

    #[test]
    fn address_rejects_domain_without_dot() {
        assert_eq!(validate_address("a@localhost").0, false);
    }

    #[test]
    fn address_rejects_hyphen_at_label_edge() {
        assert_eq!(validate_address("a@-b.co").0, false);
    }

    #[test]
    fn secret_accepts_strong_password() {
        assert_eq!(validate_secret("Pa$$w0rd!", 8).0, true);
    }

    #[test]
    fn secret_rejects_missing_symbol() {
        assert_eq!(validate_secret("Password1", 8).0, false);
    }

    #[test]
    fn secret_rejects_too_short() {
        assert_eq!(validate_secret("P1!a", 8).0, false);
    }
}
