//! Password strength policy and history reuse check.
//!
//! `validate` is a pure function: policy failures come back as a
//! structured violation list, never as errors. The history check reuses
//! the same Argon2id verification as login so a candidate matching any
//! retained hash is rejected.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::password::verify_password;

pub const MIN_LENGTH: usize = 12;
pub const MAX_LENGTH: usize = 128;

/// Keyboard rows checked for adjacency runs, forward and reverse.
const KEYBOARD_ROWS: &[&str] = &["qwertyuiop", "asdfghjkl", "zxcvbnm", "1234567890"];

/// Static denylist of the most common leaked passwords (lowercased).
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "passw0rd",
    "p@ssw0rd",
    "123456",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty",
    "qwerty123",
    "qwertyuiop",
    "iloveyou",
    "admin",
    "administrator",
    "welcome",
    "welcome1",
    "letmein",
    "monkey",
    "dragon",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "superman",
    "batman",
    "trustno1",
    "master",
    "shadow",
    "michael",
    "jennifer",
    "charlie",
    "abc123",
    "696969",
    "111111",
    "000000",
    "654321",
    "1q2w3e4r",
    "zaq12wsx",
    "password!",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyViolation {
    TooShort,
    TooLong,
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSymbol,
    CommonPassword,
    SequentialCharacters,
    RepeatedCharacters,
}

impl PolicyViolation {
    pub fn description(&self) -> &'static str {
        match self {
            PolicyViolation::TooShort => "must be at least 12 characters",
            PolicyViolation::TooLong => "must be at most 128 characters",
            PolicyViolation::MissingUppercase => "must contain an uppercase letter",
            PolicyViolation::MissingLowercase => "must contain a lowercase letter",
            PolicyViolation::MissingDigit => "must contain a digit",
            PolicyViolation::MissingSymbol => "must contain a symbol",
            PolicyViolation::CommonPassword => "is too common",
            PolicyViolation::SequentialCharacters => {
                "must not contain sequential characters (e.g. 'abc', '123')"
            }
            PolicyViolation::RepeatedCharacters => {
                "must not repeat the same character three or more times"
            }
        }
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone)]
pub struct PolicyReport {
    pub violations: Vec<PolicyViolation>,
}

impl PolicyReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Convert into a result for flows that treat violations as errors.
    pub fn into_result(self) -> Result<(), AuthError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(AuthError::PolicyViolations(self.violations))
        }
    }
}

/// Check a candidate password against every strength rule.
pub fn validate(password: &str) -> PolicyReport {
    let mut violations = Vec::new();

    let char_count = password.chars().count();
    if char_count < MIN_LENGTH {
        violations.push(PolicyViolation::TooShort);
    }
    if char_count > MAX_LENGTH {
        violations.push(PolicyViolation::TooLong);
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        violations.push(PolicyViolation::MissingUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        violations.push(PolicyViolation::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push(PolicyViolation::MissingDigit);
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        violations.push(PolicyViolation::MissingSymbol);
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        violations.push(PolicyViolation::CommonPassword);
    }

    if has_sequential_run(&lowered) {
        violations.push(PolicyViolation::SequentialCharacters);
    }
    if has_repeat_run(password) {
        violations.push(PolicyViolation::RepeatedCharacters);
    }

    PolicyReport { violations }
}

/// Compare a candidate against retained password hashes.
///
/// Returns `Ok(true)` when the candidate matches any of them (reuse
/// detected — reject). Malformed stored hashes are skipped rather than
/// failing the whole check.
pub fn is_reused(
    candidate: &str,
    recent_hashes: &[String],
    pepper: Option<&str>,
) -> Result<bool, AuthError> {
    for hash in recent_hashes {
        match verify_password(candidate, hash, pepper) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(AuthError::Crypto(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

/// Detect a 3+-character monotonic code-point run (ascending or
/// descending) or a keyboard-adjacency run. Input is pre-lowercased.
fn has_sequential_run(lowered: &str) -> bool {
    let chars: Vec<char> = lowered.chars().collect();
    for window in chars.windows(3) {
        let (a, b, c) = (window[0] as u32, window[1] as u32, window[2] as u32);
        if (b == a + 1 && c == b + 1) || (a == b + 1 && b == c + 1) {
            return true;
        }
    }

    for window in chars.windows(3) {
        let run: String = window.iter().collect();
        let reversed: String = window.iter().rev().collect();
        for row in KEYBOARD_ROWS {
            if row.contains(&run) || row.contains(&reversed) {
                return true;
            }
        }
    }

    false
}

/// Detect the same character repeated 3+ times consecutively.
fn has_repeat_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars
        .windows(3)
        .any(|w| w[0] == w[1] && w[1] == w[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;

    fn violations_of(password: &str) -> Vec<PolicyViolation> {
        validate(password).violations
    }

    #[test]
    fn strong_password_passes() {
        let report = validate("Mangrove!7Kite");
        assert!(report.is_valid(), "unexpected: {:?}", report.violations);
    }

    #[test]
    fn too_short_rejected() {
        assert!(violations_of("Ab1!x").contains(&PolicyViolation::TooShort));
    }

    #[test]
    fn too_long_rejected() {
        let long = format!("Aa1!{}", "x".repeat(130));
        assert!(violations_of(&long).contains(&PolicyViolation::TooLong));
    }

    #[test]
    fn missing_character_classes_reported() {
        let v = violations_of("alllowercase!7x");
        assert!(v.contains(&PolicyViolation::MissingUppercase));

        let v = violations_of("ALLUPPERCASE!7X");
        assert!(v.contains(&PolicyViolation::MissingLowercase));

        let v = violations_of("NoDigitsHere!x");
        assert!(v.contains(&PolicyViolation::MissingDigit));

        let v = violations_of("NoSymbolsHere7x");
        assert!(v.contains(&PolicyViolation::MissingSymbol));
    }

    #[test]
    fn common_password_rejected() {
        assert!(violations_of("Password123").contains(&PolicyViolation::CommonPassword));
    }

    #[test]
    fn ascending_sequence_rejected() {
        assert!(violations_of("Kite!9Mxyzel").contains(&PolicyViolation::SequentialCharacters));
    }

    #[test]
    fn descending_sequence_rejected() {
        assert!(violations_of("Kite!9M321el").contains(&PolicyViolation::SequentialCharacters));
    }

    #[test]
    fn keyboard_run_rejected() {
        assert!(violations_of("Kite!9Mqweel").contains(&PolicyViolation::SequentialCharacters));
        // Reverse keyboard run too.
        assert!(violations_of("Kite!9Mewqel").contains(&PolicyViolation::SequentialCharacters));
    }

    #[test]
    fn repeated_characters_rejected() {
        assert!(violations_of("Kite!9Maaael").contains(&PolicyViolation::RepeatedCharacters));
    }

    #[test]
    fn two_in_a_row_is_fine() {
        let report = validate("Kite!9Maabel");
        assert!(
            !report
                .violations
                .contains(&PolicyViolation::RepeatedCharacters)
        );
    }

    #[test]
    fn reuse_detected_against_recent_hashes() {
        let hashes = vec![
            hash_password("Old!Password7x", None).unwrap(),
            hash_password("Older!Password7x", None).unwrap(),
        ];
        assert!(is_reused("Old!Password7x", &hashes, None).unwrap());
        assert!(!is_reused("Fresh!Password7x", &hashes, None).unwrap());
    }

    #[test]
    fn reuse_check_respects_pepper() {
        let hashes = vec![hash_password("Old!Password7x", Some("pep")).unwrap()];
        assert!(is_reused("Old!Password7x", &hashes, Some("pep")).unwrap());
        assert!(!is_reused("Old!Password7x", &hashes, None).unwrap());
    }
}
