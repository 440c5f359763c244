//! One-time clone password generation, grounded on
//! `password.Generate(16, 4, 0, false, true)` in the original — 16
//! characters, at least 4 digits, no symbols, lowercase letters and
//! digits only. No dedicated password-generator crate pulls its own
//! weight for this, so this hand-rolls the rule using `rand` (already a
//! dependency).

use rand::seq::SliceRandom;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Generates a 16-character password with at least
/// [`joe_core::PASSWORD_MIN_DIGITS`] digits, the rest lowercase letters,
/// then shuffles so the digits aren't all clustered at the front.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let length = joe_core::PASSWORD_LENGTH;
    let min_digits = joe_core::PASSWORD_MIN_DIGITS;

    let mut chars: Vec<u8> = Vec::with_capacity(length);
    for _ in 0..min_digits {
        chars.push(*DIGITS.choose(&mut rng).expect("DIGITS is non-empty"));
    }
    for _ in min_digits..length {
        chars.push(*LOWERCASE.choose(&mut rng).expect("LOWERCASE is non-empty"));
    }

    chars.shuffle(&mut rng);
    String::from_utf8(chars).expect("ascii only")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_the_right_length() {
        let pw = generate();
        assert_eq!(pw.len(), joe_core::PASSWORD_LENGTH);
    }

    #[test]
    fn contains_at_least_the_minimum_digits() {
        for _ in 0..50 {
            let pw = generate();
            let digits = pw.chars().filter(|c| c.is_ascii_digit()).count();
            assert!(digits >= joe_core::PASSWORD_MIN_DIGITS, "{pw}");
            assert!(pw.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }
}
