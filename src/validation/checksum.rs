// Verhoeff check digit scheme (dihedral group D5), used on Aadhaar numbers

const MULTIPLICATION: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

const PERMUTATION: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const INVERSE: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

pub struct Verhoeff;

impl Verhoeff {
    fn digits(number: &str) -> Option<Vec<u8>> {
        if number.is_empty() {
            return None;
        }
        number
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect()
    }

    /// True when the last digit of `number` is its Verhoeff check digit.
    pub fn is_valid(number: &str) -> bool {
        let digits = match Self::digits(number) {
            Some(digits) => digits,
            None => return false,
        };
        let check = digits.iter().rev().enumerate().fold(0u8, |c, (i, &digit)| {
            MULTIPLICATION[c as usize][PERMUTATION[i % 8][digit as usize] as usize]
        });
        check == 0
    }

    /// Check digit to append to `payload`, or `None` if it is not all digits.
    pub fn check_digit(payload: &str) -> Option<u8> {
        let digits = Self::digits(payload)?;
        let check = digits.iter().rev().enumerate().fold(0u8, |c, (i, &digit)| {
            MULTIPLICATION[c as usize][PERMUTATION[(i + 1) % 8][digit as usize] as usize]
        });
        Some(INVERSE[check as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(Verhoeff::check_digit("236"), Some(3));
        assert!(Verhoeff::is_valid("2363"));
        assert!(!Verhoeff::is_valid("2364"));
        assert!(Verhoeff::is_valid("123412341234"));
    }

    #[test]
    fn test_single_digit_change_is_detected() {
        assert!(!Verhoeff::is_valid("123412341235"));
        assert!(!Verhoeff::is_valid("123412341284"));
    }

    #[test]
    fn test_adjacent_transposition_is_detected() {
        assert!(!Verhoeff::is_valid("213412341234"));
    }

    #[test]
    fn test_generated_digit_validates() {
        for payload in ["12341234123", "99999999999", "50000000000", "8"] {
            let check = Verhoeff::check_digit(payload).unwrap();
            assert!(Verhoeff::is_valid(&format!("{}{}", payload, check)), "{}", payload);
        }
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!(!Verhoeff::is_valid(""));
        assert!(!Verhoeff::is_valid("1234 1234 1234"));
        assert_eq!(Verhoeff::check_digit("12a"), None);
    }
}
