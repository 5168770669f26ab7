// OCR confusion correction and fuzzy string comparison helpers

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;

lazy_static! {
    // Letters that OCR commonly produces in place of digits on printed numbers
    static ref DIGIT_CONFUSIONS: HashMap<char, char> = {
        let mut m = HashMap::new();
        m.insert('O', '0');
        m.insert('o', '0');
        m.insert('D', '0');
        m.insert('Q', '0');
        m.insert('I', '1');
        m.insert('l', '1');
        m.insert('|', '1');
        m.insert('Z', '2');
        m.insert('z', '2');
        m.insert('S', '5');
        m.insert('s', '5');
        m.insert('G', '6');
        m.insert('B', '8');
        m
    };
}

pub const EDGE_PUNCTUATION: &[char] = &['.', ',', ':', ';'];

/// Corrects a token that is mostly digits into a digits-only string.
///
/// Returns `None` when the token is not predominantly numeric or still
/// carries characters that cannot be mapped onto a digit. Leading and
/// trailing `.,:;` are ignored; any other symbol (e.g. `+`) rejects the token.
pub fn correct_numeric_token(token: &str) -> Option<String> {
    let trimmed = token.trim_matches(EDGE_PUNCTUATION);
    if trimmed.is_empty() {
        return None;
    }

    let digits = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
    let total = trimmed.chars().count();
    if digits == 0 || digits * 2 <= total {
        return None;
    }

    trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                Some(c)
            } else {
                DIGIT_CONFUSIONS.get(&c).copied()
            }
        })
        .collect()
}

/// Maps confusable letters onto digits inside a token that is mostly digits
/// (dates, grouped numbers), leaving every other token untouched. The output
/// has the same byte length as the input.
pub fn correct_digit_confusions(token: &str) -> String {
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    let alnum = token.chars().filter(|c| c.is_ascii_alphanumeric()).count();
    if digits == 0 || digits * 2 <= alnum {
        return token.to_string();
    }
    token
        .chars()
        .map(|c| DIGIT_CONFUSIONS.get(&c).copied().unwrap_or(c))
        .collect()
}

/// Classic Levenshtein edit distance over chars.
pub fn levenshtein(s1: &str, s2: &str) -> usize {
    if s1 == s2 {
        return 0;
    }

    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        current[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            current[j] = (previous[j] + 1)
                .min(current[j - 1] + 1)
                .min(previous[j - 1] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Similarity ratio in [0, 100], case-insensitive.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100.0;
    }
    let distance = levenshtein(&a, &b) as f64;
    (1.0 - distance / longest as f64).max(0.0) * 100.0
}

/// Similarity after sorting the whitespace-separated words, so word order
/// does not matter ("Sawant Shubham" vs "Shubham Sawant").
pub fn token_sort_similarity(a: &str, b: &str) -> f64 {
    let sorted = |text: &str| {
        let mut words: Vec<String> = text.split_whitespace().map(|w| w.to_lowercase()).collect();
        words.sort();
        words.join(" ")
    };
    similarity(&sorted(a), &sorted(b))
}

/// Similarity of the shared words against each side's full word set, so a
/// name missing a middle name still scores high ("Shubham Sawant" vs
/// "Shubham Avinash Sawant"). Zero when either side has no words.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let words = |text: &str| -> BTreeSet<String> {
        text.split_whitespace()
            .map(|word| alphanumeric(word).to_lowercase())
            .filter(|word| !word.is_empty())
            .collect()
    };
    let (a, b) = (words(a), words(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let join = |words: Vec<&String>| words.into_iter().map(String::as_str).collect::<Vec<_>>().join(" ");
    let common = join(a.intersection(&b).collect());
    let with_rest = |rest: Vec<&String>| {
        let rest = join(rest);
        format!("{} {}", common, rest).trim().to_string()
    };
    let left = with_rest(a.difference(&b).collect());
    let right = with_rest(b.difference(&a).collect());

    similarity(&common, &left)
        .max(similarity(&common, &right))
        .max(similarity(&left, &right))
}

/// Edit budget allowed when matching a label of this length.
pub fn edit_budget(label: &str) -> usize {
    match label.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Case-insensitive comparison within an edit budget.
pub fn fuzzy_eq(word: &str, target: &str, budget: usize) -> bool {
    let word = word.to_lowercase();
    let target = target.to_lowercase();
    if budget == 0 {
        return word == target;
    }
    // Cheap length filter before the full distance
    let (lw, lt) = (word.chars().count(), target.chars().count());
    if lw.abs_diff(lt) > budget {
        return false;
    }
    levenshtein(&word, &target) <= budget
}

/// Strips everything except ASCII letters and digits.
pub fn alphanumeric(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}
