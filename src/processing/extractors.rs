// Field matchers run over the reading-order fragment stream

use chrono::NaiveDate;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::models::{BirthDate, ExtractedFields, Field, Gender, OcrFragment, VerifierConfig};
use crate::processing::layout::{FragmentStream, Line};
use crate::processing::text_correction::{
    alphanumeric, correct_digit_confusions, correct_numeric_token, edit_budget, fuzzy_eq, levenshtein,
    token_set_similarity, EDGE_PUNCTUATION,
};

lazy_static! {
    static ref FULL_DATE: Regex = Regex::new(r"\b(\d{2})[/.\-](\d{2})[/.\-](\d{4})\b").unwrap();
    // A plausible birth year standing alone as its own token
    static ref BARE_YEAR: Regex = Regex::new(r"(?:^|\s)((?:19|20)\d{2})(?:\s|$)").unwrap();
}

const ID_DIGITS: usize = 12;
const BIRTH_LABELS: &[&str] = &["date of birth", "year of birth", "dob", "birth"];
const ISSUE_KEYWORDS: &[&str] = &["issue", "download"];
const GENDER_LABELS: &[&str] = &["sex", "gender"];
const HONORIFICS: &[&str] = &["mr", "mrs", "ms", "shri", "smt", "kumari"];
const MIN_NAME_LETTERS: usize = 3;
const NAME_PUNCTUATION: &[char] = &['.', ','];
/// Lowest record similarity at which a hinted name beats the layout heuristic.
const NAME_HINT_MIN_SIMILARITY: f64 = 50.0;

/// A located field value with the fragments it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch<T> {
    pub value: T,
    /// Reading-order line the field is anchored on.
    pub line: usize,
    pub fragments: Vec<usize>,
}

/// What the caller already expects to find on the card.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionHints<'h> {
    /// Applicant name on file.
    pub name: Option<&'h str>,
}

/// One field recognizer. Matchers are independent of each other, so the
/// order they run in never changes the result.
pub trait FieldMatcher: Send + Sync {
    fn field(&self) -> Field;

    /// Locates the field and records it with its fragment links.
    /// Returns whether a value was found.
    fn extract(&self, stream: &FragmentStream, hints: &ExtractionHints, fields: &mut ExtractedFields) -> bool;
}

/// Finds `label` as a window of consecutive tokens on the line, returning the
/// token position just past the label.
fn find_label(line: &Line, label: &str) -> Option<usize> {
    let words = label.split_whitespace().count();
    let budget = edit_budget(label);
    let tokens: Vec<String> = line.tokens().map(|t| alphanumeric(t).to_lowercase()).collect();
    if tokens.len() < words {
        return None;
    }
    (0..=tokens.len() - words)
        .find(|&start| {
            let window = &tokens[start..start + words];
            !window.iter().any(String::is_empty) && fuzzy_eq(&window.join(" "), label, budget)
        })
        .map(|start| start + words)
}

/// Byte offset in `line.text` where the token at `pos` starts (end of text if past the end).
fn token_offset(line: &Line, pos: usize) -> usize {
    line.spans.get(pos).map_or(line.text.len(), |span| span.start)
}

/// Line text with digit confusions corrected token by token. Byte offsets are preserved.
fn corrected_text(line: &Line) -> String {
    let mut text = line.text.clone();
    for span in &line.spans {
        let fixed = correct_digit_confusions(&line.text[span.clone()]);
        text.replace_range(span.clone(), &fixed);
    }
    text
}

fn full_date_in(line: &Line, from: usize) -> Option<(NaiveDate, Vec<usize>)> {
    let text = corrected_text(line);
    FULL_DATE.captures_iter(&text[from..]).find_map(|caps| {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let whole = caps.get(0)?;
        Some((date, line.fragments_in(from + whole.start()..from + whole.end())))
    })
}

fn bare_year_in(line: &Line, from: usize) -> Option<(BirthDate, Vec<usize>)> {
    let text = corrected_text(line);
    let id_positions: Vec<usize> = numeric_runs(line)
        .into_iter()
        .filter(|(_, digits)| digits.len() == ID_DIGITS)
        .flat_map(|(positions, _)| positions)
        .collect();

    BARE_YEAR.captures_iter(&text[from..]).find_map(|caps| {
        let whole = caps.get(1)?;
        let range = from + whole.start()..from + whole.end();
        if line.positions_in(range.clone()).iter().any(|pos| id_positions.contains(pos)) {
            debug!("Year {} is part of an ID number", whole.as_str());
            return None;
        }
        let year = whole.as_str().parse().ok()?;
        BirthDate::year_only(year).map(|dob| (dob, line.fragments_in(range)))
    })
}

/// Maximal runs of numeric tokens on a line: (token positions, digits).
fn numeric_runs(line: &Line) -> Vec<(Vec<usize>, String)> {
    let mut runs = Vec::new();
    let mut positions = Vec::new();
    let mut digits = String::new();
    // A trailing non-numeric sentinel flushes the last run
    let tokens = line.tokens().map(Some).chain(std::iter::once(None));
    for (pos, token) in tokens.enumerate() {
        if let Some(piece) = token.and_then(correct_numeric_token) {
            positions.push(pos);
            digits.push_str(&piece);
        } else if !positions.is_empty() {
            runs.push((std::mem::take(&mut positions), std::mem::take(&mut digits)));
        }
    }
    runs
}

pub struct IdNumberMatcher;

impl IdNumberMatcher {
    pub fn find(&self, stream: &FragmentStream) -> Option<FieldMatch<String>> {
        let mut best: Option<(f64, FieldMatch<String>)> = None;

        for (line_index, line) in stream.lines().iter().enumerate() {
            for (positions, value) in numeric_runs(line) {
                if value.len() != ID_DIGITS {
                    debug!("Ignoring {}-digit number run on line {}", value.len(), line_index);
                    continue;
                }
                let fragments = line.fragments_at(&positions);
                let confidence = stream.mean_confidence(&fragments);
                debug!("ID candidate {} on line {} (confidence {:.3})", value, line_index, confidence);
                if best.as_ref().map_or(true, |(best_conf, _)| confidence > *best_conf) {
                    best = Some((
                        confidence,
                        FieldMatch {
                            value,
                            line: line_index,
                            fragments,
                        },
                    ));
                }
            }
        }

        best.map(|(_, found)| found)
    }
}

impl FieldMatcher for IdNumberMatcher {
    fn field(&self) -> Field {
        Field::IdNumber
    }

    fn extract(&self, stream: &FragmentStream, _hints: &ExtractionHints, fields: &mut ExtractedFields) -> bool {
        match self.find(stream) {
            Some(found) => {
                fields.link(Field::IdNumber, &found.fragments);
                fields.id_number = Some(found.value);
                true
            }
            None => false,
        }
    }
}

pub struct BirthDateMatcher;

impl BirthDateMatcher {
    pub fn find(&self, stream: &FragmentStream) -> Option<FieldMatch<BirthDate>> {
        let lines = stream.lines();

        for (index, line) in lines.iter().enumerate() {
            let label_end = match BIRTH_LABELS.iter().find_map(|label| find_label(line, label)) {
                Some(end) => end,
                None => continue,
            };
            let from = token_offset(line, label_end);

            let same_line = full_date_in(line, from)
                .map(|(date, fragments)| (BirthDate::full(date), fragments))
                .or_else(|| bare_year_in(line, from));
            let found = same_line.or_else(|| {
                lines.get(index + 1).and_then(|next| {
                    full_date_in(next, 0)
                        .map(|(date, fragments)| (BirthDate::full(date), fragments))
                        .or_else(|| bare_year_in(next, 0))
                })
            });

            if let Some((value, fragments)) = found {
                debug!("Labelled date of birth {} on line {}", value.normalized(), index);
                return Some(FieldMatch {
                    value,
                    line: index,
                    fragments,
                });
            }
        }

        // No usable label: first full date that is not an issue/download date
        lines.iter().enumerate().find_map(|(index, line)| {
            let lower = line.lowercase();
            if ISSUE_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
                return None;
            }
            full_date_in(line, 0).map(|(date, fragments)| {
                debug!("Unlabelled date of birth {} on line {}", date, index);
                FieldMatch {
                    value: BirthDate::full(date),
                    line: index,
                    fragments,
                }
            })
        })
    }
}

impl FieldMatcher for BirthDateMatcher {
    fn field(&self) -> Field {
        Field::DateOfBirth
    }

    fn extract(&self, stream: &FragmentStream, _hints: &ExtractionHints, fields: &mut ExtractedFields) -> bool {
        match self.find(stream) {
            Some(found) => {
                fields.link(Field::DateOfBirth, &found.fragments);
                fields.date_of_birth = Some(found.value);
                true
            }
            None => false,
        }
    }
}

pub struct GenderMatcher;

impl GenderMatcher {
    const FUZZY_VOCABULARY: [(&'static str, Gender); 3] = [
        ("male", Gender::Male),
        ("female", Gender::Female),
        ("transgender", Gender::Other),
    ];

    fn exact(word: &str, labelled: bool) -> Option<Gender> {
        match word {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "transgender" | "other" => Some(Gender::Other),
            "m" if labelled => Some(Gender::Male),
            "f" if labelled => Some(Gender::Female),
            _ => None,
        }
    }

    /// Nearest vocabulary word within one edit; ties give nothing.
    fn fuzzy(word: &str) -> Option<Gender> {
        if word.is_empty() {
            return None;
        }
        let mut best: Option<(usize, Gender)> = None;
        let mut tied = false;
        for (term, gender) in Self::FUZZY_VOCABULARY {
            if !fuzzy_eq(word, term, 1) {
                continue;
            }
            let distance = levenshtein(word, term);
            match best {
                Some((d, g)) if d == distance && g != gender => tied = true,
                Some((d, _)) if d <= distance => {}
                _ => {
                    best = Some((distance, gender));
                    tied = false;
                }
            }
        }
        if tied {
            None
        } else {
            best.map(|(_, gender)| gender)
        }
    }

    /// Exact vocabulary anywhere wins. OCR-damaged words are only accepted
    /// alone on their line or next to a sex/gender label, so surnames one
    /// edit away ("Mane", "Mala") are never read as a gender.
    pub fn find(&self, stream: &FragmentStream) -> Option<FieldMatch<Gender>> {
        let lines: Vec<(bool, Vec<String>)> = stream
            .lines()
            .iter()
            .map(|line| {
                let labelled = GENDER_LABELS.iter().any(|label| find_label(line, label).is_some());
                (labelled, line.tokens().map(|token| alphanumeric(token).to_lowercase()).collect())
            })
            .collect();

        let exact = lines.iter().enumerate().find_map(|(index, (labelled, words))| {
            words
                .iter()
                .enumerate()
                .find_map(|(pos, word)| Self::exact(word, *labelled).map(|value| (index, pos, value)))
        });
        let found = exact.or_else(|| {
            lines.iter().enumerate().find_map(|(index, (labelled, words))| {
                let sole_word = words.iter().filter(|word| !word.is_empty()).count() == 1;
                if !labelled && !sole_word {
                    return None;
                }
                words
                    .iter()
                    .enumerate()
                    .find_map(|(pos, word)| Self::fuzzy(word).map(|value| (index, pos, value)))
            })
        });

        found.map(|(index, pos, value)| {
            let line = &stream.lines()[index];
            debug!("Gender {} from '{}' on line {}", value, line.token(pos), index);
            FieldMatch {
                value,
                line: index,
                fragments: line.fragments_at(&[pos]),
            }
        })
    }
}

impl FieldMatcher for GenderMatcher {
    fn field(&self) -> Field {
        Field::Gender
    }

    fn extract(&self, stream: &FragmentStream, _hints: &ExtractionHints, fields: &mut ExtractedFields) -> bool {
        match self.find(stream) {
            Some(found) => {
                fields.link(Field::Gender, &found.fragments);
                fields.gender = Some(found.value);
                true
            }
            None => false,
        }
    }
}

pub struct NameMatcher {
    stop_words: Vec<String>,
}

impl NameMatcher {
    pub fn new(stop_words: &[String]) -> Self {
        NameMatcher {
            stop_words: stop_words
                .iter()
                .map(|word| word.trim().to_lowercase())
                .filter(|word| !word.is_empty())
                .collect(),
        }
    }

    fn is_name_word(token: &str) -> bool {
        let word = token.trim_end_matches(NAME_PUNCTUATION);
        !word.is_empty() && word.chars().all(|c| c.is_ascii_alphabetic())
    }

    fn contains_stop_word(&self, words: &[&str]) -> bool {
        let padded = format!(" {} ", words.join(" ").to_lowercase());
        self.stop_words
            .iter()
            .any(|stop| padded.contains(&format!(" {} ", stop)))
    }

    /// Candidate name runs on one line: (letter count, text, fragments).
    fn runs(&self, line: &Line) -> Vec<(usize, String, Vec<usize>)> {
        let mut runs = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let positions = (0..line.token_count()).map(Some).chain(std::iter::once(None));

        for pos in positions {
            if let Some(pos) = pos {
                if Self::is_name_word(line.token(pos)) {
                    current.push(pos);
                    continue;
                }
            }
            if current.is_empty() {
                continue;
            }

            let words: Vec<&str> = current
                .iter()
                .map(|&p| line.token(p).trim_end_matches(NAME_PUNCTUATION))
                .collect();
            let skip = words
                .iter()
                .take_while(|word| HONORIFICS.contains(&word.to_lowercase().as_str()))
                .count();
            let (words, positions) = (&words[skip..], &current[skip..]);
            let letters: usize = words.iter().map(|word| word.len()).sum();

            if letters >= MIN_NAME_LETTERS && !self.contains_stop_word(words) {
                runs.push((letters, words.join(" "), line.fragments_at(positions)));
            }
            current.clear();
        }
        runs
    }

    /// Name runs above the first date-of-birth or gender line, in reading
    /// order, with their letter counts.
    pub fn candidates(&self, stream: &FragmentStream) -> Vec<(usize, FieldMatch<String>)> {
        let anchor = [
            BirthDateMatcher.find(stream).map(|found| found.line),
            GenderMatcher.find(stream).map(|found| found.line),
        ]
        .into_iter()
        .flatten()
        .min();
        let anchor = match anchor {
            Some(anchor) => anchor,
            None => return Vec::new(),
        };

        stream.lines()[..anchor]
            .iter()
            .enumerate()
            .flat_map(|(index, line)| {
                self.runs(line).into_iter().map(move |(letters, value, fragments)| {
                    (
                        letters,
                        FieldMatch {
                            value,
                            line: index,
                            fragments,
                        },
                    )
                })
            })
            .collect()
    }

    /// Longest run wins; on a tie the one closer to the anchor.
    pub fn find(&self, stream: &FragmentStream) -> Option<FieldMatch<String>> {
        Self::longest(self.candidates(stream))
    }

    /// Like `find`, but a candidate resembling the expected name is taken
    /// over the layout heuristic.
    pub fn find_guided(&self, stream: &FragmentStream, hints: &ExtractionHints) -> Option<FieldMatch<String>> {
        let candidates = self.candidates(stream);
        let expected = match hints.name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(expected) => expected,
            None => return Self::longest(candidates),
        };

        let mut best: Option<(f64, usize)> = None;
        for (i, (_, found)) in candidates.iter().enumerate() {
            let score = token_set_similarity(&found.value, expected);
            debug!("Name candidate '{}' scores {:.1} against the record", found.value, score);
            if score >= NAME_HINT_MIN_SIMILARITY && best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, i));
            }
        }
        match best {
            Some((_, i)) => candidates.into_iter().nth(i).map(|(_, found)| found),
            None => Self::longest(candidates),
        }
    }

    fn longest(candidates: Vec<(usize, FieldMatch<String>)>) -> Option<FieldMatch<String>> {
        let mut best: Option<(usize, FieldMatch<String>)> = None;
        for (letters, found) in candidates {
            let better = match &best {
                None => true,
                Some((best_letters, current)) => {
                    letters > *best_letters || (letters == *best_letters && found.line > current.line)
                }
            };
            if better {
                best = Some((letters, found));
            }
        }
        best.map(|(_, found)| {
            debug!("Name '{}' on line {}", found.value, found.line);
            found
        })
    }
}

impl FieldMatcher for NameMatcher {
    fn field(&self) -> Field {
        Field::Name
    }

    fn extract(&self, stream: &FragmentStream, hints: &ExtractionHints, fields: &mut ExtractedFields) -> bool {
        match self.find_guided(stream, hints) {
            Some(found) => {
                fields.link(Field::Name, &found.fragments);
                fields.name = Some(found.value);
                true
            }
            None => false,
        }
    }
}

pub struct ReferenceNumberMatcher {
    labels: Vec<String>,
    min_digits: usize,
    max_digits: usize,
}

impl ReferenceNumberMatcher {
    pub fn new(labels: &[String], min_digits: usize, max_digits: usize) -> Self {
        ReferenceNumberMatcher {
            labels: labels
                .iter()
                .map(|label| label.trim().to_lowercase())
                .filter(|label| !label.is_empty())
                .collect(),
            min_digits,
            max_digits,
        }
    }

    fn number_piece(token: &str) -> Option<String> {
        let trimmed = token.trim_matches(EDGE_PUNCTUATION);
        let fixed = correct_digit_confusions(trimmed);
        let valid = fixed.chars().any(|c| c.is_ascii_digit())
            && fixed.chars().all(|c| c.is_ascii_digit() || c == '/');
        valid.then_some(fixed)
    }

    /// First run of digit groups on `line` starting at token `from`.
    fn number_after(&self, line: &Line, from: usize) -> Option<(String, Vec<usize>)> {
        let start = (from..line.token_count()).find(|&pos| Self::number_piece(line.token(pos)).is_some())?;
        let mut value = String::new();
        let mut positions = Vec::new();
        for pos in start..line.token_count() {
            match Self::number_piece(line.token(pos)) {
                Some(piece) => {
                    value.push_str(&piece);
                    positions.push(pos);
                }
                None => break,
            }
        }
        let fragments = line.fragments_at(&positions);

        let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
        if digits == ID_DIGITS || digits < self.min_digits || digits > self.max_digits {
            debug!("Rejecting reference candidate {} ({} digits)", value, digits);
            return None;
        }
        Some((value, fragments))
    }

    pub fn find(&self, stream: &FragmentStream) -> Option<FieldMatch<String>> {
        let lines = stream.lines();
        for (index, line) in lines.iter().enumerate() {
            let label_end = match self.labels.iter().find_map(|label| find_label(line, label)) {
                Some(end) => end,
                None => continue,
            };
            let found = self
                .number_after(line, label_end)
                .or_else(|| lines.get(index + 1).and_then(|next| self.number_after(next, 0)));
            if let Some((value, fragments)) = found {
                debug!("Reference number {} near label on line {}", value, index);
                return Some(FieldMatch {
                    value,
                    line: index,
                    fragments,
                });
            }
        }
        None
    }
}

impl FieldMatcher for ReferenceNumberMatcher {
    fn field(&self) -> Field {
        Field::ReferenceNumber
    }

    fn extract(&self, stream: &FragmentStream, _hints: &ExtractionHints, fields: &mut ExtractedFields) -> bool {
        match self.find(stream) {
            Some(found) => {
                fields.link(Field::ReferenceNumber, &found.fragments);
                fields.reference_number = Some(found.value);
                true
            }
            None => false,
        }
    }
}

/// Runs every field matcher over one page's fragments.
pub struct FieldExtractor {
    matchers: Vec<Box<dyn FieldMatcher>>,
}

impl FieldExtractor {
    pub fn new(config: &VerifierConfig) -> Self {
        FieldExtractor {
            matchers: vec![
                Box::new(IdNumberMatcher),
                Box::new(BirthDateMatcher),
                Box::new(GenderMatcher),
                Box::new(NameMatcher::new(&config.stop_words)),
                Box::new(ReferenceNumberMatcher::new(
                    &config.reference_labels,
                    config.reference_min_digits,
                    config.reference_max_digits,
                )),
            ],
        }
    }

    pub fn extract(&self, fragments: &[OcrFragment]) -> ExtractedFields {
        self.extract_guided(fragments, &ExtractionHints::default())
    }

    /// Extraction that may lean on what the caller expects to find.
    pub fn extract_guided(&self, fragments: &[OcrFragment], hints: &ExtractionHints) -> ExtractedFields {
        let stream = FragmentStream::new(fragments);
        for line in stream.lines() {
            debug!("OCR line: {}", line.text);
        }

        let mut fields = ExtractedFields::default();
        for matcher in &self.matchers {
            if !matcher.extract(&stream, hints, &mut fields) {
                debug!("No match for {:?}", matcher.field());
            }
        }
        fields
    }
}
