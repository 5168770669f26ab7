use std::ops::Range;

use crate::models::OcrFragment;

/// One visual line of text, tokens ordered left to right.
///
/// A fragment holding several words (line-level OCR output) contributes one
/// token per word; those tokens share the fragment index.
#[derive(Debug, Clone)]
pub struct Line {
    /// Fragment index of each token.
    pub fragments: Vec<usize>,
    /// Token texts joined by single spaces.
    pub text: String,
    /// Byte range of each token inside `text`, parallel to `fragments`.
    pub spans: Vec<Range<usize>>,
}

impl Line {
    pub fn token_count(&self) -> usize {
        self.fragments.len()
    }

    /// Text of the token at position `pos` within the line.
    pub fn token(&self, pos: usize) -> &str {
        &self.text[self.spans[pos].clone()]
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.spans.iter().map(move |span| &self.text[span.clone()])
    }

    /// Token positions overlapping the byte range `range` of `text`.
    pub fn positions_in(&self, range: Range<usize>) -> Vec<usize> {
        self.spans
            .iter()
            .enumerate()
            .filter(|(_, span)| span.start < range.end && range.start < span.end)
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Distinct fragments whose tokens overlap the byte range `range` of `text`.
    pub fn fragments_in(&self, range: Range<usize>) -> Vec<usize> {
        self.fragments_at(&self.positions_in(range))
    }

    /// Distinct fragments behind the tokens at `positions`, in first-seen order.
    pub fn fragments_at(&self, positions: &[usize]) -> Vec<usize> {
        let mut fragments: Vec<usize> = Vec::with_capacity(positions.len());
        for &pos in positions {
            let fragment = self.fragments[pos];
            if !fragments.contains(&fragment) {
                fragments.push(fragment);
            }
        }
        fragments
    }

    pub fn lowercase(&self) -> String {
        self.text.to_lowercase()
    }
}

/// OCR fragments regrouped into reading order.
///
/// Engines do not guarantee any ordering of their output, so lines are
/// rebuilt from bounding-box geometry: fragments whose vertical extents
/// overlap by at least half of the smaller height share a line.
#[derive(Debug)]
pub struct FragmentStream<'a> {
    fragments: &'a [OcrFragment],
    lines: Vec<Line>,
}

impl<'a> FragmentStream<'a> {
    pub fn new(fragments: &'a [OcrFragment]) -> Self {
        let mut order: Vec<usize> = (0..fragments.len())
            .filter(|&i| !fragments[i].text.trim().is_empty())
            .collect();
        order.sort_by_key(|&i| (fragments[i].bbox.center_y(), fragments[i].bbox.x, i));

        // (top, bottom, members) per line under construction
        let mut groups: Vec<(u32, u32, Vec<usize>)> = Vec::new();
        for index in order {
            let bbox = fragments[index].bbox;
            let (top, bottom) = (bbox.y, bbox.bottom());
            let joins = groups.last().map_or(false, |(line_top, line_bottom, _)| {
                let overlap = bottom.min(*line_bottom).saturating_sub(top.max(*line_top));
                let smaller = (bottom - top).min(line_bottom - line_top);
                overlap * 2 >= smaller
            });
            match groups.last_mut() {
                Some((line_top, line_bottom, members)) if joins => {
                    *line_top = (*line_top).min(top);
                    *line_bottom = (*line_bottom).max(bottom);
                    members.push(index);
                }
                _ => groups.push((top, bottom, vec![index])),
            }
        }

        let lines = groups
            .into_iter()
            .map(|(_, _, mut members)| {
                members.sort_by_key(|&i| (fragments[i].bbox.x, i));
                Self::build_line(fragments, members)
            })
            .collect();

        FragmentStream { fragments, lines }
    }

    fn build_line(fragments: &[OcrFragment], members: Vec<usize>) -> Line {
        let mut text = String::new();
        let mut tokens = Vec::with_capacity(members.len());
        let mut spans = Vec::with_capacity(members.len());
        for &index in &members {
            for word in fragments[index].text.split_whitespace() {
                if !text.is_empty() {
                    text.push(' ');
                }
                let start = text.len();
                text.push_str(word);
                spans.push(start..text.len());
                tokens.push(index);
            }
        }
        Line {
            fragments: tokens,
            text,
            spans,
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn fragment(&self, index: usize) -> &OcrFragment {
        &self.fragments[index]
    }

    pub fn fragments(&self) -> &'a [OcrFragment] {
        self.fragments
    }

    /// Mean confidence of the given fragments, 0 when empty.
    pub fn mean_confidence(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        indices
            .iter()
            .map(|&i| self.fragments[i].confidence as f64)
            .sum::<f64>()
            / indices.len() as f64
    }
}
