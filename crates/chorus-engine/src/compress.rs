//! Lossy, deterministic context compression.
//!
//! Not semantic summarization: a sentence-selection heuristic that keeps
//! the boundary sentences verbatim and fills the budget with the densest
//! middles. Determinism (same input, same output) is what makes the
//! orchestration tests reproducible.

const CONCLUSION_MARKERS: [&str; 4] = ["therefore", "thus", "hence", "conclude"];
const EMPHASIS_MARKERS: [&str; 4] = ["important", "significant", "key", "critical"];

/// Compress `text` toward `target_length` characters.
///
/// Inputs of three sentences or fewer come back unchanged. Otherwise the
/// boundary sentences are retained verbatim (the middle pass reserves
/// room for the last one), and middle sentences are added greedily in
/// descending score order (original order breaks ties) until the next
/// candidate would overflow the budget — first fit, no backtracking.
/// Survivors are joined in their original relative order, not score
/// order. The last sentence is dropped only when the two boundary
/// sentences alone already exceed the budget.
pub fn compress(text: &str, target_length: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= 3 {
        return text.to_owned();
    }

    let first = &sentences[0];
    let last = &sentences[sentences.len() - 1];

    // (index within the middle slice, sentence, score)
    let mut middles: Vec<(usize, &str, u32)> = sentences[1..sentences.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, s)| (i, s.as_str(), sentence_score(s)))
        .collect();
    middles.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

    // The +1 terms account for joining spaces.
    let middle_budget = target_length.saturating_sub(last.len() + 1);
    let mut picked = Vec::new();
    let mut used = first.len();
    for (idx, sentence, _) in &middles {
        if used + sentence.len() + 1 > middle_budget {
            break;
        }
        picked.push(*idx);
        used += sentence.len() + 1;
    }
    picked.sort_unstable();

    let mut selected: Vec<&str> = Vec::with_capacity(picked.len() + 2);
    selected.push(first);
    for idx in picked {
        selected.push(&sentences[idx + 1]);
    }
    if used + last.len() + 1 <= target_length {
        selected.push(last);
    }

    selected.join(" ")
}

/// Density heuristic: digits and marker words flag sentences worth
/// keeping; anything longer than five words gets a nudge.
fn sentence_score(sentence: &str) -> u32 {
    let lower = sentence.to_lowercase();
    let mut score = 0;
    if sentence.chars().any(|c| c.is_ascii_digit()) {
        score += 2;
    }
    if CONCLUSION_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 3;
    }
    if EMPHASIS_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 2;
    }
    if sentence.split_whitespace().count() > 5 {
        score += 1;
    }
    score
}

/// Split on sentence terminators followed by whitespace. Runs of
/// terminators ("...", "?!") stay attached to their sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            while let Some(&next) = chars.peek() {
                if matches!(next, '.' | '!' | '?') {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek().map_or(true, |c| c.is_whitespace()) {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_owned());
                }
                current.clear();
            }
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_owned());
    }
    sentences
}
