//! Units tokenizer
//!
//! Splits harvested text into numbers, unit tokens, words and single
//! punctuation marks, so that `0.1C`, `120mAhg-1` and `C/10` each come
//! apart into value and unit.

/// Units that are always emitted whole
const UNITS: [&str; 4] = ["mAhg-1", "mAg-1", "Ag-1", "°C"];

/// Characters emitted as tokens of their own
const PUNCTUATION: &str = ",;:()[]{}/~=<>%≈±.-–";

fn is_break(c: char) -> bool {
    c.is_ascii_digit() || PUNCTUATION.contains(c)
}

fn token_len(rest: &str) -> usize {
    if let Some(unit) = UNITS.iter().find(|unit| rest.starts_with(*unit)) {
        return unit.len();
    }
    let Some(first) = rest.chars().next() else {
        return 0;
    };

    if first.is_ascii_digit() {
        let bytes = rest.as_bytes();
        let mut end = 0;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        // a decimal point only joins when digits follow it
        while end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        return end;
    }

    if PUNCTUATION.contains(first) {
        return first.len_utf8();
    }

    let mut end = 0;
    for (i, c) in rest.char_indices() {
        if i > 0 && (is_break(c) || UNITS.iter().any(|unit| rest[i..].starts_with(unit))) {
            break;
        }
        end = i + c.len_utf8();
    }
    end
}

/// Tokenize `text` for property harvesting
pub fn units_tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for chunk in text.split_whitespace() {
        let mut rest = chunk;
        while !rest.is_empty() {
            let len = token_len(rest).max(1).min(rest.len());
            let len = (len..=rest.len())
                .find(|&i| rest.is_char_boundary(i))
                .unwrap_or(rest.len());
            tokens.push(&rest[..len]);
            rest = &rest[len..];
        }
    }
    tokens
}

/// True when every dot-separated part of `token` is a non-empty digit run
pub fn is_number(token: &str) -> bool {
    !token.is_empty()
        && token
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse a token accepted by [`is_number`]
pub fn number(token: &str) -> Option<f64> {
    if is_number(token) {
        token.parse().ok()
    } else {
        None
    }
}
