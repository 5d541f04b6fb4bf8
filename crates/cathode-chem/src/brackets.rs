//! Bracket scanning helpers shared by the parser, normalizer and linker.

use crate::elements::is_polyatomic_ion;

/// Shortest prefix a formula needs before a balanced trailing bracket counts
/// as supplementary information rather than part of the formula.
const MIN_FORMULA_LENGTH: usize = 11;

fn is_open(c: char) -> bool {
    matches!(c, '(' | '[' | '{')
}

fn is_close(c: char) -> bool {
    matches!(c, ')' | ']' | '}')
}

fn closing_for(open: char) -> char {
    match open {
        '[' => ']',
        '{' => '}',
        _ => ')',
    }
}

/// Rewrite square and curly brackets as round ones
pub fn unify_brackets(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '[' | '{' => '(',
            ']' | '}' => ')',
            other => other,
        })
        .collect()
}

/// Locate the supplementary-information bracket closest to the end of a
/// formula string.
///
/// Returns the byte offset where the bracket starts and the bracketed tail.
/// An unbalanced opening bracket is returned directly; a balanced group only
/// counts when it starts past the first eleven characters. Strings whose
/// last bracket is followed by `O2` or digits, or whose innermost trailing
/// group is a polyatomic ion such as `(PO4)`, have no supplementary bracket.
pub fn end_parentheses(text: &str) -> Option<(usize, &str)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map(|(b, _)| *b).unwrap_or(text.len());
    let slice = |from: usize, to: usize| &text[byte_at(from)..byte_at(to)];

    let mut stack: Vec<usize> = Vec::new();
    let mut bracket_index: Option<usize> = None;
    let mut first_close = true;

    for i in (0..chars.len()).rev() {
        let c = chars[i].1;
        if is_close(c) {
            if first_close {
                first_close = false;
                let rest = slice(i + 1, chars.len());
                if rest.ends_with("O2")
                    || (!rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
                {
                    return None;
                }
            }
            stack.push(i);
        } else if is_open(c) {
            match stack.pop() {
                Some(close) => {
                    if chars[close].1 != closing_for(c) {
                        return Some((byte_at(i), slice(i, chars.len())));
                    }
                    if bracket_index.is_none() && is_polyatomic_ion(slice(i + 1, close)) {
                        return None;
                    }
                    if stack.is_empty() {
                        bracket_index = Some(bracket_index.map_or(i, |b| b.max(i)));
                    }
                }
                None => {
                    if is_polyatomic_ion(slice(i + 1, chars.len())) {
                        return None;
                    }
                    return Some((byte_at(i), slice(i, chars.len())));
                }
            }
        }
    }

    match bracket_index {
        Some(i) if i > MIN_FORMULA_LENGTH => Some((byte_at(i), slice(i, chars.len()))),
        _ => None,
    }
}

/// Net nesting depth; zero for balanced text or text without brackets.
pub fn bracket_level(text: &str) -> i32 {
    text.chars().fold(0, |level, c| {
        if is_open(c) {
            level + 1
        } else if is_close(c) {
            level - 1
        } else {
            level
        }
    })
}

/// A parenthesized group found in running text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMatch<'a> {
    /// Byte offset of the match, including one optional leading whitespace
    pub start: usize,
    pub end: usize,
    /// Full matched text
    pub text: &'a str,
    /// Content between the outer parentheses
    pub inner: &'a str,
}

/// Match a balanced `( ... )` group at the start of `text`, optionally
/// preceded by one whitespace character and not followed by a word character.
/// Nested groups obey the same rules.
pub fn match_group(text: &str) -> Option<GroupMatch<'_>> {
    group_at(text, 0)
}

/// Leftmost balanced group anywhere in `text`; see [`match_group`].
pub fn search_group(text: &str) -> Option<GroupMatch<'_>> {
    text.char_indices().find_map(|(i, _)| group_at(text, i))
}

fn group_at(text: &str, start: usize) -> Option<GroupMatch<'_>> {
    let (open, end) = group_end(text, start)?;
    let close = end - 1;
    Some(GroupMatch {
        start,
        end,
        text: &text[start..end],
        inner: &text[open + 1..close],
    })
}

/// Returns the byte offset of the opening parenthesis and the end of the match.
fn group_end(text: &str, start: usize) -> Option<(usize, usize)> {
    let mut chars = text[start..].char_indices().map(|(i, c)| (start + i, c));

    let (mut pos, mut c) = chars.next()?;
    if c.is_whitespace() {
        (pos, c) = chars.next()?;
    }
    if c != '(' {
        return None;
    }
    let open = pos;
    let mut cursor = pos + 1;
    loop {
        let c = text[cursor..].chars().next()?;
        match c {
            ')' => {
                cursor += 1;
                break;
            }
            '(' => {
                let (_, nested_end) = group_end(text, cursor)?;
                cursor = nested_end;
            }
            _ => cursor += c.len_utf8(),
        }
    }
    match text[cursor..].chars().next() {
        Some(next) if next.is_alphanumeric() || next == '_' => None,
        _ => Some((open, cursor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_parentheses_balanced_tail() {
        let text = "Na3Mn1-xCrxTi(PO4)3 (x=0.01, 0.03, 0.05, 0.07, 0.10, 0.12, 0.15)";
        assert_eq!(
            end_parentheses(text),
            Some((20, "(x=0.01, 0.03, 0.05, 0.07, 0.10, 0.12, 0.15)"))
        );
    }

    #[test]
    fn test_end_parentheses_rejections() {
        assert_eq!(end_parentheses("Nax(Cu-Fe-Mn)O2"), None);
        assert_eq!(end_parentheses("NaFexCr1-x(SO4)2"), None);
        assert_eq!(end_parentheses("Na3V2(PO4)3"), None);
        // balanced but too close to the start
        assert_eq!(end_parentheses("NaMnO2 (NM)"), None);
    }

    #[test]
    fn test_end_parentheses_unbalanced() {
        assert_eq!(
            end_parentheses("Na0.67Ni0.28Mn0.67Y0.05O2 (NMY-5"),
            Some((26, "(NMY-5"))
        );
        assert_eq!(end_parentheses("Na2Fe(PO4"), None);
    }

    #[test]
    fn test_bracket_level() {
        assert_eq!(bracket_level("Na(Mn(Ni)"), 1);
        assert_eq!(bracket_level("NaMnO2"), 0);
        assert_eq!(bracket_level("(x=0))"), -1);
    }

    #[test]
    fn test_match_group() {
        let m = match_group(" (x = 0, 0.1) and").unwrap();
        assert_eq!(m.inner, "x = 0, 0.1");
        assert_eq!(m.start, 0);
        assert_eq!(m.text, " (x = 0, 0.1)");

        assert!(match_group("(NM)O2").is_none());
        assert_eq!(match_group("(a (b) c).").unwrap().inner, "a (b) c");
        assert!(match_group("(a (b)c)").is_none());
    }

    #[test]
    fn test_search_group() {
        let m = search_group("NaMnO2 was denoted (NM) here").unwrap();
        assert_eq!(m.inner, "NM");
        assert_eq!(m.start, 18);
        assert!(search_group("no brackets").is_none());
    }
}
