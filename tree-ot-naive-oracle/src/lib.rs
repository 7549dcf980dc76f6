//! A naive, simple oracle implementation for differential testing.
//!
//! Instead of transforming edits, [`merge`] decides character by character
//! what survives two concurrent edits of a flat text and where inserted text
//! goes.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEdit {
    Insert { at: usize, text: String },
    Delete { at: usize, len: usize },
}

impl TextEdit {
    /// Whether this edit deletes the gap at `gap` from the inside.
    fn buries(&self, gap: usize) -> bool {
        match self {
            TextEdit::Delete { at, len } => *at < gap && gap < at + len,
            TextEdit::Insert { .. } => false,
        }
    }

    fn deletes(&self, index: usize) -> bool {
        match self {
            TextEdit::Delete { at, len } => *at <= index && index < at + len,
            TextEdit::Insert { .. } => false,
        }
    }
}

/// Applies a single edit. Offsets count `char`s.
pub fn apply(text: &str, edit: &TextEdit) -> String {
    let chars: Vec<char> = text.chars().collect();
    match edit {
        TextEdit::Insert { at, text: inserted } => {
            let mut out: String = chars[..*at].iter().collect();
            out.push_str(inserted);
            out.extend(&chars[*at..]);
            out
        }
        TextEdit::Delete { at, len } => chars
            .iter()
            .enumerate()
            .filter(|(index, _)| !(*at <= *index && *index < at + len))
            .map(|(_, c)| *c)
            .collect(),
    }
}

/// Result of applying two concurrent edits of `base`.
///
/// Characters deleted by either edit disappear. Text inserted strictly
/// inside the other edit's deletion disappears with it; text inserted at a
/// deletion boundary survives. Texts inserted at the same gap appear in tie
/// order: `a` first when `a_wins_ties`.
pub fn merge(base: &str, a: &TextEdit, b: &TextEdit, a_wins_ties: bool) -> String {
    let chars: Vec<char> = base.chars().collect();
    let edits = if a_wins_ties { [a, b] } else { [b, a] };

    let mut out = String::new();
    for gap in 0..=chars.len() {
        for edit in edits {
            if let TextEdit::Insert { at, text } = edit
                && *at == gap
                && !edits.iter().any(|other| other.buries(gap))
            {
                out.push_str(text);
            }
        }
        if gap < chars.len() && !edits.iter().any(|edit| edit.deletes(gap)) {
            out.push(chars[gap]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(at: usize, text: &str) -> TextEdit {
        TextEdit::Insert {
            at,
            text: text.to_string(),
        }
    }

    #[test]
    fn single_edits() {
        assert_eq!(apply("abc", &insert(1, "XY")), "aXYbc");
        assert_eq!(apply("abcd", &TextEdit::Delete { at: 1, len: 2 }), "ad");
    }

    #[test]
    fn ties_follow_the_winner() {
        assert_eq!(merge("ab", &insert(1, "X"), &insert(1, "Y"), true), "aXYb");
        assert_eq!(merge("ab", &insert(1, "X"), &insert(1, "Y"), false), "aYXb");
    }

    #[test]
    fn deletion_swallows_inner_insertions_only() {
        let delete = TextEdit::Delete { at: 1, len: 2 };
        assert_eq!(merge("abcd", &insert(2, "X"), &delete, true), "ad");
        assert_eq!(merge("abcd", &insert(1, "X"), &delete, true), "aXd");
        assert_eq!(merge("abcd", &insert(3, "X"), &delete, false), "aXd");
    }

    #[test]
    fn overlapping_deletions_union() {
        let a = TextEdit::Delete { at: 0, len: 2 };
        let b = TextEdit::Delete { at: 1, len: 2 };
        assert_eq!(merge("abcd", &a, &b, true), "d");
    }
}
