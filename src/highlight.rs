use regex::{Regex, RegexBuilder};

/// Case-insensitive matcher for the active search term, `None` when the
/// term is empty. The term is used as typed, like the list filter.
pub fn build_highlight_regex(term: &str) -> Option<Regex> {
    if term.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Splits `text` into `(segment, matched)` pieces in order.
pub fn split_matches<'a>(text: &'a str, regex: Option<&Regex>) -> Vec<(&'a str, bool)> {
    let Some(regex) = regex else {
        return vec![(text, false)];
    };
    let mut segments = Vec::new();
    let mut last = 0;
    for found in regex.find_iter(text) {
        if found.start() > last {
            segments.push((&text[last..found.start()], false));
        }
        segments.push((found.as_str(), true));
        last = found.end();
    }
    if last < text.len() || segments.is_empty() {
        segments.push((&text[last..], false));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_every_case_insensitive_hit() {
        let regex = build_highlight_regex("pie").expect("regex");
        let segments = split_matches("One Piece: PIEces", Some(&regex));
        assert_eq!(
            segments,
            vec![
                ("One ", false),
                ("Pie", true),
                ("ce: ", false),
                ("PIE", true),
                ("ces", false)
            ]
        );
    }

    #[test]
    fn metacharacters_in_term_are_literal() {
        let regex = build_highlight_regex("No. 8").expect("regex");
        assert!(regex.is_match("Kaiju No. 8"));
        assert!(!regex.is_match("Kaiju No 18"));
        assert!(build_highlight_regex("").is_none());
    }

    #[test]
    fn surrounding_spaces_are_part_of_the_term() {
        let regex = build_highlight_regex(" pie").expect("regex");
        let segments = split_matches("One Piece: PIEces", Some(&regex));
        assert_eq!(
            segments,
            vec![
                ("One", false),
                (" Pie", true),
                ("ce:", false),
                (" PIE", true),
                ("ces", false)
            ]
        );
        assert!(crate::view::title_matches("One Piece", " pie"));
        assert!(!crate::view::title_matches("Piece of Cake", " pie"));
    }
}
