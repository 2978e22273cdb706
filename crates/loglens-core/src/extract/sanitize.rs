/// Make a field value safe to display: drop control characters (newlines
/// survive, tabs become spaces), zero-width characters, byte order marks and
/// backticks, then trim.
pub fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter_map(|c| match c {
            '\n' => Some('\n'),
            '\t' => Some(' '),
            '`' => None,
            '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}' | '\u{feff}' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_markup_and_controls() {
        assert_eq!(sanitize("\u{feff}`GeForce`\tGTX\u{200b} 1070\r\n"), "GeForce GTX 1070");
        assert_eq!(sanitize("line one\nline\u{7} two"), "line one\nline two");
    }

    #[test]
    fn test_idempotent() {
        let once = sanitize(" \u{1b}[0m mixed\t`value`\n ");
        assert_eq!(sanitize(&once), once);
    }
}
