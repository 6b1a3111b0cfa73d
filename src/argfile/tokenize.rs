//! Shell-style tokenizing of argument-file lines
//!
//! Splitting follows POSIX shell word rules: whitespace separates words,
//! single quotes are literal, double quotes allow `\"` and `\\` escapes, and
//! outside quotes a backslash escapes any character. Quoted and unquoted
//! pieces next to each other form one word.

use crate::error::ExecError;

const NO_CLOSING_QUOTATION: &str = "No closing quotation";
const NO_ESCAPED_CHARACTER: &str = "No escaped character";

/// Marks the rest of a line as a comment when a token starts with it
pub const COMMENT_MARKER: char = '#';

/// Tokenize one line of an argument file
///
/// Tokens that are blank after trimming are skipped, and the first token
/// starting with `#` ends the line.
///
/// # Errors
/// * `ExecError::TokenizeFailure` - unclosed quote or trailing backslash
pub fn tokenize(line: &str) -> Result<Vec<String>, ExecError> {
    let words = split_words(line).map_err(|reason| ExecError::TokenizeFailure {
        line: line.to_string(),
        reason: reason.to_string(),
    })?;

    let mut tokens = Vec::with_capacity(words.len());
    for word in words {
        if word.trim().is_empty() {
            continue;
        }
        if word.starts_with(COMMENT_MARKER) {
            break;
        }
        tokens.push(word);
    }

    Ok(tokens)
}

/// Split a line into words, honouring quotes and backslash escapes
pub fn split_words(line: &str) -> Result<Vec<String>, &'static str> {
    let mut words = Vec::new();
    let mut word = String::new();
    // A quoted empty string still makes a word
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(NO_CLOSING_QUOTATION),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(NO_ESCAPED_CHARACTER),
                        },
                        Some(c) => word.push(c),
                        None => return Err(NO_CLOSING_QUOTATION),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => word.push(c),
                    None => return Err(NO_ESCAPED_CHARACTER),
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }

    if in_word {
        words.push(word);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_truncates_line() {
        let tokens = tokenize(r#"a b "c d" # e f"#).unwrap();
        assert_eq!(tokens, vec!["a", "b", "c d"]);
    }

    #[test]
    fn test_empty_and_blank_lines() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   \t  ").unwrap().is_empty());
    }

    #[test]
    fn test_comment_only_line() {
        assert!(tokenize("# just a comment").unwrap().is_empty());
        assert!(tokenize("   #indented").unwrap().is_empty());
    }

    #[test]
    fn test_hash_inside_token_is_kept() {
        assert_eq!(tokenize("a#b c").unwrap(), vec!["a#b", "c"]);
    }

    #[test]
    fn test_quoted_hash_still_starts_comment() {
        // Quotes are removed before the comment check
        assert_eq!(tokenize(r##"keep "#gone" also-gone"##).unwrap(), vec!["keep"]);
    }

    #[test]
    fn test_blank_quoted_tokens_skipped() {
        assert_eq!(tokenize(r#"'' x " " y"#).unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_flags_and_values() {
        let tokens = tokenize("--input box.txt  -t 30").unwrap();
        assert_eq!(tokens, vec!["--input", "box.txt", "-t", "30"]);
    }

    #[test]
    fn test_unbalanced_quote_fails() {
        let err = tokenize(r#"--name "unterminated"#).unwrap_err();
        match err {
            ExecError::TokenizeFailure { ref line, ref reason } => {
                assert_eq!(line, r#"--name "unterminated"#);
                assert_eq!(reason, "No closing quotation");
            }
            ref other => panic!("Expected TokenizeFailure, got {:?}", other),
        }
        assert_eq!(err.exit_code(), -1);
    }

    #[test]
    fn test_trailing_backslash_fails() {
        let err = tokenize(r"a b\").unwrap_err();
        assert!(matches!(
            err,
            ExecError::TokenizeFailure { ref reason, .. } if reason == "No escaped character"
        ));
    }

    #[test]
    fn test_split_single_quotes_are_literal() {
        assert_eq!(split_words(r"'a\b' 'it''s'").unwrap(), vec![r"a\b", "its"]);
    }

    #[test]
    fn test_split_double_quote_escapes() {
        assert_eq!(
            split_words(r#""say \"hi\"" "back\\slash" "keep\n""#).unwrap(),
            vec![r#"say "hi""#, r"back\slash", r"keep\n"]
        );
    }

    #[test]
    fn test_split_backslash_outside_quotes() {
        assert_eq!(split_words(r"a\ b c\\d").unwrap(), vec!["a b", r"c\d"]);
    }

    #[test]
    fn test_split_adjacent_pieces_join() {
        assert_eq!(split_words(r#"pre"mid"'post' x"#).unwrap(), vec!["premidpost", "x"]);
    }

    #[test]
    fn test_split_empty_quotes_make_a_word() {
        assert_eq!(split_words(r#"a "" b"#).unwrap(), vec!["a", "", "b"]);
    }

    #[test]
    fn test_split_unclosed_single_quote() {
        assert_eq!(split_words("'open"), Err("No closing quotation"));
    }
}
