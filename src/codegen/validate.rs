//! Surface-syntax validation of generated Python.
//!
//! A syntax check only, never a semantic or security check. The checker is
//! deliberately conservative: it reports only definite errors (unbalanced or
//! mismatched brackets, unterminated string literals, block statements with
//! no colon), so well-formed programs always pass. It never panics and never
//! returns an error value; invalidity is reported in the result.

use std::fmt;

/// Outcome of validating a code string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    pub valid: bool,
    pub diagnostic: String,
}

impl Validity {
    fn ok() -> Self {
        Self {
            valid: true,
            diagnostic: String::new(),
        }
    }

    fn err(diagnostic: impl Into<String>) -> Self {
        Self {
            valid: false,
            diagnostic: diagnostic.into(),
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "valid")
        } else {
            write!(f, "invalid: {}", self.diagnostic)
        }
    }
}

/// Keywords that introduce an indented block and therefore need a colon
/// somewhere on their logical line.
const BLOCK_KEYWORDS: [&str; 11] = [
    "if", "elif", "else", "for", "while", "def", "class", "with", "try", "except", "finally",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringState {
    None,
    Single(char),
    Triple(char),
}

/// Validate a Python source string.
///
/// Returns `Validity { valid: true, diagnostic: "" }` for well-formed input,
/// or a non-empty diagnostic naming the first problem found.
pub fn validate_python(code: &str) -> Validity {
    let chars: Vec<char> = code.chars().collect();
    let mut i = 0usize;
    let mut line = 1usize;
    let mut col = 1usize;

    let mut string_state = StringState::None;
    let mut in_comment = false;
    // (opener, line, col)
    let mut bracket_stack: Vec<(char, usize, usize)> = Vec::new();

    // Logical-line tracking for the block-colon check.
    let mut first_word: Option<String> = None;
    let mut word_done = false;
    let mut saw_code = false;
    let mut has_depth0_colon = false;
    let mut logical_line_start = 1usize;
    let mut trailing_backslash = false;

    macro_rules! finalize_logical_line {
        () => {
            if let Some(ref word) = first_word {
                if BLOCK_KEYWORDS.contains(&word.as_str()) && !has_depth0_colon {
                    return Validity::err(format!(
                        "expected ':' on '{}' statement (line {})",
                        word, logical_line_start
                    ));
                }
            }
            first_word = None;
            word_done = false;
            saw_code = false;
            has_depth0_colon = false;
        };
    }

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            match string_state {
                StringState::Single(_) => {
                    return Validity::err(format!(
                        "unterminated string literal (line {line})"
                    ));
                }
                StringState::Triple(_) => {
                    // Triple-quoted strings span lines; the logical line continues.
                }
                StringState::None => {
                    in_comment = false;
                    if bracket_stack.is_empty() && !trailing_backslash {
                        finalize_logical_line!();
                        logical_line_start = line + 1;
                    }
                }
            }
            trailing_backslash = false;
            line += 1;
            col = 1;
            i += 1;
            continue;
        }

        if in_comment {
            i += 1;
            col += 1;
            continue;
        }

        match string_state {
            StringState::Single(q) | StringState::Triple(q) => {
                if c == '\\' {
                    // Escape: skip the next character.
                    i += 2;
                    col += 2;
                    continue;
                }
                if c == q {
                    match string_state {
                        StringState::Single(_) => string_state = StringState::None,
                        StringState::Triple(_) => {
                            if chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                                string_state = StringState::None;
                                i += 3;
                                col += 3;
                                continue;
                            }
                        }
                        StringState::None => unreachable!(),
                    }
                }
                i += 1;
                col += 1;
                continue;
            }
            StringState::None => {}
        }

        trailing_backslash = false;
        match c {
            '#' => {
                in_comment = true;
            }
            '\'' | '"' => {
                saw_code = true;
                word_done = true;
                if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                    string_state = StringState::Triple(c);
                    i += 3;
                    col += 3;
                    continue;
                }
                string_state = StringState::Single(c);
            }
            '(' | '[' | '{' => {
                saw_code = true;
                word_done = true;
                bracket_stack.push((c, line, col));
            }
            ')' | ']' | '}' => {
                saw_code = true;
                word_done = true;
                let expected_opener = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match bracket_stack.pop() {
                    Some((opener, _, _)) if opener == expected_opener => {}
                    Some((opener, open_line, open_col)) => {
                        return Validity::err(format!(
                            "closing '{c}' (line {line}, col {col}) does not match \
                             opening '{opener}' (line {open_line}, col {open_col})"
                        ));
                    }
                    None => {
                        return Validity::err(format!(
                            "unmatched closing '{c}' (line {line}, col {col})"
                        ));
                    }
                }
            }
            ':' => {
                saw_code = true;
                word_done = true;
                if bracket_stack.is_empty() {
                    has_depth0_colon = true;
                }
            }
            '\\' => {
                saw_code = true;
                word_done = true;
                trailing_backslash = true;
            }
            c if c.is_whitespace() => {
                if saw_code {
                    word_done = true;
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                saw_code = true;
                if !word_done {
                    first_word.get_or_insert_with(String::new).push(c);
                }
            }
            _ => {
                saw_code = true;
                word_done = true;
            }
        }

        i += 1;
        col += 1;
    }

    // End of input.
    match string_state {
        StringState::Single(_) => {
            return Validity::err(format!("unterminated string literal (line {line})"));
        }
        StringState::Triple(_) => {
            return Validity::err(format!(
                "unterminated triple-quoted string literal (at end of input, line {line})"
            ));
        }
        StringState::None => {}
    }

    if let Some((opener, open_line, open_col)) = bracket_stack.first() {
        return Validity::err(format!(
            "'{opener}' (line {open_line}, col {open_col}) was never closed"
        ));
    }

    finalize_logical_line!();

    Validity::ok()
}
