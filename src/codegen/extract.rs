//! Best-effort isolation of source code from a generation response.
//!
//! Generation services wrap code in Markdown fences inconsistently, so
//! extraction tries fences first, then falls back to scanning for the first
//! plausible Python statement, and finally returns the whole input. It never
//! fails and never returns an empty string for non-empty input.

use once_cell::sync::Lazy;
use regex::Regex;

/// First fenced code block, with optional `python` language tag.
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:python)?\s*([\s\S]+?)```").expect("valid fence regex"));

/// A line that plausibly starts a Python program.
static STATEMENT_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(import |from |def |class |#|@|with |if |print\(|open\()")
        .expect("valid statement regex")
});

/// Extract a best-effort source-code string from raw response text.
///
/// 1. The inner content of the first fenced code block, if any.
/// 2. Otherwise, everything from the first statement-looking line onward.
/// 3. Otherwise, the whole input.
///
/// The result is always trimmed of surrounding whitespace.
pub fn extract_code(text: &str) -> String {
    if let Some(captures) = CODE_FENCE.captures(text) {
        if let Some(inner) = captures.get(1) {
            return inner.as_str().trim().to_string();
        }
    }

    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if STATEMENT_START.is_match(line) {
            return lines[i..].join("\n").trim().to_string();
        }
    }

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fenced_block_with_tag() {
        let text = "Here is the script:\n```python\nimport pandas as pd\nprint('ok')\n```\nDone.";
        assert_eq!(extract_code(text), "import pandas as pd\nprint('ok')");
    }

    #[test]
    fn test_fenced_block_without_tag() {
        let text = "```\nx = 1\n```";
        assert_eq!(extract_code(text), "x = 1");
    }

    #[test]
    fn test_first_fence_wins() {
        let text = "```python\nfirst = 1\n```\nand also\n```python\nsecond = 2\n```";
        assert_eq!(extract_code(text), "first = 1");
    }

    #[test]
    fn test_statement_fallback() {
        let text = "Sure! The cleaning script follows.\nimport pandas as pd\ndf = pd.read_csv('x.csv')";
        assert_eq!(
            extract_code(text),
            "import pandas as pd\ndf = pd.read_csv('x.csv')"
        );
    }

    #[test]
    fn test_decorator_and_comment_starts() {
        assert!(extract_code("note\n# cleaning script\nx = 1").starts_with("# cleaning script"));
        assert!(extract_code("note\n@wraps(f)\ndef g(): pass").starts_with("@wraps"));
    }

    #[test]
    fn test_whole_input_fallback() {
        let text = "  x = y + 1  ";
        assert_eq!(extract_code(text), "x = y + 1");
    }

    #[test]
    fn test_idempotent_on_plain_code() {
        let code = "import os\n\ndef main():\n    print(os.getcwd())";
        let wrapped = format!("```python\n{code}\n```");
        let once = extract_code(&wrapped);
        assert_eq!(once, code);
        assert_eq!(extract_code(&once), code);
    }

    #[test]
    fn test_never_empty_for_nonempty_input() {
        for text in ["hello", "```python\nx\n```", "no code here at all", "."] {
            assert!(!extract_code(text).is_empty(), "empty result for {text:?}");
        }
    }
}
