//! CJK / half-width spacing ("pangu" spacing).
//!
//! Inserts a single space wherever CJK characters touch Latin letters, digits,
//! common symbols or brackets, e.g. `用Rust写` becomes `用 Rust 写`.

use std::sync::LazyLock;

use regex::Regex;

const CJK: &str = r"\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}\u{3100}-\u{312f}";
const ANS: &str = r"A-Za-z0-9@#$%^&*\-+=|/\\\u{00a1}-\u{00ff}\u{2150}-\u{218f}\u{2700}-\u{27bf}";
const ANS_BEFORE: &str = r"A-Za-z0-9~!$%^&*\-+=|/\\;:,.?\u{00a1}-\u{00ff}\u{2150}-\u{218f}\u{2700}-\u{27bf}";

fn rule(pattern: String) -> Regex {
    Regex::new(&pattern).expect("spacing regex")
}

static CJK_THEN_ANS: LazyLock<Regex> = LazyLock::new(|| rule(format!("([{CJK}])([{ANS}])")));
static ANS_THEN_CJK: LazyLock<Regex> =
    LazyLock::new(|| rule(format!("([{ANS_BEFORE}])([{CJK}])")));
static CJK_THEN_OPEN: LazyLock<Regex> = LazyLock::new(|| rule(format!(r"([{CJK}])([(\[{{<])")));
static CLOSE_THEN_CJK: LazyLock<Regex> = LazyLock::new(|| rule(format!(r"([)\]}}>])([{CJK}])")));

/// Apply CJK spacing to `text`.
pub fn spacing(text: &str) -> String {
    let text = CJK_THEN_ANS.replace_all(text, "$1 $2");
    let text = ANS_THEN_CJK.replace_all(&text, "$1 $2");
    let text = CJK_THEN_OPEN.replace_all(&text, "$1 $2");
    CLOSE_THEN_CJK.replace_all(&text, "$1 $2").into_owned()
}
