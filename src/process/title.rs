use once_cell::sync::Lazy;
use regex::Regex;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").expect("digit pattern is valid"));
static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?\\-]").expect("punctuation pattern is valid"));

/// Canonicalize a free-text job title into a comparable uppercase string.
///
/// The removal sequence is fixed: the literal tokens `"!ST "`, `"1ST "`,
/// `"2ND"`, `".E."` and `" - "` go first (case-sensitive, as units), then
/// every decimal digit, then the characters `.` `!` `?` `\` `-`, then
/// uppercase. The literal tokens contain digits and punctuation themselves,
/// so they must be stripped as units before the generic passes.
///
/// An absent title normalizes to the empty string, never an error, so
/// pattern matching downstream never deals with missing values.
pub fn normalize_title(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let stripped = raw
        .replace("!ST ", "")
        .replace("1ST ", "")
        .replace("2ND", "")
        .replace(".E.", "")
        .replace(" - ", "");
    let stripped = DIGITS.replace_all(&stripped, "");
    let stripped = PUNCTUATION.replace_all(&stripped, "");
    stripped.to_uppercase()
}
