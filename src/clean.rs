/// Normalize a description before embedding.
///
/// Every character outside `[A-Za-z0-9]` becomes a space, runs of spaces
/// collapse to one, the ends are trimmed and ASCII letters are lowercased.
/// The result only contains `[a-z0-9 ]` and cleaning it again is a no-op.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().map(|c| c.to_ascii_lowercase()));
    }
    out
}
