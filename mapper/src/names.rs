/// Splits a full name into its first and last whitespace-separated tokens.
///
/// A single-token name is both the first and the last name. Blank input
/// yields `None`.
pub fn split_full_name(name: &str) -> Option<(&str, &str)> {
    let mut tokens = name.split_whitespace();
    let first = tokens.next()?;
    let last = tokens.last().unwrap_or(first);
    Some((first, last))
}
