/// Split `text` into pieces of at most `max_chars` characters
///
/// Each piece is returned with the character offset at which it starts.
/// Boundaries always fall between `char`s, never inside a code point.
pub(crate) fn split_by_chars(text: &str, max_chars: usize) -> Vec<(usize, &str)> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let mut boundaries: Vec<usize> = text
        .char_indices()
        .map(|(byte, _)| byte)
        .step_by(max_chars)
        .collect();
    boundaries.push(text.len());

    boundaries
        .windows(2)
        .enumerate()
        .filter_map(|(n, pair)| match pair {
            [start, end] => text.get(*start..*end).map(|piece| (n * max_chars, piece)),
            _ => None,
        })
        .collect()
}
