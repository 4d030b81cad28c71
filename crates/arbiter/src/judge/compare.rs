//! Output comparison

/// Normalize program output for comparison
///
/// Converts CRLF line endings to LF and trims leading and trailing whitespace.
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_owned()
}

/// Check whether actual output matches the expected output after normalization
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}
