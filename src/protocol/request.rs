//! Request definitions
//!
//! Turns a command string into the argument list sent to the server.

/// A request ready to be framed
///
/// Built from free-form command text. Plain text is split on spaces, runs
/// of spaces counting as one; tabs and line breaks stay inside arguments.
/// Text ending in a double quote carries one binary-safe segment:
/// everything between the first and the last quote is sent verbatim as a
/// single argument, so values may contain spaces, newlines or arbitrary
/// bytes (`SET key "two words"`).
///
/// The trigger is purely positional. `SET "a" "b"` sends the literal bytes
/// `a" "b` as one argument; callers needing several quoted values should
/// issue separate requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Original command text, used for logging and handed to callbacks
    text: String,

    /// Arguments in wire order
    args: Vec<Vec<u8>>,

    /// Whether the quoted binary-safe segment was used
    binary: bool,
}

impl Request {
    /// Build a request from command text
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();

        let (args, binary) = match binary_segment(&text) {
            Some((prefix, segment)) => {
                let mut args = split_words(prefix);

                // A quote glued to the previous token extends that token
                let glued = prefix
                    .as_bytes()
                    .last()
                    .is_some_and(|&b| b != b' ');

                match args.last_mut() {
                    Some(last) if glued => last.extend_from_slice(segment),
                    _ => args.push(segment.to_vec()),
                }
                (args, true)
            }
            None => (split_words(&text), false),
        };

        Self { text, args, binary }
    }

    /// The original command text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Arguments in wire order
    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Whether the request carries a binary-safe segment
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// A request with no arguments cannot be sent
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl From<&str> for Request {
    fn from(text: &str) -> Self {
        Request::new(text)
    }
}

impl From<String> for Request {
    fn from(text: String) -> Self {
        Request::new(text)
    }
}

/// Space-separated words, empty ones dropped
fn split_words(text: &str) -> Vec<Vec<u8>> {
    text.split(' ')
        .filter(|word| !word.is_empty())
        .map(|word| word.as_bytes().to_vec())
        .collect()
}

/// Split off the quoted segment, if the text qualifies
///
/// Returns the text before the first quote and the bytes strictly between the
/// first and last quote.
fn binary_segment(text: &str) -> Option<(&str, &[u8])> {
    let bytes = text.as_bytes();
    if bytes.last() != Some(&b'"') {
        return None;
    }

    let last = bytes.len() - 1;
    let first = bytes.iter().position(|&b| b == b'"')?;
    if first == last {
        return None;
    }

    // '"' is ASCII, so `first` is a char boundary
    Some((&text[..first], &bytes[first + 1..last]))
}

