use std::fmt;

/// Byte that terminates the metadata block of a decrypted credential.
pub const METADATA_TERMINATOR: u8 = 0x03;

/// Plaintext of a credential file, split into its secret and metadata.
///
/// The first line, newline included, is the secret. Everything after it up to
/// [`METADATA_TERMINATOR`] is free-form metadata; anything past the terminator
/// is ignored.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptedContent {
    pub secret: String,
    pub metadata: String,
}

impl DecryptedContent {
    pub fn parse(plaintext: &[u8]) -> Self {
        let (secret, rest) = match plaintext.iter().position(|b| *b == b'\n') {
            Some(end) => plaintext.split_at(end + 1),
            None => (plaintext, &[][..]),
        };
        let metadata = match rest.iter().position(|b| *b == METADATA_TERMINATOR) {
            Some(end) => &rest[..end],
            None => rest,
        };

        Self {
            secret: String::from_utf8_lossy(secret).into_owned(),
            metadata: String::from_utf8_lossy(metadata).into_owned(),
        }
    }
}

// Keep secrets out of logs and panic messages.
impl fmt::Debug for DecryptedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedContent")
            .field("secret", &"<redacted>")
            .field("metadata_len", &self.metadata.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_secret_and_metadata() {
        let content = DecryptedContent::parse(b"hunter2\nuser: me\nurl: example.org\n");
        assert_eq!(content.secret, "hunter2\n");
        assert_eq!(content.metadata, "user: me\nurl: example.org\n");
    }

    #[test]
    fn metadata_stops_at_terminator() {
        let content = DecryptedContent::parse(b"pw\nuser: me\n\x03trailing junk");
        assert_eq!(content.metadata, "user: me\n");
    }

    #[test]
    fn single_line_without_newline_is_all_secret() {
        let content = DecryptedContent::parse(b"only-secret");
        assert_eq!(content.secret, "only-secret");
        assert_eq!(content.metadata, "");
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let content = DecryptedContent::parse(b"hunter2\n");
        let rendered = format!("{content:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));
    }
}
