use std::borrow::Cow;

/// Document text as seen by a parser. Positions are byte offsets.
///
/// Parsers only ask for chunks, so a document stored as a rope or line list never needs to
/// be flattened.
pub trait Input {
    fn len(&self) -> u32;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text starting at `from`. May stop before the end of the document, but must not be
    /// empty unless `from` is the end.
    fn chunk(&self, from: u32) -> &[u8];

    /// True when every chunk ends at a line break, which lets tokenizers avoid
    /// looking across chunk boundaries for line-based tokens.
    fn line_chunks(&self) -> bool {
        false
    }

    fn read(&self, from: u32, to: u32) -> Cow<'_, str>;
}

impl Input for &str {
    fn len(&self) -> u32 {
        self.as_bytes().len() as u32
    }

    fn chunk(&self, from: u32) -> &[u8] {
        &self.as_bytes()[from as usize..]
    }

    fn read(&self, from: u32, to: u32) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.as_bytes()[from as usize..to as usize])
    }
}

impl Input for String {
    fn len(&self) -> u32 {
        self.as_bytes().len() as u32
    }

    fn chunk(&self, from: u32) -> &[u8] {
        &self.as_bytes()[from as usize..]
    }

    fn read(&self, from: u32, to: u32) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.as_bytes()[from as usize..to as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_input() {
        let input: &dyn Input = &"héllo";
        assert_eq!(input.len(), 6);
        assert_eq!(input.chunk(3), b"llo");
        assert_eq!(input.read(0, 3), "hé");
        assert!(matches!(input.read(1, 3), Cow::Borrowed("é")));
        assert_eq!(input.read(0, 2), "h\u{fffd}");
    }
}
