use std::sync::Arc;

use text_size::{TextRange, TextSize};

use crate::Error;
use crate::fragment::TreeFragment;
use crate::input::Input;
use crate::tree::Tree;

/// A parse in progress, driven by repeated calls to [`PartialParse::advance`].
pub trait PartialParse {
    /// Does a chunk of work. Returns the finished tree once parsing is done.
    fn advance(&mut self) -> Result<Option<Tree>, Error>;

    /// Position up to which the document has been consumed.
    fn parsed_pos(&self) -> u32;

    /// Makes the parse finish at `pos`, producing a partial tree. The position can move
    /// backwards but never forwards.
    fn stop_at(&mut self, pos: u32) -> Result<(), Error>;

    fn stopped_at(&self) -> Option<u32>;
}

/// Something that can parse documents into trees.
pub trait Parser: Send + Sync {
    /// Starts a parse over `ranges`, which are sorted, non-overlapping and non-empty
    /// unless the document itself is empty.
    fn create_parse<'a>(
        &self,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Box<dyn PartialParse + 'a>;

    /// Starts a parse, defaulting `ranges` to the whole document.
    fn start_parse<'a>(
        &self,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: Option<&[TextRange]>,
    ) -> Box<dyn PartialParse + 'a> {
        let whole;
        let ranges = match ranges {
            Some(ranges) if !ranges.is_empty() => ranges,
            Some(_) => {
                whole = [TextRange::empty(TextSize::new(0))];
                &whole[..]
            }
            None => {
                whole = [TextRange::up_to(TextSize::new(input.len()))];
                &whole[..]
            }
        };
        self.create_parse(input, fragments, ranges)
    }

    /// Runs a parse to completion.
    fn parse(
        &self,
        input: &dyn Input,
        fragments: &[TreeFragment],
        ranges: Option<&[TextRange]>,
    ) -> Result<Tree, Error> {
        let mut parse = self.start_parse(input, fragments, ranges);
        loop {
            if let Some(tree) = parse.advance()? {
                return Ok(tree);
            }
        }
    }
}

/// Wraps the partial parses of a parser, see [`parse_mixed`](crate::parse_mixed).
pub trait WrapParse: Send + Sync {
    fn wrap<'a>(
        &self,
        inner: Box<dyn PartialParse + 'a>,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Box<dyn PartialParse + 'a>;
}

pub type ParseWrapper = Arc<dyn WrapParse>;
