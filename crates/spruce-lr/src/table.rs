//! Layout of the compiled parse tables.

use crate::Error;

/// Bits of an action word.
pub mod action {
    pub const REDUCE_FLAG: u32 = 1 << 16;
    pub const VALUE_MASK: u32 = 0xffff;
    pub const REDUCE_DEPTH_SHIFT: u32 = 19;
    /// On reductions, marks a `R -> R R` repeat reduction.
    pub const REPEAT_FLAG: u32 = 1 << 17;
    /// On shifts, marks a goto to the state in the value.
    pub const GOTO_FLAG: u32 = 1 << 17;
    /// Shift without pushing a state (skipped tokens), or reduce back into the current state.
    pub const STAY_FLAG: u32 = 1 << 18;
}

pub mod state_flag {
    pub const SKIPPED: u32 = 1;
    pub const ACCEPTING: u32 = 2;
}

/// Slots of a state record.
pub mod parse_state {
    pub const FLAGS: u32 = 0;
    pub const ACTIONS: u32 = 1;
    pub const SKIP: u32 = 2;
    pub const TOKENIZER_MASK: u32 = 3;
    pub const DEFAULT_REDUCE: u32 = 4;
    pub const FORCED_REDUCE: u32 = 5;
    pub const SIZE: u32 = 6;
}

/// Sequence markers in the state data.
pub mod seq {
    pub const END: u16 = 0xffff;
    pub const DONE: u16 = 0;
    /// The sequence continues at the offset in the next two words.
    pub const NEXT: u16 = 1;
    /// The next two words are an action taken for any token.
    pub const OTHER: u16 = 2;
}

pub mod term {
    /// The error term, also the id of the error node type.
    pub const ERR: u16 = 0;
}

pub const FILE_VERSION: u32 = 14;

/// Digits of the compact string form of a table.
pub mod encode {
    pub const BIG_VAL_CODE: u32 = 126;
    pub const BIG_VAL: u32 = 0xffff;
    pub const START: u32 = 32;
    pub const GAP1: u32 = 34;
    pub const GAP2: u32 = 92;
    pub const BASE: u32 = 46;
}

/// Reads a 32-bit value stored as two consecutive words, low word first.
#[inline]
pub(crate) fn pair(data: &[u16], offset: usize) -> u32 {
    u32::from(data[offset]) | (u32::from(data[offset + 1]) << 16)
}

/// Decodes a table from its compact string form. The first value is the number of values
/// that follow.
pub fn decode_array(input: &str) -> Result<Vec<u32>, Error> {
    let mut chars = input.chars();
    let mut values = Vec::new();
    let mut expected = None;
    loop {
        let Some(first) = chars.next() else { break };
        let mut next = Some(first);
        let mut value = 0u32;
        loop {
            let Some(ch) = next else { return Err(Error::Table("value cut off")) };
            let mut code = u32::from(ch);
            if code == encode::BIG_VAL_CODE {
                value = encode::BIG_VAL;
                break;
            }
            if code >= encode::GAP2 {
                code -= 1;
            }
            if code >= encode::GAP1 {
                code -= 1;
            }
            let Some(mut digit) = code.checked_sub(encode::START) else {
                return Err(Error::Table("invalid digit"));
            };
            let stop = digit >= encode::BASE;
            if stop {
                digit -= encode::BASE;
            }
            value = value.checked_add(digit).ok_or(Error::Table("value overflow"))?;
            if stop {
                break;
            }
            value = value.checked_mul(encode::BASE).ok_or(Error::Table("value overflow"))?;
            next = chars.next();
        }
        match expected {
            None => expected = Some(value as usize),
            Some(_) => values.push(value),
        }
    }
    match expected {
        Some(count) if count == values.len() => Ok(values),
        _ => Err(Error::Table("length doesn't match its header")),
    }
}

/// Narrows decoded values to 16 bits.
pub(crate) fn narrow(values: Vec<u32>) -> Result<Box<[u16]>, Error> {
    values
        .into_iter()
        .map(|value| u16::try_from(value).ok().ok_or(Error::Table("value doesn't fit 16 bits")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_values() {
        // Header 3, then 0, 45 and 46, which takes two digits.
        assert_eq!(decode_array("RO}!O").unwrap(), vec![0, 45, 46]);
        assert_eq!(decode_array("P~").unwrap(), vec![0xffff]);
        assert_eq!(decode_array("O").unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(decode_array("R").is_err());
        assert!(decode_array("S!").is_err());
        assert!(decode_array("\u{1}").is_err());
    }
}
