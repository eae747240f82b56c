//! Small grammars with hand-built parse tables.
//!
//! The tables are laid out the way a grammar compiler would emit them, so the runtime
//! can be exercised end to end without one.

mod arithmetic;
mod encode;
mod tables;
mod template;

pub use arithmetic::{arithmetic, arithmetic_spec};
pub use encode::encode_array;
pub use template::{template, template_with_expressions};

/// Term ids of the arithmetic grammar.
pub mod arith {
    pub const ERROR: u16 = 0;
    pub const PROGRAM: u16 = 1;
    pub const NUMBER: u16 = 2;
    pub const STRING: u16 = 3;
    pub const BINARY_EXPRESSION: u16 = 4;
    pub const PLUS: u16 = 5;
    pub const TIMES: u16 = 6;
    pub const EOF: u16 = 7;
    pub const SPACE: u16 = 8;
    pub const EXPRESSION: u16 = 9;
}

/// Term ids of the template grammar.
pub mod tmpl {
    pub const ERROR: u16 = 0;
    pub const TEMPLATE: u16 = 1;
    pub const TEXT: u16 = 2;
    pub const INTERPOLATION: u16 = 3;
    pub const OPEN: u16 = 4;
    pub const EXPRESSION: u16 = 5;
    pub const CLOSE: u16 = 6;
    pub const EOF: u16 = 7;
    pub const PARTS: u16 = 8;
}
