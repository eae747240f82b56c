//! Sums and products of numbers and strings, `*` binding tighter than `+`, both left
//! associative:
//!
//! ```text
//! @top Program { expression }
//! expression { Number | String | BinaryExpression }
//! BinaryExpression { expression !sum "+" expression | expression !product "*" expression }
//! @skip { space }
//! ```

use spruce_lr::table::{FILE_VERSION, state_flag};
use spruce_lr::{
    Error, LrParser, NodePropSpec, ParserSpec, PropKey, Table, TokenizerSpec, TopRule,
};

use crate::arith::{BINARY_EXPRESSION, EOF, EXPRESSION, NUMBER, PLUS, SPACE, STRING, TIMES};
use crate::encode::encode_array;
use crate::tables::{STAY, State, Tables, TokenState, reduce, shift, token_data};

const TOKENS: &[TokenState] = &[
    // start
    TokenState {
        accept: &[],
        edges: &[
            (9, 11, 1),
            (13, 14, 1),
            (32, 33, 1),
            (34, 35, 3),
            (42, 43, 5),
            (43, 44, 6),
            (48, 58, 2),
        ],
    },
    // space
    TokenState { accept: &[SPACE], edges: &[(9, 11, 1), (13, 14, 1), (32, 33, 1)] },
    // digits
    TokenState { accept: &[NUMBER], edges: &[(48, 58, 2)] },
    // inside a string
    TokenState { accept: &[], edges: &[(0, 34, 3), (34, 35, 4), (35, 0, 3)] },
    TokenState { accept: &[STRING], edges: &[] },
    TokenState { accept: &[TIMES], edges: &[] },
    TokenState { accept: &[PLUS], edges: &[] },
];

pub fn arithmetic_spec() -> ParserSpec {
    let mut tables = Tables::default();
    let none = tables.actions(&[]);
    let skip = tables.actions(&[(SPACE, STAY)]);
    let token_prec = tables.terms(&[]);
    let operand = tables.actions(&[(NUMBER, shift(1)), (STRING, shift(2))]);
    let operator = tables.actions(&[(PLUS, shift(5)), (TIMES, shift(6))]);
    let sum = reduce(BINARY_EXPRESSION, 3);
    let after_sum = tables.actions(&[(PLUS, sum), (TIMES, shift(6)), (EOF, sum)]);
    let after_product = tables.actions(&[(PLUS, sum), (TIMES, sum), (EOF, sum)]);

    let base = State { actions: none, skip, tokenizers: 1, ..State::default() };
    let operand_done = State {
        default_reduce: reduce(EXPRESSION, 1),
        forced_reduce: reduce(EXPRESSION, 1),
        ..base
    };
    let missing_operand = State {
        actions: operand,
        forced_reduce: reduce(BINARY_EXPRESSION, 2),
        ..base
    };
    let operation_done = State { forced_reduce: sum, ..base };

    // Program -> . expression
    tables.state(State { actions: operand, ..base });
    // expression -> Number .
    tables.state(operand_done);
    // expression -> String .
    tables.state(operand_done);
    // Program -> expression . | BinaryExpression -> expression . op expression
    tables.state(State { flags: state_flag::ACCEPTING, actions: operator, ..base });
    // expression -> BinaryExpression .
    tables.state(operand_done);
    // BinaryExpression -> expression "+" . expression
    tables.state(missing_operand);
    // BinaryExpression -> expression "*" . expression
    tables.state(missing_operand);
    // BinaryExpression -> expression "+" expression .
    tables.state(State { actions: after_sum, ..operation_done });
    // BinaryExpression -> expression "*" expression .
    tables.state(State { actions: after_product, ..operation_done });

    tables.goto(NUMBER, 1, &[0, 5, 6]);
    tables.goto(STRING, 2, &[0, 5, 6]);
    tables.goto(BINARY_EXPRESSION, 4, &[0, 5, 6]);
    tables.goto(EXPRESSION, 3, &[0]);
    tables.goto(EXPRESSION, 7, &[5]);
    tables.goto(EXPRESSION, 8, &[6]);
    let built = tables.build();

    ParserSpec {
        version: FILE_VERSION,
        states: Table::Encoded(encode_array(&built.states)),
        state_data: Table::Values(built.data),
        goto: Table::Encoded(encode_array(&built.goto)),
        node_names: "⚠ Program Number String BinaryExpression + *".to_owned(),
        max_term: u32::from(EXPRESSION),
        node_props: vec![NodePropSpec {
            prop: PropKey::Named("group".to_owned()),
            values: vec![(vec![NUMBER, STRING, BINARY_EXPRESSION], "Expression".to_owned())],
        }],
        token_data: Table::Values(token_data(TOKENS)),
        tokenizers: vec![TokenizerSpec::Group(0)],
        top_rules: vec![TopRule { name: "Program".to_owned(), state: 0, term: 1 }],
        token_prec,
        ..ParserSpec::default()
    }
}

pub fn arithmetic() -> Result<LrParser, Error> {
    LrParser::deserialize(arithmetic_spec())
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use spruce_lr::{ParserConfig, Recovery};
    use spruce_tree::Parser as _;

    use super::*;

    fn parse(text: &str) -> String {
        arithmetic().unwrap().parse(&text, &[], None).unwrap().to_string()
    }

    #[test]
    fn precedence() {
        expect![[r#"Program(BinaryExpression(Number,"+",BinaryExpression(Number,"*",Number)))"#]]
            .assert_eq(&parse("1+2*3"));
        expect![[r#"Program(BinaryExpression(BinaryExpression(Number,"*",Number),"+",Number))"#]]
            .assert_eq(&parse("1*2+3"));
    }

    #[test]
    fn left_associative() {
        expect![[r#"Program(BinaryExpression(BinaryExpression(Number,"+",Number),"+",Number))"#]]
            .assert_eq(&parse("1 + 2 + 3"));
    }

    #[test]
    fn strings_and_space() {
        expect![[r#"Program(BinaryExpression(String,"*",Number))"#]]
            .assert_eq(&parse("  \"a b\"\n*\t10 "));
    }

    #[test]
    fn metadata() {
        let parser = arithmetic().unwrap();
        assert_eq!(parser.top_node().name(), "Program");
        assert!(parser.node_set().get(NUMBER).unwrap().is("Expression"));
        assert!(!parser.node_set().get(PLUS).unwrap().is("Expression"));
        assert_eq!(parser.eof_term(), u32::from(EOF));
        assert_eq!(parser.get_name(TIMES), "*");
        assert_eq!(parser.get_name(EXPRESSION), "9");
    }

    #[test]
    fn version_mismatch() {
        let spec = ParserSpec { version: FILE_VERSION - 1, ..arithmetic_spec() };
        let error = LrParser::deserialize(spec).unwrap_err();
        expect!["parser version (13) doesn't match runtime version (14)"]
            .assert_eq(&error.to_string());
    }

    #[test]
    fn token_groups_must_fit_the_mask() {
        let spec = ParserSpec { tokenizers: vec![TokenizerSpec::Group(16)], ..arithmetic_spec() };
        assert_eq!(LrParser::deserialize(spec).unwrap_err(), Error::TokenGroup(16));
    }

    #[test]
    fn buffer_length_must_fit_offsets() {
        let parser = arithmetic().unwrap();
        let config =
            |length| ParserConfig { buffer_length: Some(length), ..ParserConfig::default() };
        expect!["buffer length 70000 is larger than 65535"]
            .assert_eq(&parser.configure(config(70_000)).unwrap_err().to_string());
        assert!(parser.configure(config(u32::from(u16::MAX))).is_ok());
    }

    #[test]
    fn configure_returns_a_copy() {
        let parser = arithmetic().unwrap();
        let recovery = Recovery { max_stack_count: 4, ..Recovery::default() };
        let strict = parser
            .configure(ParserConfig {
                strict: Some(true),
                recovery: Some(recovery),
                ..ParserConfig::default()
            })
            .unwrap();
        assert!(strict.is_strict());
        assert!(!parser.is_strict());
        assert!(parser.configure(ParserConfig {
            top: Some("Nope".to_owned()),
            ..ParserConfig::default()
        })
        .is_err());
    }
}
