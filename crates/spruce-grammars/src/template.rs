//! Text with `{...}` interpolations. The interpolated source is a single `Expression`
//! token, which [`template_with_expressions`] hands to the arithmetic parser.
//!
//! ```text
//! @top Template { (Text | Interpolation)* }
//! Interpolation { "{" Expression "}" }
//! ```

use std::sync::Arc;

use spruce_lr::table::{FILE_VERSION, state_flag};
use spruce_lr::{
    Error, ExternalTokenizer, InputStream, LrParser, ParserConfig, ParserSpec, StackRef, Table,
    TokenizerFlags, TokenizerSpec, TopRule,
};
use spruce_tree::{Input, NestedParse, Parser, SyntaxNodeRef, parse_mixed};

use crate::arithmetic::arithmetic;
use crate::encode::encode_array;
use crate::tables::{State, Tables, reduce, shift};
use crate::tmpl::{CLOSE, EXPRESSION, INTERPOLATION, OPEN, PARTS, TEXT};

const OPEN_BRACE: i32 = '{' as i32;
const CLOSE_BRACE: i32 = '}' as i32;

fn template_token(input: &mut InputStream<'_>, stack: StackRef<'_>) {
    let next = input.next();
    if next < 0 {
        return;
    }
    if stack.can_shift(EXPRESSION) {
        let start = input.pos();
        while input.next() >= 0 && input.next() != CLOSE_BRACE {
            input.advance();
        }
        if input.pos() > start {
            input.accept_token(EXPRESSION, 0);
        }
    } else if stack.can_shift(CLOSE) {
        if next == CLOSE_BRACE {
            input.advance();
            input.accept_token(CLOSE, 0);
        }
    } else if next == OPEN_BRACE {
        input.advance();
        input.accept_token(OPEN, 0);
    } else {
        while input.next() >= 0 && input.next() != OPEN_BRACE {
            input.advance();
        }
        input.accept_token(TEXT, 0);
    }
}

fn template_spec() -> ParserSpec {
    let mut tables = Tables::default();
    let none = tables.actions(&[]);
    let token_prec = tables.terms(&[]);
    let part = tables.actions(&[(TEXT, shift(2)), (OPEN, shift(3))]);
    let expression = tables.actions(&[(EXPRESSION, shift(4))]);
    let close = tables.actions(&[(CLOSE, shift(5))]);

    let base = State { actions: none, skip: none, tokenizers: 1, ..State::default() };
    let add_part = State {
        default_reduce: reduce(PARTS, 2),
        forced_reduce: reduce(PARTS, 2),
        ..base
    };
    let interpolation = reduce(INTERPOLATION, 3);

    // Template -> . parts
    tables.state(State { default_reduce: reduce(PARTS, 0), ..base });
    // Template -> parts . | parts -> parts . part
    tables.state(State { flags: state_flag::ACCEPTING, actions: part, ..base });
    // parts -> parts Text .
    tables.state(add_part);
    // Interpolation -> "{" . Expression "}"
    tables.state(State {
        actions: expression,
        forced_reduce: reduce(INTERPOLATION, 1),
        ..base
    });
    // Interpolation -> "{" Expression . "}"
    tables.state(State { actions: close, forced_reduce: reduce(INTERPOLATION, 2), ..base });
    // Interpolation -> "{" Expression "}" .
    tables.state(State { default_reduce: interpolation, forced_reduce: interpolation, ..base });
    // parts -> parts Interpolation .
    tables.state(add_part);

    tables.goto(TEXT, 2, &[1]);
    tables.goto(INTERPOLATION, 6, &[1]);
    tables.goto(PARTS, 1, &[0]);
    let built = tables.build();

    let tokenizer = ExternalTokenizer::new(TokenizerFlags::CONTEXTUAL, template_token);
    ParserSpec {
        version: FILE_VERSION,
        states: Table::Values(built.states),
        state_data: Table::Encoded(encode_array(&built.data)),
        goto: Table::Values(built.goto),
        node_names: "⚠ Template Text Interpolation { Expression }".to_owned(),
        max_term: u32::from(PARTS),
        tokenizers: vec![TokenizerSpec::Custom(Arc::new(tokenizer))],
        top_rules: vec![TopRule { name: "Template".to_owned(), state: 0, term: 1 }],
        token_prec,
        ..ParserSpec::default()
    }
}

pub fn template() -> Result<LrParser, Error> {
    LrParser::deserialize(template_spec())
}

/// A template parser that mounts an arithmetic tree on every `Expression`.
pub fn template_with_expressions() -> Result<LrParser, Error> {
    let expressions: Arc<dyn Parser> = Arc::new(arithmetic()?);
    let nest = move |node: &dyn SyntaxNodeRef, _: &dyn Input| {
        (node.name() == "Expression").then(|| NestedParse::new(expressions.clone()))
    };
    let config = ParserConfig { wrap: Some(parse_mixed(nest)), ..ParserConfig::default() };
    template()?.configure(config)
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    #[test]
    fn text_and_interpolations() {
        let parser = template().unwrap();
        let tree = parser.parse(&"a {1+2} b", &[], None).unwrap();
        expect![[r#"Template(Text,Interpolation("{",Expression,"}"),Text)"#]]
            .assert_eq(&tree.to_string());
        let tree = parser.parse(&"{1}{2}", &[], None).unwrap();
        let interpolation = r#"Interpolation("{",Expression,"}")"#;
        assert_eq!(tree.to_string(), format!("Template({interpolation},{interpolation})"));
    }

    #[test]
    fn expressions_are_parsed_as_arithmetic() {
        let parser = template_with_expressions().unwrap();
        let tree = parser.parse(&"a {1+2} b", &[], None).unwrap();
        let expression = r#"Program(BinaryExpression(Number,"+",Number))"#;
        let expected = format!(r#"Template(Text,Interpolation("{{",{expression},"}}"),Text)"#);
        assert_eq!(tree.to_string(), expected);
    }

    #[test]
    fn empty_template() {
        let tree = template().unwrap().parse(&"", &[], None).unwrap();
        assert_eq!(tree.to_string(), "Template");
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn unclosed_interpolation() {
        let tree = template().unwrap().parse(&"x {1", &[], None).unwrap();
        expect![[r#"Template(Text,Interpolation("{",Expression,⚠))"#]]
            .assert_eq(&tree.to_string());
    }
}
