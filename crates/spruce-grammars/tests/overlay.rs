use std::sync::Arc;

use expect_test::expect;
use spruce_grammars::{arithmetic, template};
use spruce_lr::{LrParser, ParserConfig};
use spruce_tree::{
    ChangedRange, Input, NestedParse, Overlay, OverlayMatch, Parser, SyntaxNode, SyntaxNodeRef,
    TextRange, Tree, TreeFragment, parse_mixed,
};

const TEXT: &str = "a {1+} b {2} c";

/// A template parser that runs one arithmetic parse over all expressions of a document.
fn joined_expressions(overlay: fn() -> Overlay) -> LrParser {
    let expressions: Arc<dyn Parser> = Arc::new(arithmetic().unwrap());
    let nest = move |node: &dyn SyntaxNodeRef, _: &dyn Input| {
        (node.name() == "Template")
            .then(|| NestedParse::new(expressions.clone()).with_overlay(overlay()))
    };
    let config = ParserConfig { wrap: Some(parse_mixed(nest)), ..ParserConfig::default() };
    template().unwrap().configure(config).unwrap()
}

fn expression_predicate() -> Overlay {
    Overlay::Predicate(Arc::new(|node: &dyn SyntaxNodeRef| match node.name() {
        "Expression" => OverlayMatch::Node,
        _ => OverlayMatch::No,
    }))
}

fn expression_ranges() -> Overlay {
    let range = |from: u32, to: u32| TextRange::new(from.into(), to.into());
    Overlay::Ranges(vec![range(3, 5), range(10, 11)])
}

fn ancestors(node: SyntaxNode) -> String {
    let mut names = Vec::new();
    let mut current = Some(node);
    while let Some(node) = current {
        names.push(format!("{} {}..{}", node.name(), node.from(), node.to()));
        current = node.parent();
    }
    names.join(", ")
}

fn parse(parser: &LrParser, text: &str, fragments: &[TreeFragment]) -> Tree {
    parser.parse(&text, fragments, None).unwrap()
}

#[test]
fn predicate_overlay_joins_expressions() {
    let tree = parse(&joined_expressions(expression_predicate), TEXT, &[]);

    expect!["Number 3..4, BinaryExpression 3..11, Program 3..11, Template 0..14"]
        .assert_eq(&ancestors(tree.resolve_inner(3, 1)));
    expect!["Number 10..11, BinaryExpression 3..11, Program 3..11, Template 0..14"]
        .assert_eq(&ancestors(tree.resolve_inner(10, 1)));
    expect!["Expression 3..5, Interpolation 2..6, Template 0..14"]
        .assert_eq(&ancestors(tree.resolve(3, 1)));
}

#[test]
fn predicate_overlay_after_edit() {
    let parser = joined_expressions(expression_predicate);
    let old = parse(&parser, TEXT, &[]);

    let text = format!("x{TEXT}");
    let change = ChangedRange { from_a: 0, to_a: 0, from_b: 0, to_b: 1 };
    let fragments = TreeFragment::add_tree(&old, &[], false);
    let fragments = TreeFragment::apply_changes(&fragments, &[change], 0);
    let tree = parse(&parser, &text, &fragments);

    expect!["Number 4..5, BinaryExpression 4..12, Program 4..12, Template 0..15"]
        .assert_eq(&ancestors(tree.resolve_inner(4, 1)));
    let fresh = parse(&parser, &text, &[]);
    for pos in [4, 11] {
        assert_eq!(
            ancestors(tree.resolve_inner(pos, 1)),
            ancestors(fresh.resolve_inner(pos, 1)),
            "at {pos}"
        );
    }
}

#[test]
fn explicit_overlay_ranges() {
    let tree = parse(&joined_expressions(expression_ranges), TEXT, &[]);

    let overlay = tree.mounted().and_then(|mounted| mounted.overlay.clone()).unwrap();
    let positions: Vec<_> =
        overlay.iter().map(|r| (u32::from(r.start()), u32::from(r.end()))).collect();
    assert_eq!(positions, vec![(3, 5), (10, 11)]);

    expect!["Number 10..11, BinaryExpression 3..11, Program 3..11, Template 0..14"]
        .assert_eq(&ancestors(tree.resolve_inner(10, 1)));
    expect!["Expression 10..11, Interpolation 9..12, Template 0..14"]
        .assert_eq(&ancestors(tree.resolve(10, 1)));
}
