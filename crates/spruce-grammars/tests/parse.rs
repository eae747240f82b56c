use expect_test::expect;
use spruce_errors::SyntaxErrorKind;
use spruce_grammars::{arithmetic, template_with_expressions};
use spruce_lr::ParserConfig;
use spruce_tree::{ChangedRange, Error, IterMode, Parser as _, Tree, TreeChild, TreeFragment};

fn parse(text: &str) -> Tree {
    arithmetic().unwrap().parse(&text, &[], None).unwrap()
}

fn errors(tree: &Tree) -> Vec<(u32, u32)> {
    let mut found = Vec::new();
    let enter = |node: &spruce_tree::TreeCursor| {
        if node.node_type().is_error() {
            found.push((node.from(), node.to()));
        }
        true
    };
    tree.iterate(IterMode::empty(), 0, tree.len(), enter, |_| {});
    found
}

#[test]
fn recovers_from_unterminated_string() {
    let tree = parse("1+\"abc");
    expect![[r#"Program(BinaryExpression(Number,"+",⚠))"#]].assert_eq(&tree.to_string());
    assert_eq!(errors(&tree), vec![(2, 6)]);
    assert_eq!(tree.len(), 6);
}

#[test]
fn diagnostics_for_recovered_tree() {
    let diagnostics = spruce_errors::collect(&parse("1+\"abc"));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind(), SyntaxErrorKind::UnexpectedInput);
    assert_eq!(diagnostics[0].message(), "unexpected input in BinaryExpression");
    assert_eq!(u32::from(diagnostics[0].range().start()), 2);
    assert_eq!(u32::from(diagnostics[0].range().end()), 6);
}

#[test]
fn missing_operand_at_end() {
    let tree = parse("1+");
    expect![[r#"Program(BinaryExpression(Number,"+",⚠))"#]].assert_eq(&tree.to_string());
    assert_eq!(errors(&tree), vec![(2, 2)]);

    let strict = arithmetic()
        .unwrap()
        .configure(ParserConfig { strict: Some(true), ..ParserConfig::default() })
        .unwrap();
    assert_eq!(strict.parse(&"1+", &[], None).unwrap_err(), Error::NoParse { pos: 2 });
    assert!(strict.parse(&"1+2", &[], None).is_ok());
}

#[test]
fn stopping_early() {
    let parser = arithmetic().unwrap();
    let input = "1+2+3+4";
    let mut parse = parser.start_parse(&input, &[], None);
    parse.stop_at(3).unwrap();
    assert_eq!(parse.stopped_at(), Some(3));
    assert_eq!(parse.stop_at(5), Err(Error::StopAtForward { current: 3, requested: 5 }));
    let tree = loop {
        if let Some(tree) = parse.advance().unwrap() {
            break tree;
        }
    };
    expect![[r#"Program(BinaryExpression(BinaryExpression(Number,"+",Number),"+",⚠))"#]]
        .assert_eq(&tree.to_string());
    assert_eq!(tree.len(), 4);
}

#[test]
fn parses_are_deterministic() {
    for text in ["1 + * 2", "\"a\" 3 +", "*", "1+2*3+\"x\"*4"] {
        assert_eq!(parse(text).to_string(), parse(text).to_string(), "{text:?}");
    }
}

#[test]
fn cursor_walks_agree() {
    let tree = parse("1 + 2 * \"three\" + 4");
    let describe = |cursor: &spruce_tree::TreeCursor| {
        format!("{}@{}..{}", cursor.name(), cursor.from(), cursor.to())
    };

    let mut cursor = tree.cursor();
    let mut forward = vec![describe(&cursor)];
    while cursor.next(true) {
        forward.push(describe(&cursor));
    }

    let mut cursor = tree.cursor();
    while cursor.last_child() {}
    let mut backward = vec![describe(&cursor)];
    while cursor.prev(true) {
        backward.push(describe(&cursor));
    }
    backward.reverse();

    assert_eq!(forward, backward);
    assert_eq!(forward.len(), 11);
}

fn left_spine(tree: &Tree) -> Vec<Tree> {
    let mut spine = Vec::new();
    let mut current = tree.clone();
    loop {
        let next = match (current.children().first(), current.positions().first()) {
            (Some(TreeChild::Tree(child)), Some(0)) => child.clone(),
            _ => break,
        };
        spine.push(next.clone());
        current = next;
    }
    spine
}

#[test]
fn reuses_unchanged_nodes() {
    let parser = arithmetic()
        .unwrap()
        .configure(ParserConfig { buffer_length: Some(8), ..ParserConfig::default() })
        .unwrap();
    let old_text = (0..30).map(|n| n.to_string()).collect::<Vec<_>>().join("+");
    let old = parser.parse(&old_text, &[], None).unwrap();

    let new_text = format!("{old_text}0");
    let end = old_text.len() as u32;
    let change = ChangedRange { from_a: end, to_a: end, from_b: end, to_b: end + 1 };
    let fragments = TreeFragment::add_tree(&old, &[], false);
    let fragments = TreeFragment::apply_changes(&fragments, &[change], 0);
    let new = parser.parse(&new_text, &fragments, None).unwrap();

    assert_eq!(new.to_string(), parser.parse(&new_text, &[], None).unwrap().to_string());
    assert_eq!(new.len(), end + 1);
    let old_spine = left_spine(&old);
    let reused = left_spine(&new)
        .iter()
        .any(|node| old_spine.iter().any(|old_node| old_node.ptr_eq(node)));
    assert!(reused, "no node of the old tree was reused");
}

#[test]
fn mixed_template() {
    let parser = template_with_expressions().unwrap();
    let tree = parser.parse(&"x = {1*2} and {\"a\"+}", &[], None).unwrap();
    let mut programs = Vec::new();
    let mut cursor = tree.cursor();
    while cursor.next(true) {
        if cursor.name() == "Program" {
            programs.push((cursor.from(), cursor.to()));
        }
    }
    assert_eq!(programs, vec![(5, 8), (15, 19)]);
    assert_eq!(spruce_errors::collect(&tree).len(), 1);
}
