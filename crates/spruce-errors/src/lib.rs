use std::fmt::{self, Display};

pub use annotate_snippets::Renderer;
use annotate_snippets::{Level, Snippet};
use spruce_tree::{IterMode, SyntaxNode, Tree, TreeCursor};
pub use text_size::TextRange;
use text_size::TextSize;

/// What the parser had to do to get past an error node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxErrorKind {
    /// Input was skipped.
    UnexpectedInput,
    /// A token was assumed at the end of the document.
    UnexpectedEnd,
    /// A token was assumed before the following input.
    MissingToken,
}

impl SyntaxErrorKind {
    fn of(range: TextRange, end: TextSize) -> Self {
        match range.is_empty() {
            false => Self::UnexpectedInput,
            true if range.start() == end => Self::UnexpectedEnd,
            true => Self::MissingToken,
        }
    }
}

impl Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnexpectedInput => "unexpected input",
            Self::UnexpectedEnd => "unexpected end of input",
            Self::MissingToken => "missing token",
        })
    }
}

/// The named node an error sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub name: String,
    pub range: TextRange,
}

/// One run of error nodes in a syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    kind: SyntaxErrorKind,
    range: TextRange,
    context: Option<Context>,
}

impl Diagnostic {
    pub fn kind(&self) -> SyntaxErrorKind {
        self.kind
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn message(&self) -> String {
        match &self.context {
            Some(context) => format!("{} in {}", self.kind, context.name),
            None => self.kind.to_string(),
        }
    }

    /// Points at the error and, when there is one, at the enclosing node.
    pub fn render(&self, renderer: &Renderer, path: &str, text: &str) -> String {
        let message = self.message();
        let label;
        let mut snippet = Snippet::source(text)
            .origin(path)
            .annotation(Level::Error.span(self.range.into()).label("here"))
            .fold(true);
        if let Some(context) = &self.context
            && context.range != self.range
        {
            label = format!("while parsing this {}", context.name);
            snippet = snippet.annotation(Level::Info.span(context.range.into()).label(&label));
        }
        renderer.render(Level::Error.title(&message).snippet(snippet)).to_string()
    }
}

/// One diagnostic per run of error nodes in `tree`. Errors that touch or overlap are
/// reported together, nested ones are covered by their outermost error.
pub fn collect(tree: &Tree) -> Vec<Diagnostic> {
    let end = TextSize::new(tree.len());
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let enter = |node: &TreeCursor| {
        if !node.node_type().is_error() {
            return true;
        }
        let range = TextRange::new(node.from().into(), node.to().into());
        match diagnostics.last_mut() {
            Some(last) if last.range.end() >= range.start() => {
                last.range = last.range.cover(range);
                last.kind = SyntaxErrorKind::of(last.range, end);
            }
            _ => diagnostics.push(Diagnostic {
                kind: SyntaxErrorKind::of(range, end),
                range,
                context: context(node.node()),
            }),
        }
        false
    };
    tree.iterate(IterMode::empty(), 0, tree.len(), enter, |_| {});
    diagnostics
}

fn context(error: SyntaxNode) -> Option<Context> {
    let mut parent = error.parent();
    while let Some(node) = parent {
        let ty = node.node_type();
        if !ty.is_anonymous() && !ty.is_error() {
            let range = TextRange::new(node.from().into(), node.to().into());
            return Some(Context { name: node.name().to_owned(), range });
        }
        parent = node.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use spruce_tree::{NodeSet, NodeType, NodeTypeSpec, TreeChild};

    use super::*;

    fn types() -> NodeSet {
        let names = ["Doc", "Word", "⚠", "Group"];
        let types = names
            .into_iter()
            .enumerate()
            .map(|(id, name)| {
                NodeType::define(NodeTypeSpec {
                    id: id as u16,
                    name: Some(name.to_owned()),
                    top: id == 0,
                    error: id == 2,
                    ..Default::default()
                })
            })
            .collect();
        NodeSet::new(types).unwrap()
    }

    fn node(set: &NodeSet, id: usize, children: &[(usize, u32, u32)], length: u32) -> Tree {
        let leaf = |id: usize, len| Tree::new(set.types()[id].clone(), Vec::new(), Vec::new(), len);
        let positions = children.iter().map(|&(_, from, _)| from).collect();
        let children =
            children.iter().map(|&(id, from, to)| TreeChild::Tree(leaf(id, to - from))).collect();
        Tree::new(set.types()[id].clone(), children, positions, length)
    }

    fn summary(diagnostics: &[Diagnostic]) -> String {
        diagnostics.iter().map(|d| format!("{:?} {}\n", d.range(), d.message())).collect()
    }

    #[test]
    fn adjacent_errors_are_merged() {
        let set = types();
        let tree = node(&set, 0, &[(1, 0, 3), (2, 3, 4), (2, 4, 6), (1, 6, 9), (2, 9, 9)], 12);
        expect![[r#"
            3..6 unexpected input in Doc
            9..9 missing token in Doc
        "#]]
        .assert_eq(&summary(&collect(&tree)));
    }

    #[test]
    fn missing_input_at_end() {
        let set = types();
        let tree = node(&set, 0, &[(1, 0, 4), (2, 4, 4)], 4);
        let diagnostics = collect(&tree);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind(), SyntaxErrorKind::UnexpectedEnd);
    }

    #[test]
    fn innermost_named_parent_is_the_context() {
        let set = types();
        let group = node(&set, 3, &[(1, 0, 2), (2, 2, 3)], 3);
        let tree = Tree::new(set.types()[0].clone(), vec![TreeChild::Tree(group)], vec![4], 7);
        let diagnostics = collect(&tree);
        let context = diagnostics[0].context().unwrap();
        assert_eq!(context.name, "Group");
        assert_eq!(context.range, TextRange::new(4.into(), 7.into()));
        assert_eq!(diagnostics[0].range(), TextRange::new(6.into(), 7.into()));
    }

    #[test]
    fn clean_tree_has_no_diagnostics() {
        let set = types();
        let tree = node(&set, 0, &[(1, 0, 4)], 4);
        assert!(collect(&tree).is_empty());
    }

    #[test]
    fn render_points_at_error_and_context() {
        let set = types();
        let group = node(&set, 3, &[(1, 0, 1), (2, 2, 3)], 5);
        let tree = Tree::new(set.types()[0].clone(), vec![TreeChild::Tree(group)], vec![0], 5);
        let diagnostic = &collect(&tree)[0];
        let rendered = diagnostic.render(&Renderer::plain(), "input.calc", "1 ) 2");
        assert!(rendered.starts_with("error: unexpected input in Group"), "{rendered}");
        assert!(rendered.contains("input.calc"), "{rendered}");
        assert!(rendered.contains("while parsing this Group"), "{rendered}");
    }
}
