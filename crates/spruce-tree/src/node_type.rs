use std::fmt;
use std::sync::{Arc, LazyLock};

use bitflags::bitflags;

use crate::Error;
use crate::props::{self, NodeProp, NodePropSource, PropId, PropValue};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        const TOP = 1;
        const SKIPPED = 1 << 1;
        const ERROR = 1 << 2;
        const ANONYMOUS = 1 << 3;
    }
}

/// Describes a node type for [`NodeType::define`].
#[derive(Default)]
pub struct NodeTypeSpec {
    pub id: u16,
    /// Nodes without a name are anonymous and hidden from default traversal.
    pub name: Option<String>,
    pub top: bool,
    pub skipped: bool,
    pub error: bool,
    pub props: Vec<(PropId, PropValue)>,
}

/// A node type. Types compare by identity, two separately defined types are never equal.
#[derive(Clone)]
pub struct NodeType(Arc<NodeTypeData>);

struct NodeTypeData {
    name: Box<str>,
    id: u16,
    flags: NodeFlags,
    props: Box<[(PropId, PropValue)]>,
}

static NONE: LazyLock<NodeType> = LazyLock::new(|| {
    NodeType::new(String::new(), 0, NodeFlags::ANONYMOUS, Vec::new())
});

impl NodeType {
    fn new(name: String, id: u16, flags: NodeFlags, props: Vec<(PropId, PropValue)>) -> Self {
        Self(Arc::new(NodeTypeData { name: name.into(), id, flags, props: props.into() }))
    }

    pub fn define(spec: NodeTypeSpec) -> Self {
        let mut flags = NodeFlags::empty();
        flags.set(NodeFlags::TOP, spec.top);
        flags.set(NodeFlags::SKIPPED, spec.skipped);
        flags.set(NodeFlags::ERROR, spec.error);
        flags.set(NodeFlags::ANONYMOUS, spec.name.is_none());

        let mut values = Vec::with_capacity(spec.props.len());
        for (id, value) in spec.props {
            props::set_value(&mut values, id, value);
        }
        Self::new(spec.name.unwrap_or_default(), spec.id, flags, values)
    }

    /// The anonymous type with id 0, used for synthetic wrapper nodes.
    pub fn none() -> Self {
        NONE.clone()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.0.id
    }

    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.0.flags
    }

    #[inline]
    pub fn is_top(&self) -> bool {
        self.0.flags.contains(NodeFlags::TOP)
    }

    #[inline]
    pub fn is_skipped(&self) -> bool {
        self.0.flags.contains(NodeFlags::SKIPPED)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.0.flags.contains(NodeFlags::ERROR)
    }

    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.0.flags.contains(NodeFlags::ANONYMOUS)
    }

    pub fn prop<T: 'static>(&self, prop: &NodeProp<T>) -> Option<&T> {
        props::lookup(&self.0.props, prop)
    }

    pub(crate) fn prop_values(&self) -> &[(PropId, PropValue)] {
        &self.0.props
    }

    /// True when the type has this name or lists it in its [`group`](props::group) prop.
    pub fn is(&self, name: &str) -> bool {
        self.name() == name
            || self.prop(props::group()).is_some_and(|groups| groups.iter().any(|g| g == name))
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for NodeType {}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name(), self.id())
    }
}

/// The node types of one grammar, indexed by id.
#[derive(Clone)]
pub struct NodeSet(Arc<[NodeType]>);

impl NodeSet {
    pub fn new(types: Vec<NodeType>) -> Result<Self, Error> {
        for (index, ty) in types.iter().enumerate() {
            if ty.id() as usize != index {
                return Err(Error::NodeSetOrder { name: ty.name().to_owned(), id: ty.id(), index });
            }
        }
        Ok(Self(types.into()))
    }

    #[inline]
    pub fn types(&self) -> &[NodeType] {
        &self.0
    }

    #[inline]
    pub fn get(&self, id: u16) -> Option<&NodeType> {
        self.0.get(id as usize)
    }

    /// Creates a copy of this set where the sources' values are added to matching types.
    ///
    /// Types that get no new values are shared with the original set.
    pub fn extend(&self, sources: &[NodePropSource]) -> Self {
        let types = self.0.iter().map(|ty| {
            let mut values: Option<Vec<(PropId, PropValue)>> = None;
            for source in sources {
                let Some(value) = source.assign(ty) else { continue };
                let values = values.get_or_insert_with(|| ty.prop_values().to_vec());
                let value = match props::lookup_value(values, source.id()) {
                    Some(old) => source.combine(old, value),
                    None => value,
                };
                props::set_value(values, source.id(), value);
            }
            match values {
                Some(values) => NodeType::new(ty.name().to_owned(), ty.id(), ty.flags(), values),
                None => ty.clone(),
            }
        });
        Self(types.collect())
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(id: u16, name: &str) -> NodeType {
        NodeType::define(NodeTypeSpec { id, name: Some(name.to_owned()), ..Default::default() })
    }

    #[test]
    fn identity() {
        let a = named(1, "A");
        let b = named(1, "A");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(NodeType::none().is_anonymous());
        assert_eq!(NodeType::none(), NodeType::none());
    }

    #[test]
    fn set_order() {
        let err = NodeSet::new(vec![NodeType::none(), named(2, "B")]).unwrap_err();
        assert_eq!(err, Error::NodeSetOrder { name: "B".to_owned(), id: 2, index: 1 });
    }

    #[test]
    fn extend_and_group() {
        let set = NodeSet::new(vec![NodeType::none(), named(1, "Number"), named(2, "String")])
            .unwrap();
        let groups = props::group().add(|ty| (ty.id() > 0).then(|| vec!["Literal".to_owned()]));
        let extended = set.extend(&[groups]);

        assert!(extended.types()[0].ptr_eq(&set.types()[0]));
        assert!(!extended.types()[1].ptr_eq(&set.types()[1]));
        assert!(extended.types()[1].is("Literal"));
        assert!(extended.types()[2].is("String"));
        assert!(!set.types()[1].is("Literal"));
    }

    #[test]
    fn extend_combines() {
        let weight = NodeProp::<u32>::new().with_combine(|a, b| a + b);
        let set = NodeSet::new(vec![named(0, "A")]).unwrap();
        let set = set.extend(&[weight.add(|_| Some(2)), weight.add(|_| Some(3))]);
        assert_eq!(set.types()[0].prop(&weight), Some(&5));
    }
}
