//! Typed metadata attached to node types or to individual tree nodes.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

use crate::node_type::NodeType;
use crate::tree::MountedTree;

/// A type-erased prop value.
pub type PropValue = Arc<dyn Any + Send + Sync>;

type ErasedCombine = Arc<dyn Fn(&PropValue, &PropValue) -> PropValue + Send + Sync>;
type ErasedDeserialize = Arc<dyn Fn(&str) -> Option<PropValue> + Send + Sync>;

static NEXT_PROP_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropId(u32);

/// A prop key. Each call to [`NodeProp::new`] yields a key with a fresh identity.
pub struct NodeProp<T> {
    id: PropId,
    per_node: bool,
    combine: Option<fn(&T, &T) -> T>,
    deserialize: Option<fn(&str) -> Option<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for NodeProp<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeProp<T> {}

impl<T> fmt::Debug for NodeProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeProp").field("id", &self.id).field("per_node", &self.per_node).finish()
    }
}

impl<T> NodeProp<T> {
    #[inline]
    pub fn id(&self) -> PropId {
        self.id
    }

    #[inline]
    pub fn is_per_node(&self) -> bool {
        self.per_node
    }
}

impl<T: Send + Sync + 'static> NodeProp<T> {
    pub fn new() -> Self {
        let id = PropId(NEXT_PROP_ID.fetch_add(1, Ordering::Relaxed));
        Self { id, per_node: false, combine: None, deserialize: None, _marker: PhantomData }
    }

    /// Marks the prop as stored on tree nodes rather than node types.
    pub fn per_node(mut self) -> Self {
        self.per_node = true;
        self
    }

    /// Sets how a value added through [`NodeSet::extend`](crate::NodeSet::extend) merges with
    /// an existing one. Without it the later value replaces the earlier.
    pub fn with_combine(mut self, combine: fn(&T, &T) -> T) -> Self {
        self.combine = Some(combine);
        self
    }

    pub fn with_deserialize(mut self, deserialize: fn(&str) -> Option<T>) -> Self {
        self.deserialize = Some(deserialize);
        self
    }

    /// Parses a textual prop value, as found in serialized grammar tables.
    pub fn deserialize(&self, text: &str) -> Option<T> {
        (self.deserialize?)(text)
    }

    pub fn value(&self, value: T) -> (PropId, PropValue) {
        (self.id, Arc::new(value))
    }

    /// Builds a source that assigns this prop to node types when a node set is extended.
    ///
    /// # Panics
    ///
    /// Panics for per-node props, which can't live on node types.
    #[track_caller]
    pub fn add(
        &self,
        assign: impl Fn(&NodeType) -> Option<T> + Send + Sync + 'static,
    ) -> NodePropSource {
        assert!(!self.per_node, "can't add per-node props to node types");
        let combine = self.combine.map(|combine| -> ErasedCombine {
            Arc::new(move |old: &PropValue, new: &PropValue| {
                match (old.downcast_ref::<T>(), new.downcast_ref::<T>()) {
                    (Some(old), Some(new)) => Arc::new(combine(old, new)),
                    _ => new.clone(),
                }
            })
        });
        NodePropSource {
            id: self.id,
            combine,
            assign: Arc::new(move |ty| assign(ty).map(|value| Arc::new(value) as PropValue)),
        }
    }

    /// Forgets the value type, keeping what table deserialization needs.
    pub fn erased(&self) -> ErasedProp {
        let deserialize = self.deserialize.map(|deserialize| -> ErasedDeserialize {
            Arc::new(move |text| deserialize(text).map(|value| Arc::new(value) as PropValue))
        });
        ErasedProp { id: self.id, per_node: self.per_node, deserialize }
    }
}

impl<T: Send + Sync + 'static> Default for NodeProp<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`NodeProp`] with its value type erased.
#[derive(Clone)]
pub struct ErasedProp {
    id: PropId,
    per_node: bool,
    deserialize: Option<ErasedDeserialize>,
}

impl ErasedProp {
    #[inline]
    pub fn id(&self) -> PropId {
        self.id
    }

    #[inline]
    pub fn is_per_node(&self) -> bool {
        self.per_node
    }

    pub fn deserialize(&self, text: &str) -> Option<PropValue> {
        self.deserialize.as_ref().and_then(|deserialize| deserialize(text))
    }
}

impl fmt::Debug for ErasedProp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedProp").field("id", &self.id).finish()
    }
}

/// Assigns prop values to node types, see [`NodeProp::add`].
#[derive(Clone)]
pub struct NodePropSource {
    id: PropId,
    combine: Option<ErasedCombine>,
    assign: Arc<dyn Fn(&NodeType) -> Option<PropValue> + Send + Sync>,
}

impl NodePropSource {
    #[inline]
    pub fn id(&self) -> PropId {
        self.id
    }

    pub(crate) fn assign(&self, ty: &NodeType) -> Option<PropValue> {
        (self.assign)(ty)
    }

    pub(crate) fn combine(&self, old: &PropValue, new: PropValue) -> PropValue {
        match &self.combine {
            Some(combine) => combine(old, &new),
            None => new,
        }
    }
}

impl fmt::Debug for NodePropSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePropSource").field("id", &self.id).finish()
    }
}

pub(crate) fn lookup<'p, T: 'static>(
    values: &'p [(PropId, PropValue)],
    prop: &NodeProp<T>,
) -> Option<&'p T> {
    values.iter().find(|(id, _)| *id == prop.id).and_then(|(_, value)| value.downcast_ref())
}

pub(crate) fn lookup_value(values: &[(PropId, PropValue)], id: PropId) -> Option<&PropValue> {
    values.iter().find(|(prop, _)| *prop == id).map(|(_, value)| value)
}

/// Inserts or replaces a value, keeping at most one entry per prop.
pub(crate) fn set_value(values: &mut Vec<(PropId, PropValue)>, id: PropId, value: PropValue) {
    match values.iter_mut().find(|(prop, _)| *prop == id) {
        Some(slot) => slot.1 = value,
        None => values.push((id, value)),
    }
}

/// Text direction isolation for bidirectional text handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Isolate {
    Ltr,
    Rtl,
    Auto,
}

fn space_separated(text: &str) -> Option<Vec<String>> {
    Some(text.split(' ').filter(|word| !word.is_empty()).map(str::to_owned).collect())
}

static CLOSED_BY: LazyLock<NodeProp<Vec<String>>> =
    LazyLock::new(|| NodeProp::new().with_deserialize(space_separated));
static OPENED_BY: LazyLock<NodeProp<Vec<String>>> =
    LazyLock::new(|| NodeProp::new().with_deserialize(space_separated));
static GROUP: LazyLock<NodeProp<Vec<String>>> =
    LazyLock::new(|| NodeProp::new().with_deserialize(space_separated));
static ISOLATE: LazyLock<NodeProp<Isolate>> = LazyLock::new(|| {
    NodeProp::new().with_deserialize(|text| match text {
        "ltr" => Some(Isolate::Ltr),
        "rtl" => Some(Isolate::Rtl),
        "auto" | "" => Some(Isolate::Auto),
        _ => None,
    })
});
static CONTEXT_HASH: LazyLock<NodeProp<u32>> = LazyLock::new(|| NodeProp::new().per_node());
static LOOK_AHEAD: LazyLock<NodeProp<u32>> = LazyLock::new(|| NodeProp::new().per_node());
static MOUNTED: LazyLock<NodeProp<MountedTree>> = LazyLock::new(|| NodeProp::new().per_node());

/// Names of the node types that close a node of this type, for bracket-like nodes.
pub fn closed_by() -> &'static NodeProp<Vec<String>> {
    &CLOSED_BY
}

/// The inverse of [`closed_by`].
pub fn opened_by() -> &'static NodeProp<Vec<String>> {
    &OPENED_BY
}

/// Group names a node type belongs to, consulted by [`NodeType::is`].
pub fn group() -> &'static NodeProp<Vec<String>> {
    &GROUP
}

pub fn isolate() -> &'static NodeProp<Isolate> {
    &ISOLATE
}

/// Hash of the parser context a node was created in. Reuse requires a matching hash.
pub fn context_hash() -> &'static NodeProp<u32> {
    &CONTEXT_HASH
}

/// How far past its end the tokenizer looked while producing a node.
pub fn look_ahead() -> &'static NodeProp<u32> {
    &LOOK_AHEAD
}

/// A tree from another language mounted on this node.
pub fn mounted() -> &'static NodeProp<MountedTree> {
    &MOUNTED
}

/// Looks up one of the built-in props by the name grammar tables use for it.
pub fn builtin(name: &str) -> Option<ErasedProp> {
    let prop = match name {
        "closedBy" => closed_by().erased(),
        "openedBy" => opened_by().erased(),
        "group" => group().erased(),
        "isolate" => isolate().erased(),
        _ => return None,
    };
    Some(prop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_identities() {
        let a = NodeProp::<u32>::new();
        let b = NodeProp::<u32>::new();
        assert_ne!(a.id(), b.id());
        assert_ne!(closed_by().id(), opened_by().id());
    }

    #[test]
    fn deserialize_builtins() {
        assert_eq!(closed_by().deserialize("b  c"), Some(vec!["b".to_owned(), "c".to_owned()]));
        assert_eq!(isolate().deserialize(""), Some(Isolate::Auto));
        assert_eq!(isolate().deserialize("up"), None);

        let group = builtin("group").unwrap();
        let value = group.deserialize("Expression").unwrap();
        assert_eq!(value.downcast_ref::<Vec<String>>(), Some(&vec!["Expression".to_owned()]));
        assert!(builtin("nope").is_none());
    }

    #[test]
    #[should_panic = "can't add per-node props"]
    fn per_node_props_reject_types() {
        look_ahead().add(|_| Some(1));
    }
}
