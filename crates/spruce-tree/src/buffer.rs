use std::fmt;

use crate::node_type::{NodeSet, NodeType};
use crate::tree;

/// Position tests used when looking for a child at a position.
pub(crate) mod side {
    pub(crate) const BEFORE: i8 = -2;
    pub(crate) const AT_OR_BEFORE: i8 = -1;
    pub(crate) const AROUND: i8 = 0;
    pub(crate) const AT_OR_AFTER: i8 = 1;
    pub(crate) const AFTER: i8 = 2;
    pub(crate) const DONT_CARE: i8 = 4;
}

pub(crate) fn check_side(side: i8, pos: i64, from: i64, to: i64) -> bool {
    match side {
        side::BEFORE => from < pos,
        side::AT_OR_BEFORE => to >= pos && from < pos,
        side::AROUND => from < pos && to > pos,
        side::AT_OR_AFTER => from <= pos && to > pos,
        side::AFTER => to > pos,
        _ => true,
    }
}

/// One node inside a [`TreeBuffer`].
///
/// `start` and `end` are relative to the buffer's start. `end_index` is the index of the
/// first record after this node's descendants, so a node without children has
/// `end_index == index + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferRecord {
    ty: u16,
    start: u16,
    end: u16,
    end_index: u32,
}

impl BufferRecord {
    #[inline]
    pub const fn new(ty: u16, start: u16, end: u16, end_index: u32) -> Self {
        Self { ty, start, end, end_index }
    }

    #[inline]
    pub fn ty(&self) -> u16 {
        self.ty
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.start.into()
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.end.into()
    }

    #[inline]
    pub fn end_index(&self) -> u32 {
        self.end_index
    }
}

/// A flat pre-order run of small nodes, stored without per-node allocation.
pub struct TreeBuffer {
    records: Box<[BufferRecord]>,
    length: u32,
    set: NodeSet,
}

impl TreeBuffer {
    #[track_caller]
    pub fn new(records: Vec<BufferRecord>, length: u32, set: NodeSet) -> Self {
        debug_assert!(
            records.iter().enumerate().all(|(index, record)| {
                record.end_index as usize > index && record.end_index as usize <= records.len()
            }),
            "buffer records must end after themselves and inside the buffer"
        );
        debug_assert!(records.iter().all(|record| record.end() <= length));
        Self { records: records.into(), length, set }
    }

    #[inline]
    pub fn records(&self) -> &[BufferRecord] {
        &self.records
    }

    #[inline]
    pub fn record(&self, index: u32) -> BufferRecord {
        self.records[index as usize]
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    pub fn set(&self) -> &NodeSet {
        &self.set
    }

    #[inline]
    pub fn node_type(&self, index: u32) -> &NodeType {
        &self.set.types()[self.record(index).ty as usize]
    }

    /// Finds the first (`dir > 0`) or last record among the siblings in
    /// `start_index..end_index` that passes the side test at `pos`.
    pub(crate) fn find_child(
        &self,
        start_index: u32,
        end_index: u32,
        dir: i32,
        pos: i64,
        side: i8,
    ) -> Option<u32> {
        let mut pick = None;
        let mut index = start_index;
        while index != end_index {
            let record = self.record(index);
            if check_side(side, pos, record.start().into(), record.end().into()) {
                pick = Some(index);
                if dir > 0 {
                    break;
                }
            }
            index = record.end_index;
        }
        pick
    }

    /// Copies the records in `start_index..end_index` into a new buffer starting at `from`.
    pub fn slice(&self, start_index: u32, end_index: u32, from: u32) -> TreeBuffer {
        let mut length = 0;
        let records = self.records[start_index as usize..end_index as usize]
            .iter()
            .map(|record| {
                let end = record.end as u32 - from;
                length = length.max(end);
                BufferRecord::new(
                    record.ty,
                    (record.start as u32 - from) as u16,
                    end as u16,
                    record.end_index - start_index,
                )
            })
            .collect();
        TreeBuffer::new(records, length, self.set.clone())
    }

    pub(crate) fn write_child(&self, f: &mut fmt::Formatter<'_>, index: u32) -> fmt::Result {
        let record = self.record(index);
        tree::write_name(f, self.node_type(index))?;
        let mut child = index + 1;
        if child == record.end_index {
            return Ok(());
        }
        f.write_str("(")?;
        while child < record.end_index {
            if child != index + 1 {
                f.write_str(",")?;
            }
            self.write_child(f, child)?;
            child = self.record(child).end_index;
        }
        f.write_str(")")
    }
}

impl fmt::Display for TreeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut index = 0;
        while (index as usize) < self.records.len() {
            if index != 0 {
                f.write_str(",")?;
            }
            self.write_child(f, index)?;
            index = self.record(index).end_index;
        }
        Ok(())
    }
}

impl fmt::Debug for TreeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeBuffer")
            .field("records", &self.records)
            .field("length", &self.length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::node_type::NodeTypeSpec;

    fn set() -> NodeSet {
        let names = ["Call", "Name", "Args", "Number"];
        let types = names
            .iter()
            .enumerate()
            .map(|(id, name)| {
                NodeType::define(NodeTypeSpec {
                    id: id as u16,
                    name: Some((*name).to_owned()),
                    ..Default::default()
                })
            })
            .collect();
        NodeSet::new(types).unwrap()
    }

    // f(1 2) at offset 0: Call(Name, Args(Number, Number))
    fn call() -> TreeBuffer {
        let records = vec![
            BufferRecord::new(0, 0, 6, 5),
            BufferRecord::new(1, 0, 1, 2),
            BufferRecord::new(2, 1, 6, 5),
            BufferRecord::new(3, 2, 3, 4),
            BufferRecord::new(3, 4, 5, 5),
        ];
        TreeBuffer::new(records, 6, set())
    }

    #[test]
    fn display() {
        expect!["Call(Name,Args(Number,Number))"].assert_eq(&call().to_string());
    }

    #[test]
    fn find_child() {
        let buffer = call();
        assert_eq!(buffer.find_child(3, 5, 1, 0, side::DONT_CARE), Some(3));
        assert_eq!(buffer.find_child(3, 5, -1, 0, side::DONT_CARE), Some(4));
        assert_eq!(buffer.find_child(1, 5, 1, 3, side::AT_OR_BEFORE), Some(2));
        assert_eq!(buffer.find_child(3, 5, 1, 3, side::AROUND), None);
        assert_eq!(buffer.find_child(3, 5, -1, 3, side::BEFORE), Some(3));
    }

    #[test]
    fn slice() {
        let sliced = call().slice(2, 5, 1);
        assert_eq!(sliced.len(), 5);
        assert_eq!(sliced.record(0), BufferRecord::new(2, 0, 5, 3));
        assert_eq!(sliced.record(2), BufferRecord::new(3, 3, 4, 3));
        expect!["Args(Number,Number)"].assert_eq(&sliced.to_string());
    }
}
