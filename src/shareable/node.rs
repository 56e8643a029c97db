// src/shareable/node.rs
//! Transfer-safe snapshot of a value graph
//!
//! A [`Shareable`] is a flat arena of nodes. Reference values of the source
//! graph become nodes addressed by index, so a sub-value reached from
//! several places is stored once and rebuilt once by [`Shareable::unpack`].

use crate::runtime::handle::RuntimeHandle;
use crate::runtime::value::Map;
use crate::worklet::{Closure, Function, Worklet, WorkletCode};
use crate::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub(crate) type NodeId = usize;

/// Slot holding either a primitive copied by value or a node reference
#[derive(Debug, Clone)]
pub(crate) enum Item {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Runtime(RuntimeHandle),
    Node(NodeId),
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Array(Vec<Item>),
    Object(Vec<(String, Item)>),
    Buffer(Vec<u8>),
    Worklet {
        code: WorkletCode,
        closure: Vec<(String, Item)>,
    },
}

/// Kind of value at the root of a [`Shareable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareableKind {
    Primitive,
    Array,
    Map,
    Buffer,
    Worklet,
    Runtime,
}

/// Immutable, `Send` snapshot of a value. Shares no storage with the value
/// it was cloned from.
#[derive(Debug, Clone)]
pub struct Shareable {
    nodes: Arc<[Node]>,
    root: Item,
}

impl Shareable {
    pub(crate) fn new(nodes: Vec<Node>, root: Item) -> Self {
        Self {
            nodes: nodes.into(),
            root,
        }
    }

    pub fn kind(&self) -> ShareableKind {
        match &self.root {
            Item::Runtime(_) => ShareableKind::Runtime,
            Item::Node(id) => match &self.nodes[*id] {
                Node::Array(_) => ShareableKind::Array,
                Node::Object(_) => ShareableKind::Map,
                Node::Buffer(_) => ShareableKind::Buffer,
                Node::Worklet { .. } => ShareableKind::Worklet,
            },
            _ => ShareableKind::Primitive,
        }
    }

    /// Number of distinct reference values captured
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Materialize the snapshot as a fresh live value in the current context
    pub fn unpack(&self) -> Value {
        let mut memo = vec![None; self.nodes.len()];
        self.unpack_item(&self.root, &mut memo)
    }

    /// Unpack a worklet snapshot; `None` if the root is not a worklet
    pub fn unpack_worklet(&self) -> Option<Worklet> {
        if self.kind() != ShareableKind::Worklet {
            return None;
        }
        match self.unpack() {
            Value::Function(f) => match f.as_ref() {
                Function::Worklet(w) => Some(w.clone()),
                Function::Host { .. } => None,
            },
            _ => None,
        }
    }

    fn unpack_item(&self, item: &Item, memo: &mut Vec<Option<Value>>) -> Value {
        match item {
            Item::Undefined => Value::Undefined,
            Item::Null => Value::Null,
            Item::Bool(b) => Value::Bool(*b),
            Item::Int(n) => Value::Int(*n),
            Item::Float(f) => Value::Float(*f),
            Item::String(s) => Value::String(s.clone()),
            Item::Runtime(handle) => Value::Runtime(handle.clone()),
            Item::Node(id) => self.unpack_node(*id, memo),
        }
    }

    fn unpack_node(&self, id: NodeId, memo: &mut Vec<Option<Value>>) -> Value {
        if let Some(value) = &memo[id] {
            return value.clone();
        }

        let value = match &self.nodes[id] {
            Node::Array(items) => {
                let values = items.iter().map(|item| self.unpack_item(item, memo)).collect();
                Value::Array(Rc::new(RefCell::new(values)))
            }
            Node::Object(fields) => {
                let fields = self.unpack_fields(fields, memo);
                Value::Object(Rc::new(RefCell::new(fields)))
            }
            Node::Buffer(bytes) => Value::buffer(bytes.clone()),
            Node::Worklet { code, closure } => {
                let bindings = self.unpack_fields(closure, memo);
                Worklet::from_parts(code.clone(), Closure::from_bindings(bindings)).into()
            }
        };

        memo[id] = Some(value.clone());
        value
    }

    fn unpack_fields(
        &self,
        fields: &[(String, Item)],
        memo: &mut Vec<Option<Value>>,
    ) -> Map<Value> {
        fields
            .iter()
            .map(|(key, item)| (key.clone(), self.unpack_item(item, memo)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_shareable_is_send() {
        assert_send_sync::<Shareable>();
    }

    #[test]
    fn test_unpack_rebuilds_shared_node_once() {
        let nodes = vec![
            Node::Array(vec![Item::Node(1), Item::Node(1)]),
            Node::Buffer(vec![7, 8]),
        ];
        let shareable = Shareable::new(nodes, Item::Node(0));
        assert_eq!(shareable.kind(), ShareableKind::Array);

        let Value::Array(items) = shareable.unpack() else {
            panic!("expected array");
        };
        let items = items.borrow();
        match (&items[0], &items[1]) {
            (Value::Buffer(a), Value::Buffer(b)) => assert!(Rc::ptr_eq(a, b)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_primitive_root() {
        let shareable = Shareable::new(Vec::new(), Item::String("hi".into()));
        assert_eq!(shareable.kind(), ShareableKind::Primitive);
        assert_eq!(shareable.unpack(), Value::from("hi"));
        assert!(shareable.unpack_worklet().is_none());
    }
}
