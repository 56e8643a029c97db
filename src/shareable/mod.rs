// src/shareable/mod.rs
//! Value cloner: turns a live value graph into a [`Shareable`]

pub mod node;

use crate::runtime::value::address;
use crate::worklet::{Function, Worklet};
use crate::Value;
use ahash::HashMap;
use node::{Item, Node, NodeId};
use thiserror::Error;

pub use node::{Shareable, ShareableKind};

/// Errors raised while cloning a value for transfer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloneError {
    #[error("function `{name}` is not a worklet and cannot be moved to another runtime")]
    NonWorkletFunction { name: String },

    #[error("value of kind `{kind}` cannot be moved to another runtime")]
    Unsupported { kind: String },

    #[error("cyclic {kind} cannot be cloned")]
    Cycle { kind: &'static str },
}

/// Deep-copy `value` into a transfer-safe snapshot
pub fn clone_recursive(value: &Value) -> Result<Shareable, CloneError> {
    let mut cloner = Cloner::default();
    let root = cloner.visit(value)?;
    Ok(cloner.finish(root))
}

/// Clone a worklet together with everything its closure captured
pub fn clone_worklet(worklet: &Worklet) -> Result<Shareable, CloneError> {
    let mut cloner = Cloner::default();
    let id = cloner.reserve();
    let node = cloner.worklet(worklet)?;
    cloner.slots[id] = Some(node);
    Ok(cloner.finish(Item::Node(id)))
}

/// Depth-first visitor. `seen` maps the address of every reference value
/// to its node; a node whose slot is still empty is being visited, so
/// meeting it again means the graph has a cycle.
#[derive(Default)]
struct Cloner {
    slots: Vec<Option<Node>>,
    seen: HashMap<usize, NodeId>,
}

impl Cloner {
    fn visit(&mut self, value: &Value) -> Result<Item, CloneError> {
        match value {
            Value::Undefined => Ok(Item::Undefined),
            Value::Null => Ok(Item::Null),
            Value::Bool(b) => Ok(Item::Bool(*b)),
            Value::Int(n) => Ok(Item::Int(*n)),
            Value::Float(f) => Ok(Item::Float(*f)),
            Value::String(s) => Ok(Item::String(s.clone())),
            Value::Runtime(handle) => Ok(Item::Runtime(handle.clone())),
            Value::Opaque(o) => Err(CloneError::Unsupported {
                kind: o.type_name().to_string(),
            }),
            Value::Buffer(bytes) => self.reference(address(bytes), "buffer", |_| {
                Ok(Node::Buffer(bytes.borrow().clone()))
            }),
            Value::Array(items) => self.reference(address(items), "array", |cloner| {
                let items = items
                    .borrow()
                    .iter()
                    .map(|item| cloner.visit(item))
                    .collect::<Result<Vec<_>, CloneError>>()?;
                Ok(Node::Array(items))
            }),
            Value::Object(fields) => self.reference(address(fields), "object", |cloner| {
                let fields = fields
                    .borrow()
                    .iter()
                    .map(|(key, field)| Ok((key.clone(), cloner.visit(field)?)))
                    .collect::<Result<Vec<_>, CloneError>>()?;
                Ok(Node::Object(fields))
            }),
            Value::Function(function) => match function.as_ref() {
                Function::Worklet(worklet) => {
                    self.reference(address(function), "worklet", |cloner| cloner.worklet(worklet))
                }
                Function::Host { name, .. } => Err(CloneError::NonWorkletFunction {
                    name: name.clone(),
                }),
            },
        }
    }

    fn reference(
        &mut self,
        key: usize,
        kind: &'static str,
        build: impl FnOnce(&mut Self) -> Result<Node, CloneError>,
    ) -> Result<Item, CloneError> {
        if let Some(&id) = self.seen.get(&key) {
            return match self.slots[id] {
                Some(_) => Ok(Item::Node(id)),
                None => Err(CloneError::Cycle { kind }),
            };
        }

        let id = self.reserve();
        self.seen.insert(key, id);
        let node = build(self)?;
        self.slots[id] = Some(node);
        Ok(Item::Node(id))
    }

    fn worklet(&mut self, worklet: &Worklet) -> Result<Node, CloneError> {
        let closure = worklet
            .closure()
            .iter()
            .map(|(name, captured)| Ok((name.clone(), self.visit(captured)?)))
            .collect::<Result<Vec<_>, CloneError>>()?;

        Ok(Node::Worklet {
            code: worklet.code().clone(),
            closure,
        })
    }

    fn reserve(&mut self) -> NodeId {
        self.slots.push(None);
        self.slots.len() - 1
    }

    fn finish(self, root: Item) -> Shareable {
        // Every reserved slot is filled once its visit succeeds
        let nodes: Vec<Node> = self.slots.into_iter().flatten().collect();
        Shareable::new(nodes, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Scope;
    use crate::worklet::{Closure, Thrown};
    use crate::runtime::value::Opaque;
    use std::rc::Rc;

    fn noop(_: &mut Scope<'_>, _: &Closure, _: &[Value]) -> Result<Value, Thrown> {
        Ok(Value::Undefined)
    }

    #[test]
    fn test_primitives_copied() {
        for value in [
            Value::Undefined,
            Value::Null,
            Value::Bool(true),
            Value::Int(-3),
            Value::Float(1.5),
            Value::from("text"),
        ] {
            let shareable = clone_recursive(&value).unwrap();
            assert_eq!(shareable.kind(), ShareableKind::Primitive);
            assert_eq!(shareable.unpack(), value);
        }
    }

    #[test]
    fn test_buffer_is_copied_not_aliased() {
        let source = Value::buffer(vec![1u8, 2, 3]);
        let shareable = clone_recursive(&source).unwrap();

        if let Value::Buffer(bytes) = &source {
            bytes.borrow_mut()[0] = 99;
        }

        assert_eq!(shareable.unpack(), Value::buffer(vec![1u8, 2, 3]));
        let unpacked = shareable.unpack();
        if let Value::Buffer(bytes) = &unpacked {
            bytes.borrow_mut().push(4);
        }
        assert_eq!(shareable.unpack(), Value::buffer(vec![1u8, 2, 3]));
    }

    #[test]
    fn test_object_keeps_insertion_order() {
        let source = Value::object([
            ("zeta", Value::Int(1)),
            ("alpha", Value::Int(2)),
            ("mid", Value::from(vec![1, 2, 3])),
        ]);
        let unpacked = clone_recursive(&source).unwrap().unpack();
        assert_eq!(unpacked, source);

        let Value::Object(map) = unpacked else {
            panic!("expected object");
        };
        let keys: Vec<_> = map.borrow().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_shared_substructure_cloned_once() {
        let shared = Value::object([("n", Value::Int(1))]);
        let source = Value::array(vec![shared.clone(), shared.clone(), Value::array(vec![shared])]);

        let shareable = clone_recursive(&source).unwrap();
        assert_eq!(shareable.node_count(), 3);

        let Value::Array(items) = shareable.unpack() else {
            panic!("expected array");
        };
        let items = items.borrow();
        let first = items[0].identity();
        assert_eq!(first, items[1].identity());
        match &items[2] {
            Value::Array(inner) => assert_eq!(first, inner.borrow()[0].identity()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cycle_rejected() {
        let items = Rc::new(std::cell::RefCell::new(Vec::new()));
        let source = Value::Array(items.clone());
        items.borrow_mut().push(source.clone());

        assert_eq!(clone_recursive(&source).unwrap_err(), CloneError::Cycle { kind: "array" });

        // break the cycle so the test does not leak
        items.borrow_mut().clear();
    }

    #[test]
    fn test_host_function_rejected() {
        let f: Value = Function::host("log", |_| Ok(Value::Undefined)).into();
        let nested = Value::object([("callback", f)]);
        assert_eq!(
            clone_recursive(&nested).unwrap_err(),
            CloneError::NonWorkletFunction { name: "log".into() }
        );
    }

    #[test]
    fn test_opaque_rejected() {
        let err = clone_recursive(&Value::Opaque(Opaque::new(5u32))).unwrap_err();
        assert!(matches!(err, CloneError::Unsupported { kind } if kind == "u32"));
    }

    #[test]
    fn test_worklet_closure_is_snapshotted() {
        let counts = Value::from(vec![1, 2]);
        let worklet = Worklet::new("noop", noop).capture("counts", counts.clone());

        let shareable = clone_worklet(&worklet).unwrap();
        assert_eq!(shareable.kind(), ShareableKind::Worklet);

        if let Value::Array(items) = &counts {
            items.borrow_mut().push(Value::Int(3));
        }

        let unpacked = shareable.unpack_worklet().unwrap();
        assert_eq!(unpacked.name(), "noop");
        assert_eq!(unpacked.closure().get("counts"), Value::from(vec![1, 2]));
    }

    #[test]
    fn test_worklet_capturing_host_function_rejected() {
        let host: Value = Function::host("print", |_| Ok(Value::Undefined)).into();
        let worklet = Worklet::new("noop", noop).capture("print", host);
        assert!(matches!(
            clone_worklet(&worklet),
            Err(CloneError::NonWorkletFunction { .. })
        ));
    }
}
