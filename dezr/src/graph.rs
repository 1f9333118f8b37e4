//! Thread local arena holding every value vertex and operation node.
//!
//! Reference counts:
//! - a value is retained by each [`Value`](crate::Value) handle, by each
//!   operation that consumed it and by each value whose gradient it is,
//! - an operation is retained by each of its outputs that is still alive.
//!
//! Operations only weakly refer to their outputs, so there are no cycles in
//! a graph built by forward evaluation. When a value is freed it unlinks
//! itself from its creator.

use crate::op::Op;
use crate::slab::{Id, Slab};
use crate::Payload;
use std::cell::RefCell;

pub(crate) type ValueId = Id;
pub(crate) type OpId = Id;

pub(crate) struct ValueNode {
    pub(crate) rc: u32,
    pub(crate) data: Option<Payload>,
    pub(crate) name: Option<Box<str>>,
    pub(crate) grad: Option<ValueId>,
    pub(crate) creator: Option<OpId>,
    pub(crate) generation: usize,
}

pub(crate) struct OpNode {
    pub(crate) rc: u32,
    pub(crate) name: &'static str,
    /// None while its backward is running
    pub(crate) op: Option<Op>,
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) outputs: Vec<Option<ValueId>>,
    /// Shapes of outputs, for gradients of outputs that were already freed
    pub(crate) output_shapes: Vec<Vec<usize>>,
    pub(crate) generation: usize,
}

enum Release {
    Value(ValueId),
    Op(OpId),
}

pub(crate) struct Graph {
    pub(crate) values: Slab<ValueNode>,
    pub(crate) ops: Slab<OpNode>,
    /// Operations freed by release. User primitives may own values, so they
    /// are dropped only after the graph is no longer borrowed.
    freed: Vec<Op>,
}

thread_local! {
    static GRAPH: RefCell<Graph> = const { RefCell::new(Graph::new()) };
}

pub(crate) fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
    let (r, freed) = GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        let r = f(&mut g);
        (r, std::mem::take(&mut g.freed))
    });
    drop(freed);
    r
}

/// Release called from drop. Never panics, if the graph is not accessible
/// the value is leaked.
pub(crate) fn release_from_drop(x: ValueId) {
    let freed = GRAPH
        .try_with(|g| match g.try_borrow_mut() {
            Ok(mut g) => {
                g.release(x);
                std::mem::take(&mut g.freed)
            }
            Err(_) => {
                log::warn!("Value {x} dropped while the graph is borrowed, it will be leaked.");
                Vec::new()
            }
        })
        .unwrap_or_default();
    drop(freed);
}

impl Graph {
    const fn new() -> Self {
        Self { values: Slab::new(), ops: Slab::new(), freed: Vec::new() }
    }

    pub(crate) fn push_value(&mut self, data: Option<Payload>, name: Option<Box<str>>) -> ValueId {
        self.values.push(ValueNode { rc: 1, data, name, grad: None, creator: None, generation: 0 })
    }

    pub(crate) fn retain(&mut self, x: ValueId) {
        let node = &mut self.values[x];
        node.rc = node.rc.checked_add(1).expect("value reference count overflow");
    }

    pub(crate) fn release(&mut self, x: ValueId) {
        let mut stack = Vec::with_capacity(10);
        stack.push(Release::Value(x));
        while let Some(r) = stack.pop() {
            match r {
                Release::Value(x) => {
                    let node = &mut self.values[x];
                    node.rc -= 1;
                    if node.rc != 0 {
                        continue;
                    }
                    let Some(node) = self.values.remove(x) else { continue };
                    if let Some(grad) = node.grad {
                        stack.push(Release::Value(grad));
                    }
                    if let Some(f) = node.creator {
                        for output in &mut self.ops[f].outputs {
                            if *output == Some(x) {
                                *output = None;
                            }
                        }
                        stack.push(Release::Op(f));
                    }
                }
                Release::Op(f) => {
                    let node = &mut self.ops[f];
                    node.rc -= 1;
                    if node.rc != 0 {
                        continue;
                    }
                    if let Some(OpNode { inputs, op, .. }) = self.ops.remove(f) {
                        stack.extend(inputs.into_iter().map(Release::Value));
                        self.freed.extend(op);
                    }
                }
            }
        }
    }

    /// Link freshly computed payloads as outputs of op.
    /// Inputs are retained by the new operation node.
    pub(crate) fn record(&mut self, op: Op, inputs: Vec<ValueId>, ys: Vec<Payload>) -> Vec<ValueId> {
        let generation = inputs.iter().map(|&x| self.values[x].generation).max().unwrap_or(0);
        for &x in &inputs {
            self.retain(x);
        }
        let name = op.name();
        let rc = u32::try_from(ys.len()).expect("too many outputs");
        let output_shapes = ys.iter().map(|y| y.shape().to_vec()).collect();
        let f = self.ops.push(OpNode {
            rc,
            name,
            op: Some(op),
            inputs,
            outputs: Vec::new(),
            output_shapes,
            generation,
        });
        let outputs: Vec<ValueId> = ys
            .into_iter()
            .map(|y| {
                self.values.push(ValueNode {
                    rc: 1,
                    data: Some(y),
                    name: None,
                    grad: None,
                    creator: Some(f),
                    generation: generation + 1,
                })
            })
            .collect();
        self.ops[f].outputs = outputs.iter().copied().map(Some).collect();
        log::trace!("Recorded {name} as op {f}, generation {generation}, outputs {outputs:?}");
        outputs
    }

    /// Replace gradient of x, grad must already be retained for x
    pub(crate) fn set_grad(&mut self, x: ValueId, grad: Option<ValueId>) {
        let old = std::mem::replace(&mut self.values[x].grad, grad);
        if let Some(old) = old {
            self.release(old);
        }
    }

    #[cfg(test)]
    pub(crate) fn live(&self) -> (usize, usize) {
        (self.values.len(), self.ops.len())
    }
}

#[cfg(test)]
pub(crate) fn live() -> (usize, usize) {
    with_graph(|g| g.live())
}
