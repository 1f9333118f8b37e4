//! Reverse pass over the recorded graph.

use crate::config::{ConfigGuard, Flag};
use crate::error::DezrError;
use crate::graph::{with_graph, OpId};
use crate::op::BackwardContext;
use crate::value::Value;
use crate::Payload;
use std::collections::{BTreeSet, BinaryHeap};

/// Options of [`Value::backward_with`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackwardOptions {
    /// Keep gradients of every value that is an output of some operation.
    /// When false, only leaves keep their gradient, this includes the value
    /// backward was called on if it has a creator.
    pub retain_grad: bool,
    /// Record operations performed by backward, so that gradients can be
    /// differentiated again.
    ///
    /// The gradient of a value then depends on the value itself, which is a
    /// reference cycle. Call [`Value::cleargrad`] on the inputs once their
    /// gradients are no longer needed, otherwise the whole recorded graph
    /// stays in memory after every handle is dropped.
    pub create_graph: bool,
}

impl BackwardOptions {
    /// Set retain_grad
    #[must_use]
    pub fn retain_grad(mut self, retain_grad: bool) -> Self {
        self.retain_grad = retain_grad;
        self
    }

    /// Set create_graph
    #[must_use]
    pub fn create_graph(mut self, create_graph: bool) -> Self {
        self.create_graph = create_graph;
        self
    }
}

/// Operation waiting for its backward. Ordered by generation, ties are broken
/// by scheduling order so that the walk is deterministic.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    generation: usize,
    seq: usize,
    op: OpId,
}

#[derive(Default)]
struct Schedule {
    heap: BinaryHeap<Pending>,
    seen: BTreeSet<OpId>,
}

impl Schedule {
    fn push(&mut self, op: Option<OpId>) {
        let Some(op) = op else { return };
        if self.seen.insert(op) {
            let generation = with_graph(|g| g.ops[op].generation);
            let seq = self.seen.len();
            self.heap.push(Pending { generation, seq, op });
        }
    }
}

impl Value {
    /// Compute gradients of every value this one depends on, with default
    /// [`BackwardOptions`]
    pub fn backward(&self) -> Result<(), DezrError> {
        self.backward_with(BackwardOptions::default())
    }

    /// Compute gradients of every value this one depends on.
    ///
    /// If this value has no gradient yet, it is seeded with ones of its shape.
    /// Operations are processed from the highest generation down, each one
    /// exactly once, so that every output gradient is complete before it is
    /// propagated further. Gradients reaching the same value are summed.
    pub fn backward_with(&self, options: BackwardOptions) -> Result<(), DezrError> {
        let seed = with_graph(|g| {
            let node = &g.values[self.id];
            if node.grad.is_some() {
                return Ok(None);
            }
            let data = node.data.as_ref().ok_or(DezrError::MissingPayload { op: "Backward" })?;
            Ok(Some(Payload::ones(data.raw_dim())))
        })?;
        if let Some(seed) = seed {
            self.set_grad(Some(Value::new(seed)));
        }
        log::debug!("Backward from value {} with {options:?}", self.id);

        let mut schedule = Schedule::default();
        schedule.push(self.creator_id());
        let mut processed = 0;
        while let Some(Pending { op: f, .. }) = schedule.heap.pop() {
            let (op, name, inputs, outputs, output_shapes) = with_graph(|g| {
                let node = &mut g.ops[f];
                let op = node.op.take();
                let (name, inputs, outputs, output_shapes) =
                    (node.name, node.inputs.clone(), node.outputs.clone(), node.output_shapes.clone());
                for &x in inputs.iter().chain(outputs.iter().flatten()) {
                    g.retain(x);
                }
                (op, name, inputs, outputs, output_shapes)
            });
            let inputs: Vec<Value> = inputs.into_iter().map(Value::from_id).collect();
            let outputs: Vec<Value> =
                outputs.into_iter().map(|y| y.map_or_else(Value::placeholder, Value::from_id)).collect();
            let Some(op) = op else {
                log::warn!("Skipping backward of {name}, it is already running");
                continue;
            };
            log::debug!("Backward of {name} (op {f})");

            let gys: Vec<Value> = outputs
                .iter()
                .zip(&output_shapes)
                .map(|(y, shape)| y.grad().unwrap_or_else(|| Value::new(Payload::zeros(shape.as_slice()))))
                .collect();

            let result = {
                let _guard = ConfigGuard::new(Flag::EnableBackprop, options.create_graph);
                op.backward(&BackwardContext { inputs: &inputs, outputs: &outputs }, &gys)
                    .and_then(|gxs| {
                        if gxs.len() != inputs.len() {
                            return Err(DezrError::GradientArity {
                                op: name,
                                expected: inputs.len(),
                                found: gxs.len(),
                            });
                        }
                        for (x, gx) in inputs.iter().zip(gxs) {
                            let gx = match x.grad() {
                                Some(old) => old.try_add(gx)?,
                                None => gx,
                            };
                            x.set_grad(Some(gx));
                        }
                        Ok(())
                    })
            };
            with_graph(|g| g.ops[f].op = Some(op));
            result?;

            for x in &inputs {
                schedule.push(x.creator_id());
            }
            if !options.retain_grad {
                for y in &outputs {
                    y.cleargrad();
                }
            }
            processed += 1;
        }
        log::debug!("Backward from value {} finished, {processed} operations", self.id);
        Ok(())
    }
}
