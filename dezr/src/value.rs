//! Value
//!
//! Values are vertices of the graph. A [`Value`] is a cheap handle, cloning
//! it refers to the same vertex, with the same payload and gradient.

use crate::error::DezrError;
use crate::functions as F;
use crate::graph::{release_from_drop, with_graph, OpId, ValueId};
use crate::Payload;
use ndarray::{Array, ArrayD, Dimension, IxDyn};
use std::fmt::{Debug, Display};
use std::marker::PhantomData;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Graph vertex wrapping a payload, its gradient and the operation that created it.
///
/// Values are bound to the thread that created them.
pub struct Value {
    pub(crate) id: ValueId,
    _not_send: PhantomData<*const ()>,
}

/// Snapshot of the operation that created a value
#[derive(Debug)]
pub struct Creator {
    /// Name of the primitive
    pub name: &'static str,
    /// Highest generation among inputs
    pub generation: usize,
    /// Inputs of the operation
    pub inputs: Vec<Value>,
}

impl Clone for Value {
    fn clone(&self) -> Self {
        with_graph(|g| g.retain(self.id));
        Value::from_id(self.id)
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        release_from_drop(self.id);
    }
}

impl Value {
    /// Handle for vertex that was already retained on its behalf
    pub(crate) fn from_id(id: ValueId) -> Self {
        Value { id, _not_send: PhantomData }
    }

    fn push(data: Option<Payload>, name: Option<Box<str>>) -> Self {
        Value::from_id(with_graph(|g| g.push_value(data, name)))
    }

    /// Leaf value with payload
    #[must_use]
    pub fn new(data: Payload) -> Self {
        Value::push(Some(data), None)
    }

    /// Named leaf value
    #[must_use]
    pub fn named(data: Payload, name: &str) -> Self {
        Value::push(Some(data), Some(name.into()))
    }

    /// Leaf value without payload, to be filled with [`set_data`](Value::set_data)
    /// once its shape is known
    #[must_use]
    pub fn placeholder() -> Self {
        Value::push(None, None)
    }

    /// Named placeholder
    #[must_use]
    pub fn named_placeholder(name: &str) -> Self {
        Value::push(None, Some(name.into()))
    }

    /// Leaf value from flat row major data
    pub fn from_shape_vec(shape: impl Into<Vec<usize>>, data: Vec<f64>) -> Result<Self, DezrError> {
        let shape = shape.into();
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(DezrError::construction_error(format!(
                "shape {shape:?} needs {numel} elements, but {} were given",
                data.len()
            )));
        }
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map(Value::new)
            .map_err(|e| DezrError::construction_error(format!("can not build {shape:?}: {e}")))
    }

    /// Copy of payload
    #[must_use]
    pub fn data(&self) -> Option<Payload> {
        with_graph(|g| g.values[self.id].data.clone())
    }

    /// The only element of payload, None if there is not exactly one
    #[must_use]
    pub fn item(&self) -> Option<f64> {
        with_graph(|g| match &g.values[self.id].data {
            Some(data) if data.len() == 1 => data.iter().next().copied(),
            _ => None,
        })
    }

    /// Replace payload
    pub fn set_data(&self, data: Payload) {
        with_graph(|g| g.values[self.id].data = Some(data));
    }

    /// Modify payload in place, does nothing for placeholders.
    /// This is how optimizers update parameters.
    pub fn update_data(&self, f: impl FnOnce(&mut Payload)) {
        with_graph(|g| {
            if let Some(data) = &mut g.values[self.id].data {
                f(data);
            }
        });
    }

    /// Shape of payload, empty for placeholders
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        with_graph(|g| g.values[self.id].data.as_ref().map_or_else(Vec::new, |d| d.shape().to_vec()))
    }

    /// Number of axes
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Number of elements, 0 for placeholders
    #[must_use]
    pub fn size(&self) -> usize {
        with_graph(|g| g.values[self.id].data.as_ref().map_or(0, |d| d.len()))
    }

    /// Length of the first axis, 1 for scalars
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or_else(|| self.size().min(1))
    }

    /// Is payload absent or without elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Name given at construction
    #[must_use]
    pub fn name(&self) -> Option<String> {
        with_graph(|g| g.values[self.id].name.as_deref().map(String::from))
    }

    /// Rename
    pub fn set_name(&self, name: &str) {
        with_graph(|g| g.values[self.id].name = Some(name.into()));
    }

    /// Gradient accumulated by backward
    #[must_use]
    pub fn grad(&self) -> Option<Value> {
        with_graph(|g| {
            let grad = g.values[self.id].grad?;
            g.retain(grad);
            Some(Value::from_id(grad))
        })
    }

    /// Replace gradient
    pub fn set_grad(&self, grad: Option<Value>) {
        with_graph(|g| {
            let grad = grad.as_ref().map(|grad| {
                g.retain(grad.id);
                grad.id
            });
            g.set_grad(self.id, grad);
        });
    }

    /// Forget gradient
    pub fn cleargrad(&self) {
        with_graph(|g| g.set_grad(self.id, None));
    }

    /// Depth in graph, 0 for leaves
    #[must_use]
    pub fn generation(&self) -> usize {
        with_graph(|g| g.values[self.id].generation)
    }

    pub(crate) fn creator_id(&self) -> Option<OpId> {
        with_graph(|g| g.values[self.id].creator)
    }

    /// Operation that created this value, None for leaves
    #[must_use]
    pub fn creator(&self) -> Option<Creator> {
        with_graph(|g| {
            let f = g.values[self.id].creator?;
            let (name, generation, inputs) = {
                let node = &g.ops[f];
                (node.name, node.generation, node.inputs.clone())
            };
            for &x in &inputs {
                g.retain(x);
            }
            Some(Creator { name, generation, inputs: inputs.into_iter().map(Value::from_id).collect() })
        })
    }

    /// New leaf with a copy of payload, cut off from the graph
    #[must_use]
    pub fn detach(&self) -> Value {
        Value::push(self.data(), None)
    }

    /// Are both handles the same vertex
    #[must_use]
    pub fn is_same(&self, other: &Value) -> bool {
        self.id == other.id
    }

    /// x^c
    pub fn try_pow(&self, c: f64) -> Result<Value, DezrError> {
        F::pow(self, c)
    }

    /// x^c
    ///
    /// # Panics
    /// If payload is absent
    #[must_use]
    pub fn pow(&self, c: f64) -> Value {
        F::pow(self, c).unwrap_or_else(|e| panic!("{e}"))
    }

    /// See [`functions::reshape`](crate::functions::reshape)
    pub fn reshape(&self, shape: &[usize]) -> Result<Value, DezrError> {
        F::reshape(self, shape)
    }

    /// See [`functions::transpose`](crate::functions::transpose)
    pub fn transpose(&self, axes: &[usize]) -> Result<Value, DezrError> {
        F::transpose(self, Some(axes))
    }

    /// Transpose with reversed axes
    #[allow(non_snake_case)]
    pub fn T(&self) -> Result<Value, DezrError> {
        F::transpose(self, None)
    }

    /// See [`functions::sum`](crate::functions::sum)
    pub fn sum(&self, axes: Option<&[isize]>, keepdims: bool) -> Result<Value, DezrError> {
        F::sum(self, axes, keepdims)
    }

    /// See [`functions::sum_to`](crate::functions::sum_to)
    pub fn sum_to(&self, shape: &[usize]) -> Result<Value, DezrError> {
        F::sum_to(self, shape)
    }

    /// See [`functions::broadcast_to`](crate::functions::broadcast_to)
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Value, DezrError> {
        F::broadcast_to(self, shape)
    }

    /// See [`functions::matmul`](crate::functions::matmul)
    pub fn matmul(&self, w: &Value) -> Result<Value, DezrError> {
        F::matmul(self, w)
    }

    /// Fallible +
    pub fn try_add(&self, rhs: impl Into<Value>) -> Result<Value, DezrError> {
        F::add(self, &rhs.into())
    }

    /// Fallible -
    pub fn try_sub(&self, rhs: impl Into<Value>) -> Result<Value, DezrError> {
        F::sub(self, &rhs.into())
    }

    /// Fallible *
    pub fn try_mul(&self, rhs: impl Into<Value>) -> Result<Value, DezrError> {
        F::mul(self, &rhs.into())
    }

    /// Fallible /
    pub fn try_div(&self, rhs: impl Into<Value>) -> Result<Value, DezrError> {
        F::div(self, &rhs.into())
    }
}

macro_rules! unary_method {
    ($name:ident, $doc:literal) => {
        impl Value {
            #[doc = $doc]
            ///
            /// # Panics
            /// If payload is absent
            #[must_use]
            pub fn $name(&self) -> Value {
                F::$name(self).unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

unary_method!(sin, "Elementwise sine");
unary_method!(cos, "Elementwise cosine");
unary_method!(tanh, "Elementwise hyperbolic tangent");
unary_method!(exp, "Elementwise e^x");
unary_method!(log, "Elementwise natural logarithm");
unary_method!(sigmoid, "Elementwise logistic sigmoid");

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::new(ArrayD::from_elem(IxDyn(&[]), value))
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(value: [f64; N]) -> Self {
        Value::new(Array::from(value.to_vec()).into_dyn())
    }
}

impl<const N: usize, const M: usize> From<[[f64; M]; N]> for Value {
    fn from(value: [[f64; M]; N]) -> Self {
        Value::new(Array::from(value.to_vec()).into_dyn())
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::new(Array::from(value).into_dyn())
    }
}

impl<D: Dimension> From<Array<f64, D>> for Value {
    fn from(value: Array<f64, D>) -> Self {
        Value::new(value.into_dyn())
    }
}

impl TryFrom<Vec<Vec<f64>>> for Value {
    type Error = DezrError;
    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != cols) {
            return Err(DezrError::construction_error(format!(
                "nested data is ragged, row 0 has {cols} elements but row {i} has {}",
                row.len()
            )));
        }
        let shape = [rows.len(), cols];
        Value::from_shape_vec(shape, rows.into_iter().flatten().collect())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.data() {
            Some(data) => {
                let data = data.to_string().replace('\n', &format!("\n{}", " ".repeat(9)));
                f.write_fmt(format_args!("variable({data})"))
            }
            None => f.write_str("variable(None)"),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("shape", &self.shape())
            .field("generation", &self.generation())
            .finish()
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, $func:ident) => {
        impl<IT: Into<Value>> $trait<IT> for &Value {
            type Output = Value;
            fn $method(self, rhs: IT) -> Self::Output {
                F::$func(self, &rhs.into()).unwrap_or_else(|e| panic!("{e}"))
            }
        }

        impl<IT: Into<Value>> $trait<IT> for Value {
            type Output = Value;
            fn $method(self, rhs: IT) -> Self::Output {
                F::$func(&self, &rhs.into()).unwrap_or_else(|e| panic!("{e}"))
            }
        }

        impl $trait<&Value> for f64 {
            type Output = Value;
            fn $method(self, rhs: &Value) -> Self::Output {
                F::$func(&Value::from(self), rhs).unwrap_or_else(|e| panic!("{e}"))
            }
        }

        impl $trait<Value> for f64 {
            type Output = Value;
            fn $method(self, rhs: Value) -> Self::Output {
                F::$func(&Value::from(self), &rhs).unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

binary_op!(Add, add, add);
binary_op!(Sub, sub, sub);
binary_op!(Mul, mul, mul);
binary_op!(Div, div, div);

impl Neg for &Value {
    type Output = Value;
    fn neg(self) -> Self::Output {
        F::neg(self).unwrap_or_else(|e| panic!("{e}"))
    }
}

impl Neg for Value {
    type Output = Value;
    fn neg(self) -> Self::Output {
        F::neg(&self).unwrap_or_else(|e| panic!("{e}"))
    }
}
