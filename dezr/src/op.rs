//! Differentiable primitives.
//!
//! Each invocation of a primitive is one [`Op`]. Its variant carries whatever
//! the backward pass needs besides the inputs and outputs, which the graph
//! keeps for it.

use crate::error::DezrError;
use crate::functions as F;
use crate::shape;
use crate::value::Value;
use crate::Payload;
use ndarray::{ArrayD, IxDyn};

/// Inputs and outputs of the operation whose backward is running
pub struct BackwardContext<'a> {
    /// Inputs in the order they were passed to forward
    pub inputs: &'a [Value],
    /// Outputs in the order forward returned them. Outputs that were already
    /// freed are placeholders without payload.
    pub outputs: &'a [Value],
}

/// User defined differentiable primitive.
///
/// Forward works on raw payloads and must not create or read values.
/// Backward receives gradients as values and must return one gradient per
/// input, in input order. It is written with value operations, so that it is
/// itself differentiable when backward runs with
/// [`create_graph`](crate::BackwardOptions::create_graph).
///
/// Both methods have default bodies that panic, a primitive that does not
/// override them is a programming error.
pub trait Function {
    /// Name used in logs and [`Creator`](crate::Creator)
    fn name(&self) -> &'static str;

    /// Compute outputs from input payloads
    fn forward(&mut self, xs: &[&Payload]) -> Result<Vec<Payload>, DezrError> {
        let _ = xs;
        unimplemented!("{} does not implement forward", self.name())
    }

    /// Compute gradients of inputs from gradients of outputs
    fn backward(&self, ctx: &BackwardContext<'_>, gys: &[Value]) -> Result<Vec<Value>, DezrError> {
        let _ = (ctx, gys);
        unimplemented!("{} does not implement backward", self.name())
    }
}

/// Primitive operation together with the state saved by its forward
pub enum Op {
    /// Elementwise addition
    Add {
        /// Shape of first input
        x0_shape: Vec<usize>,
        /// Shape of second input
        x1_shape: Vec<usize>,
    },
    /// Elementwise subtraction
    Sub {
        /// Shape of first input
        x0_shape: Vec<usize>,
        /// Shape of second input
        x1_shape: Vec<usize>,
    },
    /// Elementwise multiplication
    Mul,
    /// Elementwise division
    Div,
    /// Negation
    Neg,
    /// Power by constant exponent
    Pow {
        /// Exponent
        c: f64,
    },
    /// Sine
    Sin,
    /// Cosine
    Cos,
    /// Hyperbolic tangent
    Tanh,
    /// Natural exponential
    Exp,
    /// Natural logarithm
    Log,
    /// Logistic sigmoid
    Sigmoid,
    /// Reshape to shape
    Reshape {
        /// Target shape
        shape: Vec<usize>,
        /// Shape of input
        x_shape: Vec<usize>,
    },
    /// Permute axes, reverse them if None
    Transpose {
        /// Permutation
        axes: Option<Vec<usize>>,
    },
    /// Expand to shape
    BroadcastTo {
        /// Target shape
        shape: Vec<usize>,
        /// Shape of input
        x_shape: Vec<usize>,
    },
    /// Sum down to shape
    SumTo {
        /// Target shape
        shape: Vec<usize>,
        /// Shape of input
        x_shape: Vec<usize>,
    },
    /// Sum along axes, all of them if None
    Sum {
        /// Normalized axes
        axes: Option<Vec<usize>>,
        /// Keep reduced axes as size 1
        keepdims: bool,
        /// Shape of input
        x_shape: Vec<usize>,
    },
    /// Matrix product of two matrices
    MatMul,
    /// Mean of squared differences
    MeanSquaredError,
    /// x·W + b, bias is optional third input
    Linear,
    /// User defined primitive
    Custom(Box<dyn Function>),
}

impl core::fmt::Debug for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Op::Pow { c } => f.write_fmt(format_args!("Pow({c})")),
            Op::Reshape { shape, .. } => f.write_fmt(format_args!("Reshape({shape:?})")),
            Op::Transpose { axes } => f.write_fmt(format_args!("Transpose({axes:?})")),
            Op::BroadcastTo { shape, .. } => f.write_fmt(format_args!("BroadcastTo({shape:?})")),
            Op::SumTo { shape, .. } => f.write_fmt(format_args!("SumTo({shape:?})")),
            Op::Sum { axes, keepdims, .. } => f.write_fmt(format_args!("Sum({axes:?}, {keepdims})")),
            op => f.write_str(op.name()),
        }
    }
}

fn binary_shape(a: &Payload, b: &Payload) -> Result<Vec<usize>, DezrError> {
    shape::broadcast_shape(a.shape(), b.shape())
}

impl Op {
    /// Name of the primitive
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Op::Add { .. } => "Add",
            Op::Sub { .. } => "Sub",
            Op::Mul => "Mul",
            Op::Div => "Div",
            Op::Neg => "Neg",
            Op::Pow { .. } => "Pow",
            Op::Sin => "Sin",
            Op::Cos => "Cos",
            Op::Tanh => "Tanh",
            Op::Exp => "Exp",
            Op::Log => "Log",
            Op::Sigmoid => "Sigmoid",
            Op::Reshape { .. } => "Reshape",
            Op::Transpose { .. } => "Transpose",
            Op::BroadcastTo { .. } => "BroadcastTo",
            Op::SumTo { .. } => "SumTo",
            Op::Sum { .. } => "Sum",
            Op::MatMul => "MatMul",
            Op::MeanSquaredError => "MeanSquaredError",
            Op::Linear => "Linear",
            Op::Custom(f) => f.name(),
        }
    }

    /// Compute output payloads, saving shapes needed by backward
    pub fn forward(&mut self, xs: &[&Payload]) -> Result<Vec<Payload>, DezrError> {
        let y = match self {
            Op::Add { x0_shape, x1_shape } => {
                binary_shape(xs[0], xs[1])?;
                *x0_shape = xs[0].shape().to_vec();
                *x1_shape = xs[1].shape().to_vec();
                xs[0] + xs[1]
            }
            Op::Sub { x0_shape, x1_shape } => {
                binary_shape(xs[0], xs[1])?;
                *x0_shape = xs[0].shape().to_vec();
                *x1_shape = xs[1].shape().to_vec();
                xs[0] - xs[1]
            }
            Op::Mul => {
                binary_shape(xs[0], xs[1])?;
                xs[0] * xs[1]
            }
            Op::Div => {
                binary_shape(xs[0], xs[1])?;
                xs[0] / xs[1]
            }
            Op::Neg => -xs[0],
            Op::Pow { c } => {
                let c = *c;
                xs[0].mapv(|v| v.powf(c))
            }
            Op::Sin => xs[0].mapv(f64::sin),
            Op::Cos => xs[0].mapv(f64::cos),
            Op::Tanh => xs[0].mapv(f64::tanh),
            Op::Exp => xs[0].mapv(f64::exp),
            Op::Log => xs[0].mapv(f64::ln),
            Op::Sigmoid => xs[0].mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Op::Reshape { shape, x_shape } => {
                *x_shape = xs[0].shape().to_vec();
                shape::reshape(xs[0], shape)?
            }
            Op::Transpose { axes } => match axes {
                Some(axes) => shape::permute(xs[0], axes)?,
                None => xs[0].t().as_standard_layout().into_owned(),
            },
            Op::BroadcastTo { shape, x_shape } => {
                *x_shape = xs[0].shape().to_vec();
                shape::broadcast_to(xs[0], shape)?
            }
            Op::SumTo { shape, x_shape } => {
                *x_shape = xs[0].shape().to_vec();
                shape::sum_to(xs[0], shape)?
            }
            Op::Sum { axes, keepdims, x_shape } => {
                *x_shape = xs[0].shape().to_vec();
                shape::sum(xs[0], axes.as_deref(), *keepdims)
            }
            Op::MatMul => shape::dot(xs[0], xs[1])?,
            Op::MeanSquaredError => {
                binary_shape(xs[0], xs[1])?;
                let diff = xs[0] - xs[1];
                let n = diff.len() as f64;
                ArrayD::from_elem(IxDyn(&[]), diff.mapv(|d| d * d).sum() / n)
            }
            Op::Linear => {
                let y = shape::dot(xs[0], xs[1])?;
                match xs.get(2) {
                    Some(b) => {
                        binary_shape(&y, b)?;
                        &y + *b
                    }
                    None => y,
                }
            }
            Op::Custom(f) => return f.forward(xs),
        };
        Ok(vec![y])
    }

    /// Compute gradients of inputs. Runs with graph recording set to
    /// whatever backward was asked for, so everything here goes through
    /// value operations.
    pub fn backward(&self, ctx: &BackwardContext<'_>, gys: &[Value]) -> Result<Vec<Value>, DezrError> {
        let inputs = ctx.inputs;
        let gy = &gys[0];
        Ok(match self {
            Op::Add { x0_shape, x1_shape } => {
                vec![F::sum_to(gy, x0_shape)?, F::sum_to(gy, x1_shape)?]
            }
            Op::Sub { x0_shape, x1_shape } => {
                let gx1 = F::neg(gy)?;
                vec![F::sum_to(gy, x0_shape)?, F::sum_to(&gx1, x1_shape)?]
            }
            Op::Mul => {
                let (x0, x1) = (&inputs[0], &inputs[1]);
                let gx0 = F::mul(gy, x1)?;
                let gx1 = F::mul(gy, x0)?;
                vec![F::sum_to(&gx0, &x0.shape())?, F::sum_to(&gx1, &x1.shape())?]
            }
            Op::Div => {
                let (x0, x1) = (&inputs[0], &inputs[1]);
                let gx0 = F::div(gy, x1)?;
                // gy * (-x0 / x1^2)
                let neg_x0 = F::neg(x0)?;
                let x1_2 = F::pow(x1, 2.0)?;
                let gx1 = F::mul(gy, &F::div(&neg_x0, &x1_2)?)?;
                vec![F::sum_to(&gx0, &x0.shape())?, F::sum_to(&gx1, &x1.shape())?]
            }
            Op::Neg => vec![F::neg(gy)?],
            Op::Pow { c } => {
                let x = &inputs[0];
                let c_x = F::mul(&F::pow(x, c - 1.0)?, &Value::from(*c))?;
                vec![F::mul(&c_x, gy)?]
            }
            Op::Sin => vec![F::mul(gy, &F::cos(&inputs[0])?)?],
            Op::Cos => vec![F::mul(gy, &F::neg(&F::sin(&inputs[0])?)?)?],
            Op::Tanh => {
                let y = &ctx.outputs[0];
                let one_minus = F::sub(&Value::from(1.0), &F::mul(y, y)?)?;
                vec![F::mul(gy, &one_minus)?]
            }
            Op::Exp => vec![F::mul(gy, &ctx.outputs[0])?],
            Op::Log => vec![F::div(gy, &inputs[0])?],
            Op::Sigmoid => {
                let y = &ctx.outputs[0];
                let one_minus = F::sub(&Value::from(1.0), y)?;
                vec![F::mul(&F::mul(gy, y)?, &one_minus)?]
            }
            Op::Reshape { x_shape, .. } => vec![F::reshape(gy, x_shape)?],
            Op::Transpose { axes } => {
                let inv = axes.as_deref().map(shape::argsort);
                vec![F::transpose(gy, inv.as_deref())?]
            }
            Op::BroadcastTo { x_shape, .. } => vec![F::sum_to(gy, x_shape)?],
            Op::SumTo { x_shape, .. } => vec![F::broadcast_to(gy, x_shape)?],
            Op::Sum { axes, keepdims, x_shape } => {
                let axes: Option<Vec<isize>> =
                    axes.as_ref().map(|axes| axes.iter().map(|&a| a as isize).collect());
                let shape = shape::reshape_sum_backward(&gy.shape(), x_shape, axes.as_deref(), *keepdims)?;
                let gy = F::reshape(gy, &shape)?;
                vec![F::broadcast_to(&gy, x_shape)?]
            }
            Op::MatMul => {
                let (x, w) = (&inputs[0], &inputs[1]);
                let gx = F::matmul(gy, &F::transpose(w, None)?)?;
                let gw = F::matmul(&F::transpose(x, None)?, gy)?;
                vec![gx, gw]
            }
            Op::MeanSquaredError => {
                let (x0, x1) = (&inputs[0], &inputs[1]);
                let diff = F::sub(x0, x1)?;
                let scale = Value::from(2.0 / diff.size() as f64);
                let gx0 = F::mul(&F::mul(gy, &diff)?, &scale)?;
                let gx1 = F::neg(&gx0)?;
                vec![F::sum_to(&gx0, &x0.shape())?, F::sum_to(&gx1, &x1.shape())?]
            }
            Op::Linear => {
                let (x, w) = (&inputs[0], &inputs[1]);
                let gx = F::matmul(gy, &F::transpose(w, None)?)?;
                let gw = F::matmul(&F::transpose(x, None)?, gy)?;
                let mut gxs = vec![gx, gw];
                if let Some(b) = inputs.get(2) {
                    gxs.push(F::sum_to(gy, &b.shape())?);
                }
                gxs
            }
            Op::Custom(f) => return f.backward(ctx, gys),
        })
    }
}
