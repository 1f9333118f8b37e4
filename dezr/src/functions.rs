//! Every primitive as a fallible function of values.
//!
//! Shape changing functions return their input unchanged, without adding a
//! node to the graph, when the input already has the requested shape.

use crate::error::DezrError;
use crate::function::call1;
use crate::op::Op;
use crate::shape;
use crate::value::Value;

/// x0 + x1 with broadcasting
pub fn add(x0: &Value, x1: &Value) -> Result<Value, DezrError> {
    call1(Op::Add { x0_shape: Vec::new(), x1_shape: Vec::new() }, &[x0, x1])
}

/// x0 - x1 with broadcasting
pub fn sub(x0: &Value, x1: &Value) -> Result<Value, DezrError> {
    call1(Op::Sub { x0_shape: Vec::new(), x1_shape: Vec::new() }, &[x0, x1])
}

/// x0 * x1 with broadcasting
pub fn mul(x0: &Value, x1: &Value) -> Result<Value, DezrError> {
    call1(Op::Mul, &[x0, x1])
}

/// x0 / x1 with broadcasting
pub fn div(x0: &Value, x1: &Value) -> Result<Value, DezrError> {
    call1(Op::Div, &[x0, x1])
}

/// -x
pub fn neg(x: &Value) -> Result<Value, DezrError> {
    call1(Op::Neg, &[x])
}

/// x to the power of constant c
pub fn pow(x: &Value, c: f64) -> Result<Value, DezrError> {
    call1(Op::Pow { c }, &[x])
}

/// Elementwise sine
pub fn sin(x: &Value) -> Result<Value, DezrError> {
    call1(Op::Sin, &[x])
}

/// Elementwise cosine
pub fn cos(x: &Value) -> Result<Value, DezrError> {
    call1(Op::Cos, &[x])
}

/// Elementwise hyperbolic tangent
pub fn tanh(x: &Value) -> Result<Value, DezrError> {
    call1(Op::Tanh, &[x])
}

/// Elementwise e^x
pub fn exp(x: &Value) -> Result<Value, DezrError> {
    call1(Op::Exp, &[x])
}

/// Elementwise natural logarithm
pub fn log(x: &Value) -> Result<Value, DezrError> {
    call1(Op::Log, &[x])
}

/// Elementwise 1 / (1 + e^-x)
pub fn sigmoid(x: &Value) -> Result<Value, DezrError> {
    call1(Op::Sigmoid, &[x])
}

/// Reshape x, the number of elements must not change
pub fn reshape(x: &Value, shape: &[usize]) -> Result<Value, DezrError> {
    if x.shape() == shape {
        return Ok(x.clone());
    }
    call1(Op::Reshape { shape: shape.to_vec(), x_shape: Vec::new() }, &[x])
}

/// Permute axes of x. Without axes their order is reversed.
pub fn transpose(x: &Value, axes: Option<&[usize]>) -> Result<Value, DezrError> {
    if let Some(axes) = axes {
        shape::check_permutation(axes, x.ndim())?;
    }
    call1(Op::Transpose { axes: axes.map(<[usize]>::to_vec) }, &[x])
}

/// Expand x to shape by prepending axes and replicating size 1 axes
pub fn broadcast_to(x: &Value, shape: &[usize]) -> Result<Value, DezrError> {
    if x.shape() == shape {
        return Ok(x.clone());
    }
    call1(Op::BroadcastTo { shape: shape.to_vec(), x_shape: Vec::new() }, &[x])
}

/// Sum x down to shape, adjoint of [`broadcast_to`]
pub fn sum_to(x: &Value, shape: &[usize]) -> Result<Value, DezrError> {
    if x.shape() == shape {
        return Ok(x.clone());
    }
    call1(Op::SumTo { shape: shape.to_vec(), x_shape: Vec::new() }, &[x])
}

/// Sum along axes, over everything when axes is None.
/// Negative axes count from the last one.
pub fn sum(x: &Value, axes: Option<&[isize]>, keepdims: bool) -> Result<Value, DezrError> {
    let axes = axes.map(|axes| shape::normalize_axes(axes, x.ndim())).transpose()?;
    call1(Op::Sum { axes, keepdims, x_shape: Vec::new() }, &[x])
}

/// Matrix product
pub fn matmul(x: &Value, w: &Value) -> Result<Value, DezrError> {
    call1(Op::MatMul, &[x, w])
}

/// Mean over all elements of (x0 - x1)^2
pub fn mean_squared_error(x0: &Value, x1: &Value) -> Result<Value, DezrError> {
    call1(Op::MeanSquaredError, &[x0, x1])
}

/// x·w + b as one operation
pub fn linear(x: &Value, w: &Value, b: Option<&Value>) -> Result<Value, DezrError> {
    match b {
        Some(b) => call1(Op::Linear, &[x, w, b]),
        None => call1(Op::Linear, &[x, w]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn same_shape_is_identity_without_node() -> Result<(), DezrError> {
        let x = Value::from([[1., 2.], [3., 4.]]);
        let y = broadcast_to(&x, &[2, 2])?;
        assert!(y.creator().is_none());
        assert!(y.is_same(&x));
        let y = sum_to(&x, &[2, 2])?;
        assert!(y.creator().is_none());
        let y = reshape(&x, &[2, 2])?;
        assert!(y.creator().is_none());
        Ok(())
    }

    #[test]
    fn broadcast_to_backward_sums() -> Result<(), DezrError> {
        let x = Value::from([1., 2., 3.]);
        let y = broadcast_to(&x, &[2, 3])?;
        y.backward()?;
        assert_eq!(x.grad().unwrap().data().unwrap(), array![2., 2., 2.].into_dyn());
        Ok(())
    }

    #[test]
    fn sum_to_backward_broadcasts() -> Result<(), DezrError> {
        let x = Value::from([[1., 2., 3.], [4., 5., 6.]]);
        let y = sum_to(&x, &[1, 3])?;
        assert_eq!(y.data().unwrap(), array![[5., 7., 9.]].into_dyn());
        y.backward()?;
        assert_eq!(x.grad().unwrap().data().unwrap(), array![[1., 1., 1.], [1., 1., 1.]].into_dyn());
        Ok(())
    }

    #[test]
    fn sum_backward_with_and_without_keepdims() -> Result<(), DezrError> {
        let x = Value::from([[1., 2., 3.], [4., 5., 6.]]);
        for (axes, keepdims) in [(Some(&[0isize][..]), false), (Some(&[-1][..]), false), (Some(&[1][..]), true), (None, false), (None, true)] {
            x.cleargrad();
            let y = sum(&x, axes, keepdims)?;
            y.backward()?;
            assert_eq!(x.grad().unwrap().data().unwrap(), array![[1., 1., 1.], [1., 1., 1.]].into_dyn());
        }
        let y = sum(&x, Some(&[0]), false)?;
        assert_eq!(y.shape(), vec![3]);
        let y = sum(&x, None, false)?;
        assert_eq!(y.item(), Some(21.));
        assert!(sum(&x, Some(&[2]), false).is_err());
        Ok(())
    }

    #[test]
    fn transpose_backward_restores_axes() -> Result<(), DezrError> {
        let x = Value::new(ndarray::ArrayD::from_shape_vec(vec![2, 3, 4], (0..24).map(f64::from).collect()).unwrap());
        let y = transpose(&x, Some(&[1, 2, 0]))?;
        assert_eq!(y.shape(), vec![3, 4, 2]);
        y.backward()?;
        assert_eq!(x.grad().unwrap().shape(), vec![2, 3, 4]);
        let z = transpose(&x, None)?;
        assert_eq!(z.shape(), vec![4, 3, 2]);
        assert!(transpose(&x, Some(&[0, 1])).is_err());
        Ok(())
    }

    #[test]
    fn reshape_backward_restores_shape() -> Result<(), DezrError> {
        let x = Value::from([[1., 2., 3.], [4., 5., 6.]]);
        let y = reshape(&x, &[6])?;
        y.backward()?;
        assert_eq!(x.grad().unwrap().shape(), vec![2, 3]);
        assert!(reshape(&x, &[4]).is_err());
        Ok(())
    }

    #[test]
    fn matmul_gradients() -> Result<(), DezrError> {
        let x = Value::from([[1., 2., 3.], [4., 5., 6.]]);
        let w = Value::from([[1.], [2.], [3.]]);
        let y = matmul(&x, &w)?;
        assert_eq!(y.data().unwrap(), array![[14.], [32.]].into_dyn());
        let loss = sum(&y, None, false)?;
        loss.backward()?;
        assert_eq!(x.grad().unwrap().data().unwrap(), array![[1., 2., 3.], [1., 2., 3.]].into_dyn());
        assert_eq!(w.grad().unwrap().data().unwrap(), array![[5.], [7.], [9.]].into_dyn());
        Ok(())
    }

    #[test]
    fn linear_matches_matmul_plus_bias() -> Result<(), DezrError> {
        let x = Value::from([[1., 2.], [3., 4.], [5., 6.]]);
        let w = Value::from([[1., 0., 2.], [0., 1., 1.]]);
        let b = Value::from([0.5, -0.5, 1.]);
        let y = linear(&x, &w, Some(&b))?;
        let expected = &matmul(&x, &w)? + &b;
        assert_eq!(y.data(), expected.data());
        sum(&y, None, false)?.backward()?;
        assert_eq!(b.grad().unwrap().data().unwrap(), array![3., 3., 3.].into_dyn());
        assert_eq!(w.grad().unwrap().data().unwrap(), array![[9., 9., 9.], [12., 12., 12.]].into_dyn());
        let y = linear(&x, &w, None)?;
        assert_eq!(y.shape(), vec![3, 3]);
        Ok(())
    }

    #[test]
    fn mean_squared_error_gradient() -> Result<(), DezrError> {
        let x0 = Value::from([1., 2., 3., 4.]);
        let x1 = Value::from([0., 2., 5., 4.]);
        let loss = mean_squared_error(&x0, &x1)?;
        assert_abs_diff_eq!(loss.item().unwrap(), 5. / 4.);
        loss.backward()?;
        let g0 = x0.grad().unwrap().data().unwrap();
        let g1 = x1.grad().unwrap().data().unwrap();
        assert_eq!(g0, array![0.5, 0., -1., 0.].into_dyn());
        assert_eq!(g1, -g0);
        Ok(())
    }

    #[test]
    fn elementwise_derivatives() -> Result<(), DezrError> {
        let v = 0.7f64;
        let cases: [(fn(&Value) -> Result<Value, DezrError>, f64); 6] = [
            (sin, v.cos()),
            (cos, -v.sin()),
            (tanh, 1. - v.tanh().powi(2)),
            (exp, v.exp()),
            (log, 1. / v),
            (sigmoid, {
                let s = 1. / (1. + (-v).exp());
                s * (1. - s)
            }),
        ];
        for (f, expected) in cases {
            let x = Value::from(v);
            f(&x)?.backward()?;
            assert_abs_diff_eq!(x.grad().unwrap().item().unwrap(), expected, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn div_gradients_with_broadcast() -> Result<(), DezrError> {
        let x0 = Value::from([[2., 4.], [6., 8.]]);
        let x1 = Value::from([2., 4.]);
        let y = div(&x0, &x1)?;
        sum(&y, None, false)?.backward()?;
        assert_eq!(x0.grad().unwrap().data().unwrap(), array![[0.5, 0.25], [0.5, 0.25]].into_dyn());
        // -(2 + 6) / 4, -(4 + 8) / 16
        assert_eq!(x1.grad().unwrap().data().unwrap(), array![-2., -0.75].into_dyn());
        Ok(())
    }
}
