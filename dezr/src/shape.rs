//! Shape reconciliation on raw payloads.
//!
//! These are the kernels behind the `BroadcastTo`, `SumTo`, `Sum`, `Reshape`,
//! `Transpose` and `MatMul` operations. They never touch the graph.

use crate::error::DezrError;
use crate::Payload;
use ndarray::{ArrayD, Axis, Ix2, IxDyn};

/// Shape both operands of an elementwise binary op broadcast to
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, DezrError> {
    let rank = a.len().max(b.len());
    let mut shape = Vec::with_capacity(rank);
    for i in 0..rank {
        // Align from the right, missing axes count as 1
        let da = if i + a.len() >= rank { a[i + a.len() - rank] } else { 1 };
        let db = if i + b.len() >= rank { b[i + b.len() - rank] } else { 1 };
        shape.push(match (da, db) {
            (da, db) if da == db => da,
            (1, db) => db,
            (da, 1) => da,
            _ => {
                return Err(DezrError::shape_error(format!(
                    "operands with shapes {a:?} and {b:?} can not be broadcast together"
                )))
            }
        });
    }
    Ok(shape)
}

/// Check that `from` can be expanded to `to` by prepending size 1 axes
/// and replicating size 1 axes.
fn check_broadcast(from: &[usize], to: &[usize]) -> Result<(), DezrError> {
    if to.len() < from.len() {
        return Err(DezrError::shape_error(format!(
            "can not broadcast {from:?} to {to:?}, that would shrink rank from {} to {}",
            from.len(),
            to.len()
        )));
    }
    let lead = to.len() - from.len();
    for (a, (&f, &t)) in from.iter().zip(&to[lead..]).enumerate() {
        let axis = a + lead;
        if f == t || f == 1 {
            continue;
        }
        let reason = if t < f {
            format!("axis {axis} would shrink from {f} to {t}")
        } else if f == 0 {
            format!("axis {axis} is empty and can not be replicated to {t}")
        } else if t % f != 0 {
            format!("axis {axis} of size {t} is not a multiple of {f}")
        } else {
            format!("axis {axis} has size {f}, only size 1 axes can be replicated to {t}")
        };
        return Err(DezrError::shape_error(format!(
            "can not broadcast {from:?} to {to:?}, {reason}"
        )));
    }
    Ok(())
}

/// Expand x to shape.
pub fn broadcast_to(x: &Payload, shape: &[usize]) -> Result<Payload, DezrError> {
    check_broadcast(x.shape(), shape)?;
    x.broadcast(IxDyn(shape)).map(|view| view.to_owned()).ok_or_else(|| {
        DezrError::shape_error(format!("can not broadcast {:?} to {shape:?}", x.shape()))
    })
}

/// Reduce x to shape by summing leading axes beyond the rank of shape
/// and every axis where shape has size 1.
pub fn sum_to(x: &Payload, shape: &[usize]) -> Result<Payload, DezrError> {
    let src = x.shape();
    if shape.len() > src.len() {
        return Err(DezrError::shape_error(format!(
            "can not sum {src:?} to {shape:?}, target rank is higher"
        )));
    }
    let lead = src.len() - shape.len();
    for (i, &t) in shape.iter().enumerate() {
        let s = src[i + lead];
        if t != s && t != 1 {
            return Err(DezrError::shape_error(format!(
                "can not sum {src:?} to {shape:?}, axis {} has size {s} but target size is {t}",
                i + lead
            )));
        }
    }
    let mut y = x.clone();
    for (i, &t) in shape.iter().enumerate() {
        let axis = Axis(i + lead);
        if t == 1 && src[i + lead] != 1 {
            y = y.sum_axis(axis).insert_axis(axis);
        }
    }
    for _ in 0..lead {
        y = y.sum_axis(Axis(0));
    }
    Ok(y)
}

/// Normalize possibly negative axes against rank, rejecting duplicates
/// and axes out of range.
pub fn normalize_axes(axes: &[isize], rank: usize) -> Result<Vec<usize>, DezrError> {
    let mut res = Vec::with_capacity(axes.len());
    for &a in axes {
        let axis = if a < 0 { a + rank as isize } else { a };
        if axis < 0 || axis as usize >= rank {
            return Err(DezrError::shape_error(format!(
                "axis {a} is out of range for rank {rank}"
            )));
        }
        let axis = axis as usize;
        if res.contains(&axis) {
            return Err(DezrError::shape_error(format!("axes {axes:?} contain duplicates")));
        }
        res.push(axis);
    }
    Ok(res)
}

/// Sum x along axes, all axes if None.
/// Axes must already be normalized.
pub fn sum(x: &Payload, axes: Option<&[usize]>, keepdims: bool) -> Payload {
    match axes {
        None => {
            let total = x.sum();
            let shape = if keepdims { vec![1; x.ndim()] } else { Vec::new() };
            ArrayD::from_elem(IxDyn(&shape), total)
        }
        Some(axes) => {
            let mut sorted = axes.to_vec();
            sorted.sort_unstable_by(|a, b| b.cmp(a));
            let mut y = x.clone();
            for a in sorted {
                y = y.sum_axis(Axis(a));
                if keepdims {
                    y = y.insert_axis(Axis(a));
                }
            }
            y
        }
    }
}

/// Shape the gradient of a sum must be reshaped into before it can be
/// broadcast back to x_shape. Reduced axes are reinserted as size 1 axes
/// when they were dropped. Full reductions need no reshape.
pub fn reshape_sum_backward(
    gy_shape: &[usize],
    x_shape: &[usize],
    axes: Option<&[isize]>,
    keepdims: bool,
) -> Result<Vec<usize>, DezrError> {
    let mut shape = gy_shape.to_vec();
    match axes {
        Some(axes) if !x_shape.is_empty() && !keepdims => {
            let mut actual = normalize_axes(axes, x_shape.len())?;
            actual.sort_unstable();
            if gy_shape.len() + actual.len() != x_shape.len() {
                return Err(DezrError::shape_error(format!(
                    "gradient of shape {gy_shape:?} does not match sum of {x_shape:?} over axes {axes:?}"
                )));
            }
            for a in actual {
                shape.insert(a, 1);
            }
        }
        _ => {}
    }
    Ok(shape)
}

/// Reshape x, number of elements must stay the same
pub fn reshape(x: &Payload, shape: &[usize]) -> Result<Payload, DezrError> {
    let numel: usize = shape.iter().product();
    if numel != x.len() {
        return Err(DezrError::shape_error(format!(
            "can not reshape {:?} with {} elements to {shape:?} with {numel} elements",
            x.shape(),
            x.len()
        )));
    }
    x.to_shape(shape.to_vec())
        .map(|y| y.into_owned())
        .map_err(|e| DezrError::shape_error(format!("can not reshape {:?} to {shape:?}: {e}", x.shape())))
}

/// Check that axes is a permutation of 0..rank
pub fn check_permutation(axes: &[usize], rank: usize) -> Result<(), DezrError> {
    let mut seen = vec![false; rank];
    for &a in axes {
        if a >= rank || seen[a] {
            return Err(DezrError::shape_error(format!(
                "axes {axes:?} are not a permutation of rank {rank}"
            )));
        }
        seen[a] = true;
    }
    if axes.len() != rank {
        return Err(DezrError::shape_error(format!(
            "axes {axes:?} are not a permutation of rank {rank}"
        )));
    }
    Ok(())
}

/// Permute axes of x
pub fn permute(x: &Payload, axes: &[usize]) -> Result<Payload, DezrError> {
    check_permutation(axes, x.ndim())?;
    Ok(x.view().permuted_axes(IxDyn(axes)).as_standard_layout().into_owned())
}

/// Inverse permutation
#[must_use]
pub fn argsort(axes: &[usize]) -> Vec<usize> {
    let mut axes: Vec<(usize, usize)> = axes.iter().copied().enumerate().collect();
    axes.sort_by_key(|(_, v)| *v);
    axes.iter().map(|(k, _)| *k).collect()
}

/// Matrix product of two 2 dimensional payloads
pub fn dot(a: &Payload, b: &Payload) -> Result<Payload, DezrError> {
    let err = || {
        DezrError::shape_error(format!(
            "can not multiply matrices with shapes {:?} and {:?}",
            a.shape(),
            b.shape()
        ))
    };
    let a2 = a.view().into_dimensionality::<Ix2>().map_err(|_| err())?;
    let b2 = b.view().into_dimensionality::<Ix2>().map_err(|_| err())?;
    if a2.ncols() != b2.nrows() {
        return Err(err());
    }
    Ok(a2.dot(&b2).into_dyn())
}
