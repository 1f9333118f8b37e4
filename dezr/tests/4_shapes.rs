use dezr::functions::{broadcast_to, sum_to};
use dezr::{DezrError, Value};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[test]
fn sum_to_undoes_broadcast_to() -> Result<(), DezrError> {
    let mut rng = SmallRng::seed_from_u64(42);
    let pairs: [(&[usize], &[usize]); 6] = [
        (&[], &[2, 3]),
        (&[3], &[2, 3]),
        (&[1, 3], &[4, 3]),
        (&[2, 1], &[2, 5]),
        (&[1, 1], &[3, 1, 4]),
        (&[4, 1, 2], &[3, 4, 5, 2]),
    ];
    for (from, to) in pairs {
        let numel = from.iter().product();
        let x = Value::from_shape_vec(from, (0..numel).map(|_| rng.gen::<f64>()).collect())?;
        let y = broadcast_to(&x, to)?;
        assert_eq!(y.shape(), to);
        let z = sum_to(&y, from)?;
        assert_eq!(z.shape(), from);
        z.backward()?;
        assert_eq!(x.grad().unwrap().shape(), from);
    }
    Ok(())
}

#[test]
fn unreachable_targets_fail() {
    let x = Value::from([[1., 2., 3.], [4., 5., 6.]]);
    for target in [&[3][..], &[2, 2], &[4, 3], &[3, 2]] {
        assert!(matches!(broadcast_to(&x, target), Err(DezrError::ShapeError(_))), "{target:?}");
    }
    for target in [&[4][..], &[3, 3], &[2, 1, 3]] {
        assert!(matches!(sum_to(&x, target), Err(DezrError::ShapeError(_))), "{target:?}");
    }
}

#[test]
fn reshape_transpose_sum() -> Result<(), DezrError> {
    let x = Value::from([[1., 2., 3.], [4., 5., 6.]]);
    let y = x.reshape(&[3, 2])?.T()?.sum(Some(&[-1]), true)?;
    assert_eq!(y.shape(), vec![2, 1]);
    y.backward()?;
    assert_eq!(x.grad().unwrap().shape(), vec![2, 3]);
    let t = x.transpose(&[1, 0])?;
    assert_eq!(t.shape(), vec![3, 2]);
    Ok(())
}
