use dezr::{DezrError, Value};
use ndarray::array;

#[test]
fn leaves_have_generation_zero() {
    let x = Value::from([1., 2., 3.]);
    assert_eq!(x.generation(), 0);
    assert!(x.creator().is_none());
}

#[test]
fn generation_is_one_above_creator() -> Result<(), DezrError> {
    let x = Value::from(0.5);
    let a = &x * &x;
    let b = a.sin();
    let c = &a + &b;
    for (v, expected) in [(&a, 1), (&b, 2), (&c, 3)] {
        let creator = v.creator().unwrap();
        assert_eq!(v.generation(), expected);
        assert_eq!(creator.generation + 1, v.generation());
        let max_input = creator.inputs.iter().map(Value::generation).max().unwrap();
        assert_eq!(creator.generation, max_input);
    }
    let creator = c.creator().unwrap();
    assert_eq!(creator.name, "Add");
    assert!(creator.inputs[0].is_same(&a));
    assert!(creator.inputs[1].is_same(&b));
    Ok(())
}

#[test]
fn ragged_data_is_rejected() {
    let e = Value::try_from(vec![vec![1., 2., 3.], vec![4., 5.]]).unwrap_err();
    assert!(matches!(e, DezrError::ConstructionError(_)));
    assert!(e.to_string().contains("ragged"));
}

#[test]
fn update_data_in_place() {
    let w = Value::from([1., 2.]);
    w.update_data(|w| *w *= 3.0);
    assert_eq!(w.data().unwrap(), array![3., 6.].into_dyn());
}

#[test]
fn display() {
    let x = Value::from([[1., 2.], [3., 4.]]);
    assert_eq!(x.to_string(), "variable([[1, 2],\n          [3, 4]])");
    assert_eq!(Value::from(2.0).to_string(), "variable(2)");
}

#[test]
fn shape_errors_carry_both_shapes() {
    let a = Value::from([[1., 2., 3.], [4., 5., 6.]]);
    let b = Value::from([1., 2.]);
    let e = a.try_add(&b).unwrap_err();
    assert!(matches!(e, DezrError::ShapeError(_)));
    let msg = e.to_string();
    assert!(msg.contains("[2, 3]") && msg.contains("[2]"), "{msg}");
    assert!(a.matmul(&a).is_err());
    assert!(a.broadcast_to(&[3]).is_err());
    assert!(a.sum_to(&[4, 3]).is_err());
}
