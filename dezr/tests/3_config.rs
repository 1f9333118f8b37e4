use dezr::config::{enable_grad, is_enabled};
use dezr::{no_grad, using_config, DezrError, Flag, Value};

#[test]
fn no_grad_produces_detached_outputs() -> Result<(), DezrError> {
    let x = Value::from(2.0);
    let a = &x * &x;
    let y = no_grad(|| a.pow(2.0).exp());
    assert!(y.creator().is_none());
    assert_eq!(y.generation(), 0);
    assert!(is_enabled(Flag::EnableBackprop));
    let z = &a * 2.0;
    assert_eq!(z.generation(), 2);
    Ok(())
}

#[test]
fn no_grad_restores_after_panic() {
    let result = std::panic::catch_unwind(|| no_grad(|| panic!("inside no_grad")));
    assert!(result.is_err());
    assert!(is_enabled(Flag::EnableBackprop));
}

#[test]
fn no_grad_restores_after_error() {
    fn failing() -> Result<Value, DezrError> {
        no_grad(|| Value::from([1., 2.]).try_add(Value::from([1., 2., 3.])))
    }
    assert!(failing().is_err());
    assert!(is_enabled(Flag::EnableBackprop));
}

#[test]
fn nested_overrides() {
    let x = Value::from(1.0);
    no_grad(|| {
        let y = enable_grad(|| &x + 1.0);
        assert!(y.creator().is_some());
        using_config(Flag::EnableBackprop, false, || {
            assert!(!is_enabled(Flag::EnableBackprop));
        });
        assert!(!is_enabled(Flag::EnableBackprop));
    });
    assert!(is_enabled(Flag::EnableBackprop));
}
