use crate::config::{self, Flag};
use crate::error::DezrError;
use crate::graph::with_graph;
use crate::op::{Function, Op};
use crate::value::Value;
use crate::Payload;

/// Apply op to inputs.
///
/// Runs forward on the input payloads and wraps every result in a new value.
/// When [`Flag::EnableBackprop`] is on, the op becomes the creator of its
/// outputs, its generation is the highest generation among the inputs and
/// outputs are one generation above it. Otherwise outputs are detached leaves.
pub fn call(mut op: Op, inputs: &[&Value]) -> Result<Vec<Value>, DezrError> {
    let name = op.name();
    let ys = with_graph(|g| {
        let xs = inputs
            .iter()
            .map(|x| g.values[x.id].data.as_ref().ok_or(DezrError::MissingPayload { op: name }))
            .collect::<Result<Vec<&Payload>, DezrError>>()?;
        op.forward(&xs)
    })?;
    let ids = if config::is_enabled(Flag::EnableBackprop) && !ys.is_empty() {
        with_graph(|g| g.record(op, inputs.iter().map(|x| x.id).collect(), ys))
    } else {
        // Dropped here, user primitives may hold values
        drop(op);
        with_graph(|g| ys.into_iter().map(|y| g.push_value(Some(y), None)).collect())
    };
    Ok(ids.into_iter().map(Value::from_id).collect())
}

/// Apply user defined primitive to inputs, see [`call`]
pub fn call_function(f: impl Function + 'static, inputs: &[&Value]) -> Result<Vec<Value>, DezrError> {
    call(Op::Custom(Box::new(f)), inputs)
}

/// Apply op with exactly one output
pub(crate) fn call1(op: Op, inputs: &[&Value]) -> Result<Value, DezrError> {
    let mut ys = call(op, inputs)?;
    debug_assert_eq!(ys.len(), 1);
    Ok(ys.swap_remove(0))
}

#[cfg(test)]
mod tests {
    use super::call_function;
    use crate::graph::live;
    use crate::{no_grad, BackwardContext, DezrError, Function, Payload, Value};

    /// Scales by a value it owns
    struct Scale(Value);

    impl Function for Scale {
        fn name(&self) -> &'static str {
            "Scale"
        }

        fn forward(&mut self, xs: &[&Payload]) -> Result<Vec<Payload>, DezrError> {
            Ok(vec![xs[0] * 3.0])
        }

        fn backward(&self, _: &BackwardContext<'_>, gys: &[Value]) -> Result<Vec<Value>, DezrError> {
            Ok(vec![gys[0].try_mul(&self.0)?])
        }
    }

    #[test]
    fn values_owned_by_primitives_are_freed() -> Result<(), DezrError> {
        let before = live();
        {
            let x = Value::from(2.0);
            let y = call_function(Scale(Value::from(3.0)), &[&x])?.remove(0);
            y.backward()?;
            assert_eq!(x.grad().and_then(|g| g.item()), Some(3.0));
        }
        assert_eq!(live(), before);
        {
            let x = Value::from(2.0);
            let y = no_grad(|| call_function(Scale(Value::from(3.0)), &[&x]))?.remove(0);
            assert_eq!(y.item(), Some(6.0));
        }
        assert_eq!(live(), before);
        Ok(())
    }
}
