use crate::Layer;
use dezr::functions::linear;
use dezr::{DezrError, Payload, Value};
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const SEED: u64 = 69420;

/// Fully connected layer, y = x·W + b.
///
/// W has shape `[in_size, out_size]`. When in_size is not given, W stays a
/// placeholder until the first forward, which takes in_size from the number
/// of columns of its input.
pub struct Linear {
    w: Value,
    b: Option<Value>,
    in_size: Option<usize>,
    out_size: usize,
    rng: SmallRng,
}

impl Linear {
    /// Layer with out_size outputs and lazily initialised weight
    #[must_use]
    pub fn new(out_size: usize) -> Linear {
        Linear {
            w: Value::named_placeholder("W"),
            b: Some(Value::named(Payload::zeros(vec![out_size]), "b")),
            in_size: None,
            out_size,
            rng: SmallRng::seed_from_u64(SEED),
        }
    }

    /// Initialise weight now, for inputs with in_size columns
    #[must_use]
    pub fn with_in_size(mut self, in_size: usize) -> Linear {
        self.in_size = Some(in_size);
        self.init_w(in_size);
        self
    }

    /// Use different seed for weight initialisation
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Linear {
        self.rng = SmallRng::seed_from_u64(seed);
        if let Some(in_size) = self.in_size {
            self.init_w(in_size);
        }
        self
    }

    /// Drop bias
    #[must_use]
    pub fn no_bias(mut self) -> Linear {
        self.b = None;
        self
    }

    /// Weight
    #[must_use]
    pub fn weight(&self) -> &Value {
        &self.w
    }

    /// Bias
    #[must_use]
    pub fn bias(&self) -> Option<&Value> {
        self.b.as_ref()
    }

    /// Uniform in [0, 1) scaled by sqrt(1/in_size)
    fn init_w(&mut self, in_size: usize) {
        let scale = (1.0 / in_size as f64).sqrt();
        let rng = &mut self.rng;
        let w = Array2::from_shape_fn((in_size, self.out_size), |_| rng.gen::<f64>() * scale);
        log::debug!("Initialising W of linear layer with shape [{in_size}, {}]", self.out_size);
        self.w.set_data(w.into_dyn());
    }
}

impl Layer for Linear {
    fn forward(&mut self, x: &Value) -> Result<Value, DezrError> {
        if self.in_size.is_none() {
            let shape = x.shape();
            let &[_, in_size] = shape.as_slice() else {
                return Err(DezrError::shape_error(format!(
                    "linear layer expects input with shape [batch, in_size], got {shape:?}"
                )));
            };
            self.in_size = Some(in_size);
            self.init_w(in_size);
        }
        linear(x, &self.w, self.b.as_ref())
    }

    fn parameters(&self) -> Vec<(&'static str, &Value)> {
        let mut params = vec![("W", &self.w)];
        if let Some(b) = &self.b {
            params.push(("b", b));
        }
        params
    }
}

impl<'a> IntoIterator for &'a Linear {
    type Item = &'a Value;
    type IntoIter = std::vec::IntoIter<&'a Value>;
    fn into_iter(self) -> Self::IntoIter {
        self.parameters().into_iter().map(|(_, p)| p).collect::<Vec<_>>().into_iter()
    }
}
