use dezr::{DezrError, Value};

/// Differentiable function with trainable parameters
pub trait Layer {
    /// Apply layer to x. Layers that initialise parameters lazily do so here.
    fn forward(&mut self, x: &Value) -> Result<Value, DezrError>;

    /// Every parameter with its name, in declaration order
    fn parameters(&self) -> Vec<(&'static str, &Value)>;

    /// Forget gradients of all parameters
    fn cleargrads(&self) {
        for (_, p) in self.parameters() {
            p.cleargrad();
        }
    }
}
