//! # dezr
//!
//! dezr is a small define-by-run reverse mode automatic differentiation engine.
//!
//! Applying operations to [`Value`]s evaluates them immediately and, while
//! [`Flag::EnableBackprop`] is on, records which [`Op`] created which value.
//! [`Value::backward`] then walks that graph from the newest operation to the
//! oldest, accumulating gradients into every value that took part.
//!
//! ```rust
//! use dezr::Value;
//!
//! let x = Value::from(2.0);
//! let y = x.pow(2.0) + x.pow(3.0);
//! y.backward()?;
//! assert_eq!(x.grad().and_then(|g| g.item()), Some(16.0));
//! # Ok::<(), dezr::DezrError>(())
//! ```
//!
//! Gradients are values as well. Backward with
//! [`create_graph`](BackwardOptions::create_graph) records the gradient
//! computation, so gradients can be differentiated again:
//!
//! ```rust
//! use dezr::{BackwardOptions, Value};
//!
//! let x = Value::from(3.0);
//! let y = x.pow(3.0);
//! y.backward_with(BackwardOptions::default().create_graph(true))?;
//! let gx = x.grad().unwrap();
//! assert_eq!(gx.item(), Some(27.0));
//! x.cleargrad();
//! gx.backward()?;
//! assert_eq!(x.grad().and_then(|g| g.item()), Some(18.0));
//! # Ok::<(), dezr::DezrError>(())
//! ```
//!
//! Arrays are [`ndarray`] arrays of `f64`. Values and the graph they live in
//! belong to the thread that created them.
#![forbid(unsafe_code)]
#![forbid(rustdoc::broken_intra_doc_links)]
#![forbid(rustdoc::private_intra_doc_links)]
#![forbid(missing_docs)]
#![forbid(rustdoc::invalid_codeblock_attributes)]
#![forbid(rustdoc::invalid_rust_codeblocks)]
#![forbid(rustdoc::bare_urls)]

mod backward;
/// See [`Flag`](config::Flag)
pub mod config;
mod error;
mod function;
/// Free function form of every primitive
pub mod functions;
mod graph;
mod op;
/// Shape reconciliation kernels on raw arrays
pub mod shape;
mod slab;
mod value;

pub use backward::BackwardOptions;
pub use config::{no_grad, using_config, Flag};
pub use error::DezrError;
pub use function::{call, call_function};
pub use op::{BackwardContext, Function, Op};
pub use value::{Creator, Value};

/// Array carried by a [`Value`]
pub type Payload = ndarray::ArrayD<f64>;
