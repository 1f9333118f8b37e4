//! Layers for dezr.
//!
//! A layer owns its parameters as [`Value`](dezr::Value)s and lists them with
//! [`Layer::parameters`], so that training loops can clear and update them.

#![forbid(unsafe_code)]
#![forbid(rustdoc::broken_intra_doc_links)]
#![forbid(rustdoc::private_intra_doc_links)]
#![forbid(missing_docs)]
#![forbid(rustdoc::missing_crate_level_docs)]
#![forbid(rustdoc::invalid_codeblock_attributes)]
#![forbid(rustdoc::invalid_rust_codeblocks)]
#![forbid(rustdoc::bare_urls)]

mod layer;
pub use layer::Layer;

mod linear;
pub use linear::Linear;
