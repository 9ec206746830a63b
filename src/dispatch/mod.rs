pub mod context;
pub mod registry;
pub mod reply;

pub use context::inside_scheduler;
pub use registry::{OpFn, OpFuture, OpTable};
pub use reply::Reply;

pub(crate) use registry::Bindings;
