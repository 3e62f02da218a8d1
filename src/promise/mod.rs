//! The promise core: a reference-counted node graph built by `.then()`,
//! driven by the [`crate::dispatch::Dispatcher`], and exposed through two
//! small handles — [`Promise`] and [`Promisee`].

mod handle;
mod node;
mod stage;

pub use handle::{Promise, Promisee};
pub use stage::Handler;

pub(crate) use node::{AnyValue, Arrival, Chain, Node, StageFn};
