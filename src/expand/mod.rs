pub mod binder;
pub mod compiled;
pub mod condition;
pub mod context;
pub mod generator;
pub mod iterators;

pub use binder::{Binder, Expansion};
pub use compiled::{Compiled, Variable};
pub use context::{AmbientIterators, Axis, Context, ListValues, LocalHeap, LocalValue};
pub use generator::generate;
pub use iterators::{bindings, compile_assignment, compile_iterator, compile_list, Binding, Scope};
