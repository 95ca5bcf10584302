//! `docplug`: a template-driven synthetic document generator and
//! bulk-insert load tool. A JSON template is compiled once into a
//! [`compiler::Plug`] — a document skeleton with generators bound at their
//! positions — then stamped out repeatedly by a producer thread and drained
//! by a pool of insertion workers into a [`store::Store`] adapter.

pub mod cli;
pub mod compiler;
pub mod error;
pub mod generators;
pub mod objectid;
pub mod pipeline;
pub mod stamp;
pub mod store;
pub mod value;
