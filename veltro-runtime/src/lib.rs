//! Application dispatcher (C4) and `hyper` server binding.

pub mod dispatcher;
pub mod hyper_adapter;

pub use dispatcher::{Application, ErrorHandler, RouterHandle};
