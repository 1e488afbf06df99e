//! Matrix container, configuration, and reference kernels

pub mod config;
pub mod csr;
pub mod reference;

pub use config::{EngineOptions, KernelStrategy, OrderingHeuristic, Platform, Tuning};
pub use csr::CsrMatrix;
pub use reference::reference_spmv;
