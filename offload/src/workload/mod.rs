//! The offloaded workloads. Each module plans, dispatches and reduces one
//! kernel from `offload/kernels/`.

pub mod convolution;
pub mod distributed_sum;
pub mod matmul;
pub mod pi;
pub mod sum;
