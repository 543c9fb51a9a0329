pub mod cli;
pub mod collective;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod plan;
pub mod reduce;
pub mod session;
pub mod split;
pub mod types;
pub mod workload;

pub use collective::{Communicator, LocalCluster};
pub use config::{Backend, OffloadConfig};
pub use device::{ComputeRuntime, DeviceInfo, HostRuntime};
pub use dispatch::{DispatchOutput, KernelArg, KernelInvocation, LaunchGeometry, dispatch};
pub use error::{OffloadError, Result};
pub use lifecycle::{Lifecycle, RunState};
pub use plan::{
    Geometry, LocalSizePolicy, Planner, RemainderPolicy, TiledGeometry, plan, plan_tiled,
};
pub use reduce::{PartialResultSet, Reducible, reduce_partials};
pub use session::ComputeSession;
pub use split::{WorkRange, split};
pub use types::{DataType, Element, Rank, ReduceOp};
