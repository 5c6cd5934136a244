// ALPHA SOVEREIGN - PINNED THREAD RUNTIME LIBRARY
// Status: PRODUCTION

// 1. تعريف الوحدات (Modules)
pub mod error;
pub mod affinity;
pub mod hardware;
pub mod lifecycle;
pub mod thread;
pub mod utils;

// 2. التصدير العام (Re-exports)
pub use error::{ErrorKind, NativeErrorKind, NativeOp, ThreadError, ThreadResult};
pub use affinity::{Affinity, AffinityMask};
pub use hardware::Tid;
pub use lifecycle::CancellationSignal;
pub use thread::{Phase, PinnedThread, ThreadHandleProxy};
pub use utils::config_loader::PinningConfig;
pub use utils::logger::{init_logger, LifecycleEvent};

pub mod prelude {
    pub use crate::{Affinity, CancellationSignal, ErrorKind, PinnedThread, ThreadError, ThreadHandleProxy, ThreadResult};
}
