pub mod error;
pub mod lock;
pub mod logging;
pub mod node;
pub mod timestamp;
pub mod wait;

pub use error::{CamError, CamResult};
pub use logging::{ComponentLogger, LogContext};
pub use node::CamNode;
pub use timestamp::utc_ns_now;
pub use wait::StopSignal;
