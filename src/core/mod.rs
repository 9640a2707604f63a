pub mod codec;
pub mod scheduler;
pub mod sequence;

pub use crate::domain::model::{Pong, PongBatch, PollReport, Signal};
pub use crate::domain::ports::{ClientSettings, Poller};
pub use crate::utils::error::Result;
