mod collective;
mod stage;
mod star;

pub use collective::{Collective, Compression, ROOT_RANK};
pub use stage::DistributedStage;
pub use star::{StarCollective, TcpStar};
