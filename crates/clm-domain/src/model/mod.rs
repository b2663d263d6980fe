mod audit;
mod blueprint;
mod inventory;
mod job;
mod schedule;
mod user;

pub use audit::*;
pub use blueprint::*;
pub use inventory::*;
pub use job::*;
pub use schedule::*;
pub use user::*;
