pub mod audit;
pub mod challenge;
pub mod clock;
pub mod models;
pub mod registry;
pub mod security;
pub mod server;
pub mod service;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use server::AuthServer;
pub use service::AuthService;
pub use storage::{MemoryStore, RedisStore};
