pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod draft;
pub mod highlight;
pub mod model;
pub mod session;
pub mod storage;
pub mod ui;
pub mod view;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use model::{ItemStatus, TrackedItem};
pub use view::{derive, AlphabetOrder, DateOrder, SortSelection};
