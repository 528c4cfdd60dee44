pub mod config;
pub mod engine;
pub mod filter;
pub mod init;
pub mod remote;
pub mod store;
pub mod updater;

pub use config::Config;
pub use engine::{MatchResult, SpamMatcher};
pub use filter::SpamFilter;
pub use remote::{DirSource, HttpSource, RemoteSource};
pub use store::{BlacklistSet, BlacklistSource, BlacklistStore};
pub use updater::UpdateError;
