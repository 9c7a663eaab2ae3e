pub mod file;
pub mod watch;

pub use file::FileConfigProvider;
pub use watch::debounced_reloads;
