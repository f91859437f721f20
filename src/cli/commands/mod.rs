//! Command implementations for the Lydbok CLI.

mod books;
mod cache;
mod config;
mod init;
mod jobs;
mod run;
mod search;
mod setup;

pub use books::{run_add, run_books, run_status};
pub use cache::run_cache;
pub use config::run_config;
pub use init::run_init;
pub use jobs::run_jobs;
pub use run::run_run;
pub use search::run_search;
pub use setup::run_setup;
