mod agent;
mod args;
mod cancel;
mod config;
mod entry;
mod error;
mod fleet;
mod logger;
mod shutdown;
mod system;

use error::AppResult;

fn main() -> AppResult<()> {
    entry::run()
}
