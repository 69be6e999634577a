pub mod context;
pub mod extract;
pub mod pool;
pub mod unit;

pub use context::FetchContext;
pub use extract::{extract_archive, zip_directory, ExtractRules};
pub use pool::{FetchPool, PoolReport};
pub use unit::{FetchOutcome, FetchUnit};
