pub mod column_mapping;
pub mod eval_task;
pub mod executor;
pub mod multimodal;
pub mod output;
pub mod rate_limiter;
pub mod request_builder;
pub mod response_parser;
pub mod retry;
pub mod tasks;

pub use column_mapping::*;
pub use eval_task::*;
pub use executor::*;
pub use output::*;
pub use rate_limiter::*;
pub use request_builder::*;
pub use response_parser::*;
pub use retry::*;
pub use tasks::*;
