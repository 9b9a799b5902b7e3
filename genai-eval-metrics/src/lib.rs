pub mod aggregators;
pub mod calculators;
pub mod service;

pub use aggregators::*;
pub use calculators::*;
pub use service::*;
