pub mod config;
pub mod content;
pub mod dataset;
pub mod judge;
pub mod library;
pub mod metric;
pub mod model;
pub mod prompt;
pub mod result;
pub mod rubric;
pub mod yaml;

pub use config::*;
pub use content::*;
pub use dataset::*;
pub use judge::*;
pub use library::*;
pub use metric::*;
pub use model::*;
pub use prompt::*;
pub use result::*;
pub use rubric::*;
pub use yaml::*;
