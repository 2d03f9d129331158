pub mod error;
pub mod pagination;

pub use error::PipelineError;
pub use pagination::Page;
