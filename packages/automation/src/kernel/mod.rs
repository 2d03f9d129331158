pub mod deps;
pub mod rate_limit;
pub mod scheduled_tasks;
pub mod test_dependencies;
pub mod traits;

pub use deps::{CrmResolverAdapter, CrmSenderAdapter, Deps, DispatchSettings};
pub use rate_limit::RateLimiter;
pub use traits::{BaseContactResolver, BaseEmailSender};
