pub mod analytics;
pub mod backend;
pub mod concierge;
pub mod contracts;
pub mod executor;
pub mod router;
pub mod shortlist;

#[cfg(test)]
mod test_support;

pub use analytics::TracingAnalytics;
pub use backend::*;
pub use concierge::*;
pub use contracts::*;
pub use executor::*;
pub use shortlist::ShareMethod;
