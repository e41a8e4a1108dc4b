mod errors;
mod policy;
mod rule;

pub use errors::PolicyError;
pub use policy::evaluate;
pub use rule::{EventMeta, SubscriptionRule};
