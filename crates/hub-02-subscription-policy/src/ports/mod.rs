mod inbound;
mod outbound;

pub use inbound::NotificationPolicy;
pub use outbound::RuleStore;
