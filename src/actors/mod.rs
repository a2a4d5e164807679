pub mod messages;
pub mod resolver_actor;

pub use messages::Freshness;
pub use resolver_actor::ResolverHandle;
