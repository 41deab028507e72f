//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod descriptor;
mod limiter;
mod policy;
mod route;
mod rules;
mod store;
mod tiers;

pub use backend::CounterStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{PartitionState, Verdict};
pub use descriptor::PartitionKey;
pub use limiter::{AdmissionDecision, RateLimiter, DEFAULT_STORE_TIMEOUT};
pub use policy::{Policy, PolicyRegistry, Strategy};
pub use route::RouteResolver;
pub use rules::{RouteRule, RulesConfig};
pub use store::MemoryStore;
pub use tiers::MultiTierEvaluator;
