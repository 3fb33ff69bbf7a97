//! Backbone core: use-case results, the request carrier, authorization guards and the use-case contract.

pub mod context;
pub mod guard;
pub mod result;
pub mod traits;

pub use context::{Actor, Locale, RequestContext, TraceContext, DEFAULT_LOCALE};
pub use guard::{
    Guard, GuardFailure, GuardSet, Guarded, OwnedResource, OwnedResourceGuard, RoleGuard,
    SelfAccessGuard,
};
pub use result::{AppStatus, UseCaseError, UseCaseResult};
pub use traits::UseCase;
