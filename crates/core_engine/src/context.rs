//! Per-request context

use core_kernel::OrgId;
use uuid::Uuid;

/// Identifies who is acting and under which organization
///
/// Every engine operation takes a context; the actor lands in the audit
/// trail and the correlation ID threads through tracing spans. There is
/// no process-wide session.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Acting principal, recorded on every audit entry
    pub actor_id: String,
    /// Organization the actor operates under
    pub org_id: OrgId,
    /// Correlation ID for tracing across systems
    pub correlation_id: Uuid,
}

impl RequestContext {
    pub fn new(actor_id: impl Into<String>, org_id: OrgId) -> Self {
        Self {
            actor_id: actor_id.into(),
            org_id,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Context for the periodic jobs, attributed to the system actor
    pub fn system() -> Self {
        Self::new("system", OrgId::new())
    }
}
