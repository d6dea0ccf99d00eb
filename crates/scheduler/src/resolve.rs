use chrono::{DateTime, Utc};
use reqsched_core::{RequestDefinition, ResolvedRequest};
use reqsched_template::{DynamicResolver, ResolveError};

/// Evaluate a definition's HTTP template into a request fired at `scheduled_for`.
///
/// Every call re-evaluates: `uuid`, `now`, and `seq` differ between calls.
pub fn resolve_request(
    resolver: &DynamicResolver,
    definition: &RequestDefinition,
    scheduled_for: DateTime<Utc>,
) -> Result<ResolvedRequest, ResolveError> {
    let payload = resolver.resolve_payload(&definition.http)?;
    Ok(ResolvedRequest {
        name: definition.name.clone(),
        method: payload.method,
        url: payload.url,
        headers: payload.headers,
        body: payload.body,
        scheduled_for,
    })
}
