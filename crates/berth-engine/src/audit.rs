use berth_core::AuditEntity;
use berth_db::Database;
use tracing::warn;

/// Append an audit entry; a failed write is logged and never fails the caller
pub(crate) async fn record(db: &Database, entity: AuditEntity, entity_id: i64, message: &str) {
    if let Err(e) = db.audit().append(entity, entity_id, message).await {
        warn!("Failed to write audit entry for {} {}: {}", entity.as_str(), entity_id, e);
    }
}
