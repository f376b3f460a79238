use std::path::Path;
use tracing::{debug, warn};

/// Returns the identity this installation reports under.
///
/// An explicit id wins. Otherwise the id stored in `path` is reused, or a new
/// UUID v4 is generated and persisted there. Returns `None` when no id can be
/// read or stored; the collector then falls back to the reporter's IP.
pub async fn resolve_deployment_id(explicit: Option<&str>, path: &Path) -> Option<String> {
    if let Some(id) = explicit.map(str::trim).filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }

    match tokio::fs::read_to_string(path).await {
        Ok(stored) if !stored.trim().is_empty() => {
            debug!(path = %path.display(), "using stored deployment id");
            return Some(stored.trim().to_string());
        }
        Ok(_) => debug!(path = %path.display(), "stored deployment id is empty"),
        Err(e) => debug!(path = %path.display(), error = %e, "no stored deployment id"),
    }

    let id = uuid::Uuid::new_v4().to_string();

    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), error = %e, "failed to create deployment id directory");
            return None;
        }
    }
    if let Err(e) = tokio::fs::write(path, &id).await {
        warn!(path = %path.display(), error = %e, "failed to write deployment id");
        return None;
    }

    debug!(deployment_id = %id, "generated deployment id");
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_id_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployment_id");
        std::fs::write(&path, "stored").unwrap();

        let id = resolve_deployment_id(Some(" explicit "), &path).await;
        assert_eq!(id.as_deref(), Some("explicit"));
    }

    #[tokio::test]
    async fn test_stored_id_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployment_id");
        std::fs::write(&path, "stored-id\n").unwrap();

        let id = resolve_deployment_id(None, &path).await;
        assert_eq!(id.as_deref(), Some("stored-id"));
    }

    #[tokio::test]
    async fn test_new_id_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deployment_id");

        let first = resolve_deployment_id(None, &path).await.unwrap();
        assert!(uuid::Uuid::parse_str(&first).is_ok());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);

        let second = resolve_deployment_id(Some(""), &path).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unwritable_location_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let id = resolve_deployment_id(None, &blocker.join("deployment_id")).await;
        assert!(id.is_none());
    }
}
