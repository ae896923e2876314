//! Source registry
//!
//! Maps a reported identity to a persistent source, creating it on first
//! contact. All liveness updates go through here.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::config::CredentialPolicy;
use crate::models::{Source, SourceUpsert, UpsertOutcome};
use crate::store::Store;
use crate::{AppError, AppResult};

/// SHA-256 hex digest; raw credentials are never stored
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SourceRegistry<'a> {
    store: &'a dyn Store,
    policy: CredentialPolicy,
}

impl<'a> SourceRegistry<'a> {
    pub fn new(store: &'a dyn Store, policy: CredentialPolicy) -> Self {
        Self { store, policy }
    }

    /// Find or create the source for `identity` and refresh its `last_seen`.
    ///
    /// Under `CredentialPolicy::Required` a missing credential, or one that
    /// differs from the stored hash, is rejected with `Unauthorized` and the
    /// stored row is left untouched.
    pub async fn resolve_or_create(
        &self,
        identity: &str,
        credential: Option<&str>,
    ) -> AppResult<Source> {
        let credential = credential.map(str::trim).filter(|c| !c.is_empty());
        let required = self.policy == CredentialPolicy::Required;

        if required && credential.is_none() {
            tracing::warn!("Rejected report from '{}': missing credential", identity);
            return Err(AppError::Unauthorized);
        }

        let outcome = self
            .store
            .upsert_source(SourceUpsert {
                name: identity.to_string(),
                credential_hash: credential.map(hash_token),
                seen_at: Utc::now(),
                verify_credential: required,
            })
            .await?;

        match outcome {
            UpsertOutcome::Created(source) => {
                tracing::info!(
                    "Auto-registered source '{}' ({}){}",
                    source.name,
                    source.id,
                    if source.has_credential() { " with credential" } else { "" }
                );
                Ok(source)
            }
            UpsertOutcome::Refreshed(source) => {
                tracing::debug!("Source '{}' seen", source.name);
                Ok(source)
            }
            UpsertOutcome::CredentialMismatch => {
                tracing::warn!("Rejected report from '{}': credential mismatch", identity);
                Err(AppError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_repeated_resolution_keeps_one_source() {
        let store = MemoryStore::new();
        let registry = SourceRegistry::new(&store, CredentialPolicy::Optional);

        let first = registry.resolve_or_create("ws-1", None).await.unwrap();
        let second = registry.resolve_or_create("ws-1", None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.last_seen >= first.last_seen);
        assert_eq!(store.list_sources(0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reports_share_one_source() {
        let store = std::sync::Arc::new(MemoryStore::new());

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let store = std::sync::Arc::clone(&store);
            tasks.spawn(async move {
                let registry = SourceRegistry::new(&*store, CredentialPolicy::Optional);
                let credential = (i % 2 == 0).then(|| format!("token-{}", i));
                registry.resolve_or_create("ws-1", credential.as_deref()).await.unwrap()
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.unwrap());
        }

        let sources = store.list_sources(0, 100).await.unwrap();
        assert_eq!(sources.len(), 1);
        let source = &sources[0];
        assert!(results.iter().all(|s| s.id == source.id));

        // First credential wins and is never replaced
        let stored = source.credential_hash.clone().unwrap();
        assert!((0..32).step_by(2).any(|i| hash_token(&format!("token-{}", i)) == stored));
        assert!(results
            .iter()
            .filter_map(|s| s.credential_hash.as_ref())
            .all(|h| h == &stored));

        let latest = results.iter().map(|s| s.last_seen).max().unwrap();
        assert_eq!(source.last_seen, latest);
    }

    #[tokio::test]
    async fn test_optional_policy_accepts_anything() {
        let store = MemoryStore::new();
        let registry = SourceRegistry::new(&store, CredentialPolicy::Optional);

        let source = registry.resolve_or_create("ws-2", Some("alpha")).await.unwrap();
        assert_eq!(source.credential_hash.as_deref(), Some(hash_token("alpha").as_str()));

        // Mismatch accepted, stored credential kept
        let again = registry.resolve_or_create("ws-2", Some("beta")).await.unwrap();
        assert_eq!(again.credential_hash, source.credential_hash);

        assert_ok!(registry.resolve_or_create("ws-2", None).await);
    }

    #[tokio::test]
    async fn test_required_policy_rejects_missing_and_mismatch() {
        let store = MemoryStore::new();
        let registry = SourceRegistry::new(&store, CredentialPolicy::Required);

        assert!(matches!(
            registry.resolve_or_create("ws-3", None).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            registry.resolve_or_create("ws-3", Some("   ")).await,
            Err(AppError::Unauthorized)
        ));
        assert!(store.find_source_by_name("ws-3").await.unwrap().is_none());

        let source = registry.resolve_or_create("ws-3", Some("alpha")).await.unwrap();
        assert!(matches!(
            registry.resolve_or_create("ws-3", Some("beta")).await,
            Err(AppError::Unauthorized)
        ));

        let stored = store.find_source(source.id).await.unwrap().unwrap();
        assert_eq!(stored.last_seen, source.last_seen);
        assert_ok!(registry.resolve_or_create("ws-3", Some("alpha")).await);
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let hash = hash_token("secret");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash, hash_token("Secret"));
    }
}
