//! Pull reconciliation rules.
//!
//! Pure functions deciding what a single remote record does to the local
//! copy. The engine applies the decision; nothing here touches storage.
//!
//! The load-bearing property: unsynced local edits are never overwritten by
//! a remote version that did not start from the same base. Such a remote
//! version is parked in the record's conflict snapshot instead.

use std::cmp::Ordering;

use notevault_core::{ConflictSnapshot, Record, RemoteRecord};

/// What to do with one pulled remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullDecision {
    /// No local record: insert the remote one as synced.
    Insert,
    /// Overwrite local fields with the remote version, mark synced.
    Apply,
    /// Keep local fields, park the remote content in the conflict snapshot.
    Conflict,
    /// Same timestamp and content: the two copies already agree.
    MarkSynced,
    /// Local wins; it goes out in the push phase.
    Push,
    /// Nothing to do.
    Noop,
}

/// Decide how `remote` reconciles against `local`.
///
/// With `strict` off, the rules are exactly:
/// - no local record: [`Insert`](PullDecision::Insert)
/// - remote newer: [`Conflict`](PullDecision::Conflict) if local is unsynced
///   and its base hash differs from the remote hash, otherwise
///   [`Apply`](PullDecision::Apply)
/// - local newer and unsynced: [`Push`](PullDecision::Push)
/// - equal timestamps: [`Noop`](PullDecision::Noop)
///
/// With `strict` on, two gaps are closed:
/// - equal timestamps on an unsynced record with different content conflict
///   (identical content is [`MarkSynced`](PullDecision::MarkSynced))
/// - a newer local record whose base is neither the remote version nor its
///   content conflicts instead of being pushed over a concurrent edit
///
/// A remote version already parked in the conflict snapshot is a no-op.
pub fn decide_pull(local: Option<&Record>, remote: &RemoteRecord, strict: bool) -> PullDecision {
    let Some(local) = local else {
        return PullDecision::Insert;
    };

    if let Some(conflict) = &local.conflict {
        if remote.updated_at <= conflict.remote_updated_at {
            return PullDecision::Noop;
        }
    }

    match remote.updated_at.cmp(&local.updated_at) {
        Ordering::Greater => {
            let diverged = !local.synced
                && local.base_content_hash.as_deref() != Some(remote.content_hash());
            if diverged {
                PullDecision::Conflict
            } else {
                PullDecision::Apply
            }
        }
        Ordering::Less => {
            if local.synced {
                PullDecision::Noop
            } else if strict && pushed_over_concurrent_edit(local, remote) {
                PullDecision::Conflict
            } else {
                PullDecision::Push
            }
        }
        Ordering::Equal => {
            if local.synced {
                PullDecision::Noop
            } else if local.content_hash() == remote.content_hash() {
                if strict {
                    PullDecision::MarkSynced
                } else {
                    PullDecision::Noop
                }
            } else if strict {
                PullDecision::Conflict
            } else {
                PullDecision::Noop
            }
        }
    }
}

/// Local started from a base the relay has since moved away from, and the
/// relay's content is not what local holds either.
fn pushed_over_concurrent_edit(local: &Record, remote: &RemoteRecord) -> bool {
    match local.base_content_hash.as_deref() {
        Some(base) => base != remote.content_hash() && local.content_hash() != remote.content_hash(),
        None => false,
    }
}

/// Whether a local record goes out in the push phase.
///
/// Records with an unresolved conflict never leave the device. Local-only
/// records are always pushed.
pub fn should_push(local: &Record, remote: Option<&RemoteRecord>) -> bool {
    if local.has_conflict() {
        return false;
    }
    match remote {
        None => true,
        Some(remote) => !local.synced && local.updated_at > remote.updated_at,
    }
}

/// `local` with `remote` parked as its conflict snapshot.
///
/// Every other field is left exactly as it was, `updatedAt` included.
pub fn with_conflict(local: &Record, remote: &RemoteRecord) -> Record {
    let mut next = local.clone();
    next.synced = false;
    next.conflict = Some(ConflictSnapshot {
        content: remote.encrypted_content.clone(),
        remote_updated_at: remote.updated_at,
        remote_content_hash: remote.metadata.content_hash.clone(),
    });
    next
}

/// `local` acknowledged as identical to the relay copy.
pub fn as_synced(local: &Record) -> Record {
    let mut next = local.clone();
    next.synced = true;
    next.conflict = None;
    next.base_content_hash = Some(next.metadata.content_hash.clone());
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use notevault_core::{EncryptedField, IdentityId, RecordMetadata};

    fn field(tag: &str) -> EncryptedField {
        EncryptedField {
            ciphertext: tag.into(),
            iv: "AAAAAAAAAAAAAAAA".into(),
            auth_tag: "AAAAAAAAAAAAAAAAAAAAAA==".into(),
        }
    }

    fn local(hash: &str, updated_at: i64, synced: bool, base: Option<&str>) -> Record {
        let mut record = Record::new(
            IdentityId::from_bytes([1; 16]),
            field("title"),
            field(hash),
            None,
            RecordMetadata {
                size: 1,
                content_hash: hash.into(),
            },
            updated_at,
        );
        record.synced = synced;
        record.base_content_hash = base.map(str::to_string);
        record
    }

    fn remote_of(local: &Record, hash: &str, updated_at: i64) -> RemoteRecord {
        let mut remote = local.to_remote();
        remote.encrypted_content = field(hash);
        remote.metadata.content_hash = hash.into();
        remote.updated_at = updated_at;
        remote
    }

    #[test]
    fn test_missing_local_inserts() {
        let l = local("h0", 100, true, Some("h0"));
        let r = remote_of(&l, "h0", 100);
        assert_eq!(decide_pull(None, &r, true), PullDecision::Insert);
    }

    #[test]
    fn test_remote_newer_with_unsynced_divergence_conflicts() {
        let l = local("h-local", 100, false, Some("h0"));
        let r = remote_of(&l, "h1", 200);
        assert_eq!(decide_pull(Some(&l), &r, false), PullDecision::Conflict);
        assert_eq!(decide_pull(Some(&l), &r, true), PullDecision::Conflict);
    }

    #[test]
    fn test_remote_newer_over_synced_applies_regardless_of_hash() {
        let l = local("h0", 100, true, Some("something else"));
        let r = remote_of(&l, "h1", 200);
        assert_eq!(decide_pull(Some(&l), &r, true), PullDecision::Apply);
    }

    #[test]
    fn test_remote_newer_from_same_base_applies() {
        let l = local("h-local", 100, false, Some("h1"));
        let r = remote_of(&l, "h1", 200);
        assert_eq!(decide_pull(Some(&l), &r, true), PullDecision::Apply);
    }

    #[test]
    fn test_never_synced_local_conflicts_with_newer_remote() {
        let l = local("h-local", 100, false, None);
        let r = remote_of(&l, "h1", 200);
        assert_eq!(decide_pull(Some(&l), &r, true), PullDecision::Conflict);
    }

    #[test]
    fn test_local_newer_pushes() {
        let l = local("h2", 300, false, Some("h1"));
        let r = remote_of(&l, "h1", 200);
        assert_eq!(decide_pull(Some(&l), &r, true), PullDecision::Push);
        assert!(should_push(&l, Some(&r)));
    }

    #[test]
    fn test_local_newer_on_stale_base() {
        let l = local("h2", 300, false, Some("h0"));
        let r = remote_of(&l, "h1", 200);
        assert_eq!(decide_pull(Some(&l), &r, false), PullDecision::Push);
        assert_eq!(decide_pull(Some(&l), &r, true), PullDecision::Conflict);
    }

    #[test]
    fn test_local_newer_but_synced_is_noop() {
        let l = local("h2", 300, true, Some("h2"));
        let r = remote_of(&l, "h1", 200);
        assert_eq!(decide_pull(Some(&l), &r, true), PullDecision::Noop);
        assert!(!should_push(&l, Some(&r)));
    }

    #[test]
    fn test_equal_timestamps() {
        let same = local("h1", 200, false, Some("h0"));
        let r = remote_of(&same, "h1", 200);
        assert_eq!(decide_pull(Some(&same), &r, true), PullDecision::MarkSynced);
        assert_eq!(decide_pull(Some(&same), &r, false), PullDecision::Noop);

        let different = local("h2", 200, false, Some("h0"));
        let r = remote_of(&different, "h1", 200);
        assert_eq!(decide_pull(Some(&different), &r, true), PullDecision::Conflict);
        assert_eq!(decide_pull(Some(&different), &r, false), PullDecision::Noop);

        let synced = local("h2", 200, true, Some("h2"));
        let r = remote_of(&synced, "h1", 200);
        assert_eq!(decide_pull(Some(&synced), &r, true), PullDecision::Noop);
    }

    #[test]
    fn test_known_conflict_is_not_recorded_twice() {
        let l = local("h-local", 100, false, Some("h0"));
        let r = remote_of(&l, "h1", 200);
        let conflicted = with_conflict(&l, &r);

        assert_eq!(decide_pull(Some(&conflicted), &r, true), PullDecision::Noop);

        let newer = remote_of(&l, "h3", 300);
        assert_eq!(decide_pull(Some(&conflicted), &newer, true), PullDecision::Conflict);
    }

    #[test]
    fn test_with_conflict_keeps_local_fields() {
        let l = local("h-local", 100, false, Some("h0"));
        let r = remote_of(&l, "h1", 200);
        let conflicted = with_conflict(&l, &r);

        assert_eq!(conflicted.encrypted_content, l.encrypted_content);
        assert_eq!(conflicted.updated_at, l.updated_at);
        assert_eq!(conflicted.base_content_hash, l.base_content_hash);
        assert!(!conflicted.synced);

        let snapshot = conflicted.conflict.unwrap();
        assert_eq!(snapshot.content, r.encrypted_content);
        assert_eq!(snapshot.remote_updated_at, 200);
        assert_eq!(snapshot.remote_content_hash, "h1");
    }

    #[test]
    fn test_conflicted_and_local_only_push_rules() {
        let l = local("h-local", 100, false, Some("h0"));
        let r = remote_of(&l, "h1", 50);
        assert!(should_push(&l, None));
        assert!(!should_push(&with_conflict(&l, &r), None));

        let synced = as_synced(&l);
        assert!(should_push(&synced, None));
        assert_eq!(synced.base_content_hash.as_deref(), Some("h-local"));
    }

    proptest::proptest! {
        #[test]
        fn test_newer_remote_never_overwrites_unsynced_divergence(
            updated_at in 0i64..1_000_000,
            ahead in 1i64..1_000_000,
            strict in proptest::bool::ANY,
        ) {
            let l = local("h-local", updated_at, false, Some("h0"));
            let r = remote_of(&l, "h1", updated_at + ahead);
            proptest::prop_assert_eq!(decide_pull(Some(&l), &r, strict), PullDecision::Conflict);
        }

        #[test]
        fn test_newer_remote_over_synced_always_applies(
            updated_at in 0i64..1_000_000,
            ahead in 1i64..1_000_000,
            strict in proptest::bool::ANY,
        ) {
            let l = local("h-local", updated_at, true, Some("h-local"));
            let r = remote_of(&l, "h1", updated_at + ahead);
            proptest::prop_assert_eq!(decide_pull(Some(&l), &r, strict), PullDecision::Apply);
        }
    }
}
