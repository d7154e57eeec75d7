//! Audit interceptor pipeline.
//!
//! # Responsibility
//! - Stamp creation/modification time and actor on entities at the two
//!   lifecycle points the entity store exposes.
//!
//! # Invariants
//! - "Now" is read when the hook fires, never at the call site.
//! - `before_first_persist` stamps created and updated fields with one instant.
//! - `before_update` never touches `created_at`/`created_by`.
//! - The actor provider is consulted exactly once per audited write.

use crate::store::entity::Entity;
use log::trace;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Source of audit timestamps in Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Highest instant handed out by any [`SystemClock`] in this process.
static LAST_ISSUED_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Wall clock that never repeats or goes backwards.
///
/// Every instance draws from one process-wide floor, so two reads within the
/// same millisecond (or across a wall-clock step back) yield strictly
/// increasing values even when they come from different interceptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);

        let mut previous = LAST_ISSUED_MILLIS.load(Ordering::Acquire);
        loop {
            let next = wall.max(previous.saturating_add(1));
            match LAST_ISSUED_MILLIS.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }
}

/// Identity attributed to an audited write.
pub trait CurrentActor: Send + Sync {
    fn current_actor(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedActor(String);

impl FixedActor {
    pub fn new(actor: impl Into<String>) -> Self {
        Self(actor.into())
    }
}

impl CurrentActor for FixedActor {
    fn current_actor(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Fresh random id per write, for hosts without a session identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomActor;

impl CurrentActor for RandomActor {
    fn current_actor(&self) -> Option<String> {
        Some(Uuid::new_v4().to_string())
    }
}

/// Leaves the actor columns empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousActor;

impl CurrentActor for AnonymousActor {
    fn current_actor(&self) -> Option<String> {
        None
    }
}

pub struct AuditInterceptor {
    clock: Arc<dyn Clock>,
    actor: Arc<dyn CurrentActor>,
}

impl AuditInterceptor {
    pub fn new(clock: Arc<dyn Clock>, actor: Arc<dyn CurrentActor>) -> Self {
        Self { clock, actor }
    }

    /// Uses the process [`SystemClock`] with the given actor provider.
    pub fn with_actor(actor: impl CurrentActor + 'static) -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(actor))
    }

    pub fn before_first_persist<E: Entity>(&self, entity: &mut E) {
        let now = self.clock.now_millis();
        let actor = self.actor.current_actor();
        let audit = entity.audit_mut();
        audit.created_at = Some(now);
        audit.updated_at = Some(now);
        audit.created_by = actor.clone();
        audit.updated_by = actor;
        trace!("event=audit_stamp module=audit hook=first_persist entity={}", E::NAME);
    }

    pub fn before_update<E: Entity>(&self, entity: &mut E) {
        let now = self.clock.now_millis();
        let actor = self.actor.current_actor();
        let audit = entity.audit_mut();
        audit.updated_at = Some(now);
        audit.updated_by = actor;
        trace!("event=audit_stamp module=audit hook=update entity={}", E::NAME);
    }
}

impl Default for AuditInterceptor {
    fn default() -> Self {
        Self::with_actor(RandomActor)
    }
}

#[cfg(test)]
mod tests {
    use super::{AnonymousActor, AuditInterceptor, Clock, FixedActor, SystemClock};
    use crate::model::member::Member;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    struct FrozenClock(AtomicI64);

    impl Clock for FrozenClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn system_clock_is_strictly_monotonic() {
        let clock = SystemClock::new();
        let mut previous = clock.now_millis();
        for _ in 0..1_000 {
            let next = clock.now_millis();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn separate_system_clocks_share_one_monotonic_floor() {
        let first = SystemClock::new();
        let second = SystemClock::new();
        let mut previous = first.now_millis();
        for _ in 0..500 {
            let next = second.now_millis();
            assert!(next > previous, "second clock must not repeat an instant");
            let after = first.now_millis();
            assert!(after > next, "first clock must not repeat an instant");
            previous = after;
        }
    }

    #[test]
    fn first_persist_stamps_both_instants_and_actors() {
        let audit = AuditInterceptor::new(
            Arc::new(FrozenClock(AtomicI64::new(1_700))),
            Arc::new(FixedActor::new("admin")),
        );
        let mut member = Member::new("joy", 25);
        audit.before_first_persist(&mut member);

        assert_eq!(member.audit.created_at, Some(1_700));
        assert_eq!(member.audit.updated_at, Some(1_700));
        assert_eq!(member.audit.created_by.as_deref(), Some("admin"));
        assert_eq!(member.audit.updated_by.as_deref(), Some("admin"));
    }

    #[test]
    fn update_leaves_creation_stamps_untouched() {
        let clock = Arc::new(FrozenClock(AtomicI64::new(10)));
        let audit = AuditInterceptor::new(clock.clone(), Arc::new(FixedActor::new("creator")));
        let mut member = Member::new("joy", 25);
        audit.before_first_persist(&mut member);

        clock.0.store(20, Ordering::SeqCst);
        let editor = AuditInterceptor::new(clock, Arc::new(AnonymousActor));
        editor.before_update(&mut member);

        assert_eq!(member.audit.created_at, Some(10));
        assert_eq!(member.audit.created_by.as_deref(), Some("creator"));
        assert_eq!(member.audit.updated_at, Some(20));
        assert_eq!(member.audit.updated_by, None);
    }
}
