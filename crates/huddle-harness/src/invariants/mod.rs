//! Properties every client snapshot must satisfy.
//!
//! Scenario tests assert on specific outcomes; invariants are checked after
//! every step of every scenario, including the randomized ones. A
//! [`SystemSnapshot`] gathers what each client published and an
//! [`InvariantRegistry`] runs its checks over it.

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    MembershipAtomic, PhaseMatchesConnection, RosterAgreement, TimestampsMonotonic,
    TypingRequiresRoom, UniquePermIds,
};
pub use snapshot::{ClientSnapshot, SystemSnapshot};

/// Outcome of a single check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant and what broke it.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Which check failed
    pub invariant: &'static str,
    /// The offending state, in words
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of the whole cluster's published state.
pub trait Invariant: Send + Sync {
    /// Short name used in violation reports.
    fn name(&self) -> &'static str;

    /// `Ok` if the property holds for `state`.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// A set of checks run together.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// No checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that hold at any instant, even mid-transition:
    /// [`MembershipAtomic`], [`UniquePermIds`], [`TimestampsMonotonic`],
    /// [`PhaseMatchesConnection`] and [`TypingRequiresRoom`].
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(MembershipAtomic);
        registry.add(UniquePermIds);
        registry.add(TimestampsMonotonic);
        registry.add(PhaseMatchesConnection);
        registry.add(TypingRequiresRoom);
        registry
    }

    /// [`Self::standard`] plus [`RosterAgreement`], which only holds once
    /// in-flight presence updates have landed.
    pub fn settled() -> Self {
        let mut registry = Self::standard();
        registry.add(RosterAgreement);
        registry
    }

    /// Register another check.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.checks.push(Box::new(invariant));
    }

    /// Run every check, collecting all violations.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.checks.iter().filter_map(|check| check.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Run every check and panic with all violations if any fail.
    #[allow(clippy::panic, reason = "test assertion helper")]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let report: Vec<String> = violations.iter().map(ToString::to_string).collect();
            panic!("invariants broken {context}:\n  {}", report.join("\n  "));
        }
    }

    /// Number of checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether there are no checks.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
