//! Grouping of eligible directives into per-backend batches.

use std::collections::BTreeMap;

use super::{Backend, BackendKind, Backends, RequirementDirective};

/// Directives bound for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallBatch {
    pub kind: BackendKind,
    /// Installed with one command each
    pub individual: Vec<RequirementDirective>,
    /// Installed together with a single command
    pub grouped: Vec<RequirementDirective>,
}

impl InstallBatch {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            individual: Vec::new(),
            grouped: Vec::new(),
        }
    }

    /// Add a directive that already carries this backend's alias.
    ///
    /// Pacman resolves every directive separately; the other backends group
    /// directives unless their arguments need per-package translation.
    pub fn add(&mut self, directive: RequirementDirective, backend: &dyn Backend) {
        if self.kind == BackendKind::Pacman || backend.needs_own_command(&directive) {
            self.individual.push(directive);
        } else {
            self.grouped.push(directive);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.individual.is_empty() && self.grouped.is_empty()
    }

    pub fn len(&self) -> usize {
        self.individual.len() + self.grouped.len()
    }
}

/// Batches keyed by backend; iteration follows execution order.
pub type DispatchPlan = BTreeMap<BackendKind, InstallBatch>;

/// Route a directive to `kind`, applying that backend's alias.
///
/// Returns `false` when the directive has nothing to install there.
pub fn route(
    plan: &mut DispatchPlan,
    kind: BackendKind,
    directive: &RequirementDirective,
    backends: &Backends,
) -> bool {
    match directive.for_backend(kind) {
        Some(aliased) => {
            plan.entry(kind)
                .or_insert_with(|| InstallBatch::new(kind))
                .add(aliased, backends.get(kind));
            true
        }
        None => false,
    }
}

/// Route every eligible directive to the environment's backend.
pub fn dispatch(
    directives: &[RequirementDirective],
    kind: BackendKind,
    backends: &Backends,
) -> DispatchPlan {
    let mut plan = DispatchPlan::new();
    for directive in directives {
        route(&mut plan, kind, directive, backends);
    }
    plan
}
