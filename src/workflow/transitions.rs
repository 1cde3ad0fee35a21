// Static transition tables and the validator that consults them.
//
// One parameterized table serves both entity types; the per-type knowledge
// lives entirely in the two constructors. No dynamic rules: the machines are
// small, enumerable, and hard-coded.

use std::collections::{HashMap, HashSet};

use super::types::{ActorType, JobState, OrderState, TransitionClass, WorkflowState};

/// What the validator says about a requested transition before any store
/// write happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionRuling {
    /// Requested state equals the current state; callers treat this as a
    /// safe no-op so retries of the same request cannot fail.
    NoOp,
    /// Edge exists and the actor class is the legitimate driver for it.
    Allowed(TransitionClass),
    /// Edge exists but is admin-manual and the actor is not an admin.
    AdminRequired,
    /// No such edge, or the actor class is not the legitimate driver.
    Rejected,
}

/// Adjacency table for one entity type: edges with their transition class,
/// the SLA-pause flag set, and the fixed subset of states that external
/// stakeholders are told about.
pub struct TransitionTable<S> {
    initial: S,
    edges: HashMap<S, Vec<(S, TransitionClass)>>,
    sla_paused: HashSet<S>,
    notify: HashMap<S, &'static str>,
}

impl<S: WorkflowState> TransitionTable<S> {
    fn build(
        initial: S,
        edge_list: &[(S, S, TransitionClass)],
        sla_paused: &[S],
        notify: &[(S, &'static str)],
    ) -> Self {
        let mut edges: HashMap<S, Vec<(S, TransitionClass)>> = HashMap::new();
        for (from, to, class) in edge_list {
            edges.entry(*from).or_default().push((*to, *class));
        }
        Self {
            initial,
            edges,
            sla_paused: sla_paused.iter().copied().collect(),
            notify: notify.iter().copied().collect(),
        }
    }

    pub fn initial(&self) -> S {
        self.initial
    }

    fn edge(&self, current: S, requested: S) -> Option<TransitionClass> {
        self.edges
            .get(&current)
            .and_then(|outgoing| outgoing.iter().find(|(to, _)| *to == requested))
            .map(|(_, class)| *class)
    }

    pub fn is_valid(&self, current: S, requested: S) -> bool {
        self.edge(current, requested).is_some()
    }

    pub fn requires_privileged_actor(&self, current: S, requested: S) -> bool {
        matches!(self.edge(current, requested), Some(TransitionClass::AdminManual))
    }

    /// Legal next states out of `current`, in table order. Returned in
    /// rejection errors for client debugging.
    pub fn allowed_next(&self, current: S) -> Vec<S> {
        self.edges
            .get(&current)
            .map(|outgoing| outgoing.iter().map(|(to, _)| *to).collect())
            .unwrap_or_default()
    }

    /// A state with no outgoing edges.
    pub fn is_terminal(&self, state: S) -> bool {
        self.edges.get(&state).map(|e| e.is_empty()).unwrap_or(true)
    }

    /// Whether the external SLA clock stops accruing in this state.
    pub fn pauses_sla(&self, state: S) -> bool {
        self.sla_paused.contains(&state)
    }

    /// Template key for states external stakeholders must be told about.
    pub fn notification_template(&self, state: S) -> Option<&'static str> {
        self.notify.get(&state).copied()
    }

    /// Full validator verdict for (current, requested, actor).
    pub fn evaluate(&self, current: S, requested: S, actor: ActorType) -> TransitionRuling {
        if current == requested {
            return TransitionRuling::NoOp;
        }
        let Some(class) = self.edge(current, requested) else {
            return TransitionRuling::Rejected;
        };
        match class {
            TransitionClass::AdminManual if actor != ActorType::Admin => {
                TransitionRuling::AdminRequired
            }
            _ if actor != class.permitted_actor() => TransitionRuling::Rejected,
            _ => TransitionRuling::Allowed(class),
        }
    }
}

impl TransitionTable<OrderState> {
    pub fn orders() -> Self {
        use OrderState::*;
        use TransitionClass::*;
        Self::build(
            Created,
            &[
                (Created, InternalReview, System),
                (InternalReview, PendingCustomer, System),
                (InternalReview, InProgress, System),
                (PendingCustomer, InProgress, ExternalActor),
                (InProgress, Delivered, System),
                (Delivered, Completed, ExternalActor),
                (Delivered, InProgress, AdminManual),
                (Created, OnHold, AdminManual),
                (InternalReview, OnHold, AdminManual),
                (PendingCustomer, OnHold, AdminManual),
                (InProgress, OnHold, AdminManual),
                (OnHold, InProgress, AdminManual),
                (Created, Cancelled, AdminManual),
                (InternalReview, Cancelled, AdminManual),
                (PendingCustomer, Cancelled, AdminManual),
                (InProgress, Cancelled, AdminManual),
                (OnHold, Cancelled, AdminManual),
                (Delivered, Cancelled, AdminManual),
            ],
            &[PendingCustomer, OnHold],
            &[
                (PendingCustomer, "order_pending_customer"),
                (Delivered, "order_delivered"),
                (Completed, "order_completed"),
                (Cancelled, "order_cancelled"),
            ],
        )
    }
}

impl TransitionTable<JobState> {
    pub fn provisioning_jobs() -> Self {
        use JobState::*;
        use TransitionClass::*;
        // Welcome email and admin alert are runner step outcomes with their
        // own idempotency keys, so jobs have no state-broadcast subset here.
        Self::build(
            PaymentConfirmed,
            &[
                (PaymentConfirmed, ProvisioningStarted, System),
                (ProvisioningStarted, ProvisioningCompleted, System),
                (ProvisioningStarted, Failed, System),
                (ProvisioningCompleted, WelcomeEmailSent, System),
                (Failed, PaymentConfirmed, System),
            ],
            &[],
            &[],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_happy_path_is_valid() {
        let table = TransitionTable::orders();
        assert_eq!(table.initial(), OrderState::Created);
        assert!(table.is_valid(OrderState::Created, OrderState::InternalReview));
        assert!(table.is_valid(OrderState::InternalReview, OrderState::InProgress));
        assert!(table.is_valid(OrderState::InProgress, OrderState::Delivered));
        assert!(table.is_valid(OrderState::Delivered, OrderState::Completed));
    }

    #[test]
    fn order_skipping_states_is_invalid() {
        let table = TransitionTable::orders();
        assert!(!table.is_valid(OrderState::Created, OrderState::Completed));
        assert!(!table.is_valid(OrderState::InternalReview, OrderState::Completed));
        assert!(!table.is_valid(OrderState::Created, OrderState::Delivered));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let table = TransitionTable::orders();
        assert!(table.is_terminal(OrderState::Completed));
        assert!(table.is_terminal(OrderState::Cancelled));
        assert!(!table.is_terminal(OrderState::Delivered));
        for state in OrderState::ALL {
            if table.is_terminal(*state) {
                assert!(table.allowed_next(*state).is_empty());
            }
        }
    }

    #[test]
    fn cancel_is_admin_manual_from_every_non_terminal_state() {
        let table = TransitionTable::orders();
        for state in OrderState::ALL {
            if table.is_terminal(*state) {
                continue;
            }
            assert!(
                table.requires_privileged_actor(*state, OrderState::Cancelled),
                "cancel from {state:?} should require an admin"
            );
        }
    }

    #[test]
    fn evaluate_distinguishes_admin_required_from_rejected() {
        let table = TransitionTable::orders();
        // Admin-manual edge driven by the system: needs privilege.
        assert_eq!(
            table.evaluate(OrderState::InProgress, OrderState::OnHold, ActorType::System),
            TransitionRuling::AdminRequired
        );
        // Same edge driven by an admin: allowed.
        assert_eq!(
            table.evaluate(OrderState::InProgress, OrderState::OnHold, ActorType::Admin),
            TransitionRuling::Allowed(TransitionClass::AdminManual)
        );
        // System edge driven by a customer: rejected outright.
        assert_eq!(
            table.evaluate(OrderState::Created, OrderState::InternalReview, ActorType::Customer),
            TransitionRuling::Rejected
        );
        // No such edge at all.
        assert_eq!(
            table.evaluate(OrderState::Created, OrderState::Completed, ActorType::Admin),
            TransitionRuling::Rejected
        );
        // Same-state request is a no-op, not a rejection.
        assert_eq!(
            table.evaluate(OrderState::Created, OrderState::Created, ActorType::System),
            TransitionRuling::NoOp
        );
    }

    #[test]
    fn sla_pause_flags_cover_waiting_states_only() {
        let table = TransitionTable::orders();
        assert!(table.pauses_sla(OrderState::PendingCustomer));
        assert!(table.pauses_sla(OrderState::OnHold));
        assert!(!table.pauses_sla(OrderState::InProgress));
        assert!(!table.pauses_sla(OrderState::Completed));
    }

    #[test]
    fn notification_subset_is_fixed() {
        let table = TransitionTable::orders();
        assert_eq!(
            table.notification_template(OrderState::Delivered),
            Some("order_delivered")
        );
        assert_eq!(table.notification_template(OrderState::InternalReview), None);
    }

    #[test]
    fn job_machine_is_linear_with_failure_branch() {
        let table = TransitionTable::provisioning_jobs();
        assert_eq!(table.initial(), JobState::PaymentConfirmed);
        assert!(table.is_valid(JobState::PaymentConfirmed, JobState::ProvisioningStarted));
        assert!(table.is_valid(JobState::ProvisioningStarted, JobState::ProvisioningCompleted));
        assert!(table.is_valid(JobState::ProvisioningCompleted, JobState::WelcomeEmailSent));
        // FAILED is reachable from PROVISIONING_STARTED only.
        assert!(table.is_valid(JobState::ProvisioningStarted, JobState::Failed));
        assert!(!table.is_valid(JobState::PaymentConfirmed, JobState::Failed));
        assert!(!table.is_valid(JobState::ProvisioningCompleted, JobState::Failed));
        // Retry reset goes back to the start.
        assert!(table.is_valid(JobState::Failed, JobState::PaymentConfirmed));
        assert!(table.is_terminal(JobState::WelcomeEmailSent));
        assert!(!table.is_terminal(JobState::Failed));
    }
}
