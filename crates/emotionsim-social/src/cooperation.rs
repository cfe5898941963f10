//! Shared goals, tasks, and votes.
//!
//! The coordinator holds the shared-goal list (derived once from persona
//! goals at run start), the task table, and active votes. Tasks become
//! visible to all agents the tick after they are proposed. A vote stays
//! open for exactly one tick after the tick it was called in; when it
//! closes, the majority option is recorded (ties resolved by option order).

use std::collections::BTreeMap;

use emotionsim_types::{AgentId, TaskId, TaskStatus, VoteId, VoteOutcome};

use crate::error::SocialError;

/// A shared cooperation task.
#[derive(Debug, Clone)]
pub struct Task {
    /// Identifier.
    pub id: TaskId,
    /// What needs doing.
    pub description: String,
    /// Priority, 1..=10.
    pub priority: u8,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Agents who accepted the task.
    pub assigned_agents: Vec<AgentId>,
    /// Skills the proposer asked for.
    pub required_skills: Vec<String>,
    /// Progress, 0..=100.
    pub progress: u8,
    /// Who proposed the task.
    pub proposed_by: AgentId,
    /// The step the task was proposed in; visible from the next step.
    pub proposed_at_step: u64,
}

impl Task {
    /// Whether the task is visible to agents at the given step.
    pub const fn visible_at(&self, step: u64) -> bool {
        step > self.proposed_at_step
    }
}

/// An open or closed vote.
#[derive(Debug, Clone)]
pub struct Vote {
    /// Identifier.
    pub id: VoteId,
    /// The proposal text.
    pub proposal: String,
    /// Options in proposal order (the tie-break order).
    pub options: Vec<String>,
    /// Ballots cast so far.
    pub ballots: BTreeMap<AgentId, String>,
    /// The step the vote was called in.
    pub opened_at_step: u64,
    /// The last step during which ballots are accepted.
    pub closes_after_step: u64,
    /// Whether the vote is still accepting ballots.
    pub open: bool,
}

/// Coordinates shared goals, tasks, and votes for one run.
#[derive(Debug, Default)]
pub struct CooperationCoordinator {
    shared_goals: Vec<String>,
    tasks: BTreeMap<TaskId, Task>,
    votes: BTreeMap<VoteId, Vote>,
}

impl CooperationCoordinator {
    /// Create an empty coordinator.
    pub const fn new() -> Self {
        Self {
            shared_goals: Vec::new(),
            tasks: BTreeMap::new(),
            votes: BTreeMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Shared goals
    // -----------------------------------------------------------------------

    /// Derive the shared-goal list from all agents' goals (deduplicated,
    /// declaration order preserved). Called once at run start.
    pub fn derive_goals<'a>(&mut self, all_goals: impl Iterator<Item = &'a String>) {
        for goal in all_goals {
            if !self.shared_goals.contains(goal) {
                self.shared_goals.push(goal.clone());
            }
        }
    }

    /// The shared-goal list.
    pub fn shared_goals(&self) -> &[String] {
        &self.shared_goals
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Propose a task. Priority is clamped to 1..=10. The task becomes
    /// visible to all agents on the next tick.
    pub fn propose_task(
        &mut self,
        agent: AgentId,
        step: u64,
        description: impl Into<String>,
        priority: u8,
        required_skills: Vec<String>,
    ) -> TaskId {
        let id = TaskId::new();
        let task = Task {
            id,
            description: description.into(),
            priority: priority.clamp(1, 10),
            status: TaskStatus::Proposed,
            assigned_agents: Vec::new(),
            required_skills,
            progress: 0,
            proposed_by: agent,
            proposed_at_step: step,
        };
        tracing::debug!(task = %id, %agent, "task proposed");
        self.tasks.insert(id, task);
        id
    }

    /// Accept a task; the first assignee moves it to in-progress.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::TaskNotFound`].
    pub fn accept_task(&mut self, agent: AgentId, task_id: TaskId) -> Result<(), SocialError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SocialError::TaskNotFound(task_id))?;
        if !task.assigned_agents.contains(&agent) {
            task.assigned_agents.push(agent);
        }
        if task.status == TaskStatus::Proposed && !task.assigned_agents.is_empty() {
            task.status = TaskStatus::InProgress;
        }
        Ok(())
    }

    /// Report progress on an assigned task. Progress is clamped to 0..=100;
    /// reaching 100 or reporting completed status completes the task.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::TaskNotFound`] or [`SocialError::NotAssigned`].
    pub fn report_progress(
        &mut self,
        agent: AgentId,
        task_id: TaskId,
        progress: u8,
        status: Option<TaskStatus>,
    ) -> Result<(), SocialError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SocialError::TaskNotFound(task_id))?;
        if !task.assigned_agents.contains(&agent) {
            return Err(SocialError::NotAssigned {
                agent,
                task: task_id,
            });
        }
        task.progress = progress.min(100);
        if task.progress == 100 || status == Some(TaskStatus::Completed) {
            task.status = TaskStatus::Completed;
            tracing::debug!(task = %task_id, %agent, "task completed");
        }
        Ok(())
    }

    /// Look up a task.
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Tasks visible to agents at the given step.
    pub fn visible_tasks(&self, step: u64) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| task.visible_at(step))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Votes
    // -----------------------------------------------------------------------

    /// Open a vote. It accepts ballots during the current step and the
    /// next, then closes when the engine tallies due votes.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::NoOptions`] for an empty option list.
    pub fn call_for_vote(
        &mut self,
        agent: AgentId,
        step: u64,
        proposal: impl Into<String>,
        options: Vec<String>,
    ) -> Result<VoteId, SocialError> {
        if options.is_empty() {
            return Err(SocialError::NoOptions);
        }
        let id = VoteId::new();
        let vote = Vote {
            id,
            proposal: proposal.into(),
            options,
            ballots: BTreeMap::new(),
            opened_at_step: step,
            closes_after_step: step.saturating_add(1),
            open: true,
        };
        tracing::debug!(vote = %id, %agent, "vote opened");
        self.votes.insert(id, vote);
        Ok(id)
    }

    /// Cast (or replace) a ballot.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::VoteNotFound`], [`SocialError::VoteClosed`],
    /// or [`SocialError::InvalidOption`].
    pub fn cast_ballot(
        &mut self,
        agent: AgentId,
        vote_id: VoteId,
        option: &str,
    ) -> Result<(), SocialError> {
        let vote = self
            .votes
            .get_mut(&vote_id)
            .ok_or(SocialError::VoteNotFound(vote_id))?;
        if !vote.open {
            return Err(SocialError::VoteClosed(vote_id));
        }
        if !vote.options.iter().any(|candidate| candidate == option) {
            return Err(SocialError::InvalidOption {
                vote: vote_id,
                option: option.to_owned(),
            });
        }
        vote.ballots.insert(agent, option.to_owned());
        Ok(())
    }

    /// Votes still accepting ballots at the given step.
    pub fn open_votes(&self, step: u64) -> Vec<&Vote> {
        self.votes
            .values()
            .filter(|vote| vote.open && step <= vote.closes_after_step)
            .collect()
    }

    /// Close every vote whose window has passed and return the outcomes.
    ///
    /// The majority option wins; ties resolve in option order. A vote with
    /// no ballots resolves to its first option.
    pub fn close_due_votes(&mut self, step: u64) -> Vec<VoteOutcome> {
        let mut outcomes = Vec::new();
        for vote in self.votes.values_mut() {
            if !vote.open || step < vote.closes_after_step {
                continue;
            }
            vote.open = false;

            let mut counts: BTreeMap<String, u32> = BTreeMap::new();
            for option in vote.ballots.values() {
                let count = counts.entry(option.clone()).or_insert(0);
                *count = count.saturating_add(1);
            }

            // Walk options in declaration order so ties resolve stably.
            let mut winner: Option<(&String, u32)> = None;
            for option in &vote.options {
                let count = counts.get(option).copied().unwrap_or(0);
                let beats = winner.is_none_or(|(_, best)| count > best);
                if beats {
                    winner = Some((option, count));
                }
            }

            let winning_option = winner
                .map(|(option, _)| option.clone())
                .unwrap_or_default();
            tracing::debug!(vote = %vote.id, winner = %winning_option, "vote closed");
            outcomes.push(VoteOutcome {
                vote_id: vote.id,
                proposal: vote.proposal.clone(),
                winning_option,
                counts,
                decided_at_step: step,
            });
        }
        outcomes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn derive_goals_deduplicates() {
        let mut coordinator = CooperationCoordinator::new();
        let goals = vec![
            "find water".to_owned(),
            "stay together".to_owned(),
            "find water".to_owned(),
        ];
        coordinator.derive_goals(goals.iter());
        assert_eq!(
            coordinator.shared_goals(),
            &["find water".to_owned(), "stay together".to_owned()]
        );
    }

    #[test]
    fn proposed_task_visible_next_tick() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let _ = coordinator.propose_task(agent, 3, "build a raft", 7, Vec::new());
        assert!(coordinator.visible_tasks(3).is_empty());
        assert_eq!(coordinator.visible_tasks(4).len(), 1);
    }

    #[test]
    fn priority_is_clamped() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let id = coordinator.propose_task(agent, 1, "task", 0, Vec::new());
        assert_eq!(coordinator.task(&id).unwrap().priority, 1);
        let id = coordinator.propose_task(agent, 1, "task", 99, Vec::new());
        assert_eq!(coordinator.task(&id).unwrap().priority, 10);
    }

    #[test]
    fn accept_moves_task_to_in_progress() {
        let mut coordinator = CooperationCoordinator::new();
        let proposer = AgentId::new();
        let acceptor = AgentId::new();
        let id = coordinator.propose_task(proposer, 1, "task", 5, Vec::new());
        assert!(coordinator.accept_task(acceptor, id).is_ok());
        let task = coordinator.task(&id).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.assigned_agents, vec![acceptor]);
    }

    #[test]
    fn duplicate_accept_is_idempotent() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let id = coordinator.propose_task(agent, 1, "task", 5, Vec::new());
        let _ = coordinator.accept_task(agent, id);
        let _ = coordinator.accept_task(agent, id);
        assert_eq!(coordinator.task(&id).unwrap().assigned_agents.len(), 1);
    }

    #[test]
    fn progress_100_completes() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let id = coordinator.propose_task(agent, 1, "task", 5, Vec::new());
        let _ = coordinator.accept_task(agent, id);
        assert!(coordinator.report_progress(agent, id, 100, None).is_ok());
        assert_eq!(coordinator.task(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn completed_status_completes_at_any_progress() {
        let mut coordinator = CooperationCoordinator::new();
        let agent = AgentId::new();
        let id = coordinator.propose_task(agent, 1, "task", 5, Vec::new());
        let _ = coordinator.accept_task(agent, id);
        assert!(
            coordinator
                .report_progress(agent, id, 40, Some(TaskStatus::Completed))
                .is_ok()
        );
        assert_eq!(coordinator.task(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn unassigned_progress_report_rejected() {
        let mut coordinator = CooperationCoordinator::new();
        let proposer = AgentId::new();
        let stranger = AgentId::new();
        let id = coordinator.propose_task(proposer, 1, "task", 5, Vec::new());
        let result = coordinator.report_progress(stranger, id, 10, None);
        assert!(matches!(result, Err(SocialError::NotAssigned { .. })));
    }

    #[test]
    fn vote_requires_options() {
        let mut coordinator = CooperationCoordinator::new();
        let result = coordinator.call_for_vote(AgentId::new(), 1, "where to go", Vec::new());
        assert!(matches!(result, Err(SocialError::NoOptions)));
    }

    #[test]
    fn vote_majority_wins() {
        let mut coordinator = CooperationCoordinator::new();
        let caller = AgentId::new();
        let id = coordinator
            .call_for_vote(
                caller,
                1,
                "destination",
                vec!["north".to_owned(), "south".to_owned()],
            )
            .unwrap();
        let _ = coordinator.cast_ballot(AgentId::new(), id, "south");
        let _ = coordinator.cast_ballot(AgentId::new(), id, "south");
        let _ = coordinator.cast_ballot(AgentId::new(), id, "north");

        // Not yet due at the opening step.
        assert!(coordinator.close_due_votes(1).is_empty());
        let outcomes = coordinator.close_due_votes(2);
        assert_eq!(outcomes.len(), 1);
        let outcome = outcomes.first().unwrap();
        assert_eq!(outcome.winning_option, "south");
        assert_eq!(outcome.counts.get("south"), Some(&2));
    }

    #[test]
    fn vote_tie_resolves_by_option_order() {
        let mut coordinator = CooperationCoordinator::new();
        let id = coordinator
            .call_for_vote(
                AgentId::new(),
                1,
                "destination",
                vec!["north".to_owned(), "south".to_owned()],
            )
            .unwrap();
        let _ = coordinator.cast_ballot(AgentId::new(), id, "south");
        let _ = coordinator.cast_ballot(AgentId::new(), id, "north");
        let outcomes = coordinator.close_due_votes(2);
        assert_eq!(
            outcomes.first().map(|o| o.winning_option.as_str()),
            Some("north")
        );
    }

    #[test]
    fn ballot_after_close_rejected() {
        let mut coordinator = CooperationCoordinator::new();
        let id = coordinator
            .call_for_vote(AgentId::new(), 1, "q", vec!["yes".to_owned()])
            .unwrap();
        let _ = coordinator.close_due_votes(2);
        let result = coordinator.cast_ballot(AgentId::new(), id, "yes");
        assert!(matches!(result, Err(SocialError::VoteClosed(_))));
    }

    #[test]
    fn invalid_option_rejected() {
        let mut coordinator = CooperationCoordinator::new();
        let id = coordinator
            .call_for_vote(AgentId::new(), 1, "q", vec!["yes".to_owned()])
            .unwrap();
        let result = coordinator.cast_ballot(AgentId::new(), id, "maybe");
        assert!(matches!(result, Err(SocialError::InvalidOption { .. })));
    }

    #[test]
    fn open_votes_visible_during_window() {
        let mut coordinator = CooperationCoordinator::new();
        let _ = coordinator
            .call_for_vote(AgentId::new(), 1, "q", vec!["yes".to_owned()])
            .unwrap();
        assert_eq!(coordinator.open_votes(1).len(), 1);
        assert_eq!(coordinator.open_votes(2).len(), 1);
        assert!(coordinator.open_votes(3).is_empty());
    }
}
