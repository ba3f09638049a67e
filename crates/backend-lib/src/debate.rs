// ============================
// debate-backend-lib/src/debate.rs
// ============================
//! One debate's lifecycle and vote tally.
//!
//! Every mutable field sits behind a single mutex, so a start or completion
//! transition and a concurrent broadcast tick never observe a torn state.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use debate_common::{ChartData, DebateDetails, ModeratorUpdate, Participant, ServerMessage};
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::error::AppError;

/// Audience entry shown to a moderator while nobody has joined
pub const EMPTY_AUDIENCE: &str = "nobody yet";

/// A registered voter and their current vote
#[derive(Debug, Clone)]
pub struct Voter {
    pub id: String,
    pub name: String,
    pub vote: Option<String>,
}

#[derive(Debug, Default)]
struct DebateState {
    started: bool,
    completed: bool,
    closed: bool,
    start_time: Option<DateTime<Utc>>,
    voters: Vec<Voter>,
    completion: Option<AbortHandle>,
}

#[derive(Debug)]
pub struct Debate {
    session_code: String,
    moderator_id: String,
    participants: Vec<Participant>,
    allowed_duration: Duration,
    state: Mutex<DebateState>,
}

impl Debate {
    /// Participants get ids `p1`, `p2`, ... in the order given.
    pub fn new<I, N>(
        session_code: impl Into<String>,
        moderator_id: impl Into<String>,
        participant_names: I,
        allowed_duration: Duration,
    ) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let participants = participant_names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| Participant {
                id: format!("p{}", idx + 1),
                name: name.into(),
            })
            .collect();

        Self {
            session_code: session_code.into(),
            moderator_id: moderator_id.into(),
            participants,
            allowed_duration,
            state: Mutex::new(DebateState::default()),
        }
    }

    pub fn session_code(&self) -> &str {
        &self.session_code
    }

    pub fn moderator_id(&self) -> &str {
        &self.moderator_id
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn allowed_duration(&self) -> Duration {
        self.allowed_duration
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().start_time
    }

    /// Add a voter and return their id
    pub fn register_voter(&self, name: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.state.lock().voters.push(Voter {
            id: id.clone(),
            name: name.into(),
            vote: None,
        });
        id
    }

    pub fn voter_count(&self) -> usize {
        self.state.lock().voters.len()
    }

    pub fn has_voter(&self, voter_id: &str) -> bool {
        self.state.lock().voters.iter().any(|v| v.id == voter_id)
    }

    pub fn vote_of(&self, voter_id: &str) -> Option<String> {
        self.state
            .lock()
            .voters
            .iter()
            .find(|v| v.id == voter_id)
            .and_then(|v| v.vote.clone())
    }

    /// Overwrite `voter_id`'s vote with `participant`.
    pub fn place_vote(&self, voter_id: &str, participant: &str) -> Result<(), AppError> {
        if !self.participants.iter().any(|p| p.id == participant) {
            return Err(AppError::UnknownParticipant(participant.to_string()));
        }

        let mut state = self.state.lock();
        if state.completed {
            return Err(AppError::DebateCompleted(self.session_code.clone()));
        }
        let voter = state
            .voters
            .iter_mut()
            .find(|v| v.id == voter_id)
            .ok_or_else(|| AppError::VoterNotFound(voter_id.to_string()))?;
        voter.vote = Some(participant.to_string());
        Ok(())
    }

    /// Transition to started and arm the completion timer.
    ///
    /// `on_started` runs while the state lock is held and must not call back
    /// into this debate. `on_complete` runs once, after the allowed duration,
    /// unless the debate is closed first. Returns `false` if the debate was
    /// already started or has been closed; neither callback runs then.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S, C>(self: &Arc<Self>, on_started: S, on_complete: C) -> bool
    where
        S: FnOnce(),
        C: FnOnce(&Debate) + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.started || state.closed {
            return false;
        }
        state.started = true;
        state.start_time = Some(Utc::now());

        let debate = Arc::downgrade(self);
        let duration = self.allowed_duration;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(debate) = debate.upgrade() {
                if debate.complete() {
                    on_complete(&debate);
                }
            }
        });
        state.completion = Some(timer.abort_handle());

        on_started();
        true
    }

    /// Mark a running debate completed. Returns whether this call did it.
    pub fn complete(&self) -> bool {
        let mut state = self.state.lock();
        if !state.started || state.completed || state.closed {
            return false;
        }
        state.completed = true;
        state.completion = None;
        true
    }

    /// Disarm the completion timer; the debate never completes afterwards.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(timer) = state.completion.take() {
            timer.abort();
        }
    }

    /// Reply for a `voter-check-in`
    pub fn check_in_reply(&self) -> ServerMessage {
        let state = self.state.lock();
        if state.completed {
            ServerMessage::End
        } else if state.started {
            ServerMessage::Start
        } else {
            ServerMessage::Pending
        }
    }

    pub fn results(&self) -> ChartData {
        self.tally(&self.state.lock())
    }

    pub fn audience(&self) -> Vec<String> {
        Self::audience_of(&self.state.lock())
    }

    pub fn time_remaining(&self) -> Duration {
        self.remaining(&self.state.lock(), Utc::now())
    }

    /// Consistent snapshot for the polling broadcast
    pub fn moderator_update(&self) -> ModeratorUpdate {
        let state = self.state.lock();
        let now = Utc::now();

        ModeratorUpdate {
            chart_data: self.tally(&state),
            debate_details: DebateDetails {
                allowed_duration: millis(self.allowed_duration),
                start_time: state.start_time.map(|t| t.timestamp_millis()),
                started: state.started,
                completed: state.completed,
                time_remaining: millis(self.remaining(&state, now)),
                duration: format_duration(self.allowed_duration),
            },
            audience: Self::audience_of(&state),
        }
    }

    fn tally(&self, state: &DebateState) -> ChartData {
        let data = self
            .participants
            .iter()
            .map(|p| {
                state
                    .voters
                    .iter()
                    .filter(|v| v.vote.as_deref() == Some(p.id.as_str()))
                    .count() as u32
            })
            .collect();

        ChartData {
            labels: self.participants.iter().map(|p| p.name.clone()).collect(),
            data,
        }
    }

    fn audience_of(state: &DebateState) -> Vec<String> {
        if state.voters.is_empty() {
            vec![EMPTY_AUDIENCE.to_string()]
        } else {
            state.voters.iter().map(|v| v.name.clone()).collect()
        }
    }

    fn remaining(&self, state: &DebateState, now: DateTime<Utc>) -> Duration {
        if state.completed {
            return Duration::ZERO;
        }
        match state.start_time {
            Some(start) => {
                let elapsed = (now - start).to_std().unwrap_or(Duration::ZERO);
                self.allowed_duration.saturating_sub(elapsed)
            },
            None => self.allowed_duration,
        }
    }
}

impl Drop for Debate {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().completion.take() {
            timer.abort();
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `m:ss`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn debate(duration: Duration) -> Arc<Debate> {
        Arc::new(Debate::new("ABCD", "mod-1", ["Ada", "Grace"], duration))
    }

    #[test]
    fn test_participant_ids_follow_order() {
        let debate = debate(Duration::from_secs(60));
        let ids: Vec<_> = debate.participants().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2"]);
    }

    #[test]
    fn test_vote_overwrites() {
        let debate = debate(Duration::from_secs(60));
        let voter = debate.register_voter("Vera");

        debate.place_vote(&voter, "p1").unwrap();
        debate.place_vote(&voter, "p2").unwrap();

        assert_eq!(debate.vote_of(&voter).as_deref(), Some("p2"));
        assert_eq!(debate.results().data, vec![0, 1]);
    }

    #[test]
    fn test_vote_rejections() {
        let debate = debate(Duration::from_secs(60));
        let voter = debate.register_voter("Vera");

        assert!(matches!(
            debate.place_vote("ghost", "p1"),
            Err(AppError::VoterNotFound(_))
        ));
        assert!(matches!(
            debate.place_vote(&voter, "p9"),
            Err(AppError::UnknownParticipant(_))
        ));
        assert_eq!(debate.vote_of(&voter), None);
    }

    #[test]
    fn test_results_tally_per_participant() {
        let debate = debate(Duration::from_secs(60));
        for (name, pick) in [("a", "p1"), ("b", "p1"), ("c", "p2")] {
            let id = debate.register_voter(name);
            debate.place_vote(&id, pick).unwrap();
        }
        debate.register_voter("undecided");

        let results = debate.results();
        assert_eq!(results.labels, vec!["Ada", "Grace"]);
        assert_eq!(results.data, vec![2, 1]);
    }

    #[test]
    fn test_audience_placeholder() {
        let debate = debate(Duration::from_secs(60));
        assert_eq!(debate.audience(), vec![EMPTY_AUDIENCE]);

        debate.register_voter("Vera");
        assert_eq!(debate.audience(), vec!["Vera"]);
    }

    #[test]
    fn test_pending_snapshot() {
        let debate = debate(Duration::from_secs(90));
        let update = debate.moderator_update();

        assert_eq!(debate.check_in_reply(), ServerMessage::Pending);
        assert!(!update.debate_details.started);
        assert_eq!(update.debate_details.start_time, None);
        assert_eq!(update.debate_details.allowed_duration, 90_000);
        assert_eq!(update.debate_details.time_remaining, 90_000);
        assert_eq!(update.debate_details.duration, "1:30");
    }

    #[tokio::test]
    async fn test_start_then_complete() {
        let debate = debate(Duration::from_millis(50));
        let started = Arc::new(AtomicUsize::new(0));
        let ended = Arc::new(AtomicUsize::new(0));

        let on_started = {
            let started = started.clone();
            move || {
                started.fetch_add(1, Ordering::SeqCst);
            }
        };
        let on_complete = {
            let ended = ended.clone();
            move |_: &Debate| {
                ended.fetch_add(1, Ordering::SeqCst);
            }
        };

        assert!(debate.start(on_started, on_complete));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(debate.check_in_reply(), ServerMessage::Start);
        assert!(debate.start_time().is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(debate.check_in_reply(), ServerMessage::End);
        assert_eq!(debate.time_remaining(), Duration::ZERO);

        let voter = debate.register_voter("late");
        assert!(matches!(
            debate.place_vote(&voter, "p1"),
            Err(AppError::DebateCompleted(_))
        ));
    }

    #[tokio::test]
    async fn test_second_start_is_noop() {
        let debate = debate(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            debate.start(
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
                |_| {},
            );
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        debate.close();
    }

    #[tokio::test]
    async fn test_close_disarms_completion() {
        let debate = debate(Duration::from_millis(50));
        let ended = Arc::new(AtomicUsize::new(0));

        let on_complete = {
            let ended = ended.clone();
            move |_: &Debate| {
                ended.fetch_add(1, Ordering::SeqCst);
            }
        };
        assert!(debate.start(|| {}, on_complete));
        debate.close();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ended.load(Ordering::SeqCst), 0);
        assert!(!debate.is_completed());
        assert!(!debate.start(|| {}, |_| {}));
    }

    #[tokio::test]
    async fn test_running_time_remaining_counts_down() {
        let debate = debate(Duration::from_secs(60));
        debate.start(|| {}, |_| {});
        tokio::time::sleep(Duration::from_millis(20)).await;

        let remaining = debate.time_remaining();
        assert!(remaining < Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));
        debate.close();
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(600)), "10:00");
    }
}
