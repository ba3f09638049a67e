// ============================
// debate-backend-lib/src/registry.rs
// ============================
//! Live debates keyed by session code.
use std::sync::Arc;
use std::time::Duration;

use dashmap::{mapref::entry::Entry, DashMap};
use rand::Rng;

use crate::debate::Debate;
use crate::error::AppError;

/// Length of generated session codes
pub const SESSION_CODE_LEN: usize = 4;

/// In-memory debate registry. At most one debate per moderator.
#[derive(Default)]
pub struct DebateRegistry {
    debates: DashMap<String, Arc<Debate>>,
}

impl DebateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new debate for `moderator_id` under a fresh session code,
    /// closing whatever debate the moderator had before.
    pub fn create<I, N>(
        &self,
        moderator_id: &str,
        participant_names: I,
        allowed_duration: Duration,
    ) -> Arc<Debate>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.delete_all_for_moderator(moderator_id);

        let participants: Vec<String> = participant_names.into_iter().map(Into::into).collect();
        loop {
            let code = generate_session_code();
            if let Entry::Vacant(slot) = self.debates.entry(code) {
                let debate = Arc::new(Debate::new(
                    slot.key().clone(),
                    moderator_id,
                    participants,
                    allowed_duration,
                ));
                slot.insert(debate.clone());
                tracing::info!(
                    session_code = %debate.session_code(),
                    moderator_id = %moderator_id,
                    "Debate created"
                );
                return debate;
            }
        }
    }

    /// Like [`create`](Self::create) with a caller-chosen session code.
    pub fn create_with_code<I, N>(
        &self,
        session_code: &str,
        moderator_id: &str,
        participant_names: I,
        allowed_duration: Duration,
    ) -> Result<Arc<Debate>, AppError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        if session_code.is_empty() {
            return Err(AppError::InvalidInput("session code must not be empty".to_string()));
        }
        if let Some(existing) = self.get(session_code) {
            if existing.moderator_id() != moderator_id {
                return Err(AppError::SessionCodeTaken(session_code.to_string()));
            }
        }
        self.delete_all_for_moderator(moderator_id);

        let debate = Arc::new(Debate::new(
            session_code,
            moderator_id,
            participant_names,
            allowed_duration,
        ));
        match self.debates.entry(session_code.to_string()) {
            Entry::Occupied(_) => Err(AppError::SessionCodeTaken(session_code.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(debate.clone());
                Ok(debate)
            },
        }
    }

    pub fn get(&self, session_code: &str) -> Option<Arc<Debate>> {
        self.debates.get(session_code).map(|d| d.value().clone())
    }

    /// Every live debate, in no particular order
    pub fn running_sessions(&self) -> Vec<Arc<Debate>> {
        self.debates.iter().map(|d| d.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.debates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.debates.is_empty()
    }

    /// Remove and close every debate owned by `moderator_id`, returning
    /// their session codes. Closing disarms pending completion timers.
    pub fn delete_all_for_moderator(&self, moderator_id: &str) -> Vec<String> {
        let codes: Vec<String> = self
            .debates
            .iter()
            .filter(|d| d.value().moderator_id() == moderator_id)
            .map(|d| d.key().clone())
            .collect();

        codes
            .into_iter()
            .filter_map(|code| {
                let (code, debate) = self
                    .debates
                    .remove_if(&code, |_, d| d.moderator_id() == moderator_id)?;
                debate.close();
                metrics::counter!(crate::metrics::DEBATE_CLOSED).increment(1);
                tracing::info!(session_code = %code, moderator_id = %moderator_id, "Debate closed");
                Some(code)
            })
            .collect()
    }
}

fn generate_session_code() -> String {
    let mut rng = rand::rng();
    (0..SESSION_CODE_LEN)
        .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
        .collect()
}
