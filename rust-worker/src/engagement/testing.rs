//! In-memory `ContactsApi` used by the engagement tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::SegmentIds;
use crate::resend::{Contact, ContactsApi, ResendError};

pub(crate) fn segment_ids() -> SegmentIds {
    SegmentIds {
        high: "seg_high".to_string(),
        medium: "seg_medium".to_string(),
        low: "seg_low".to_string(),
    }
}

#[derive(Default)]
struct State {
    contacts: HashMap<String, Contact>,
    segments: HashMap<String, Vec<String>>,
    pending_failures: u32,
    failure_status: u16,
    mutations: usize,
}

#[derive(Default)]
pub(crate) struct InMemoryContacts {
    state: Mutex<State>,
}

impl InMemoryContacts {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_contact(self, email: &str, id: &str, score: Option<i32>) -> Self {
        self.state.lock().unwrap().contacts.insert(
            email.to_string(),
            Contact {
                id: id.to_string(),
                email: email.to_string(),
                engagement_score: score,
            },
        );
        self
    }

    pub(crate) fn with_segments(self, contact_id: &str, segments: &[&str]) -> Self {
        self.state.lock().unwrap().segments.insert(
            contact_id.to_string(),
            segments.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Make the next `count` calls of any kind fail with `status`.
    pub(crate) fn fail_next_calls(self, count: u32, status: u16) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.pending_failures = count;
            state.failure_status = status;
        }
        self
    }

    pub(crate) fn segments_of(&self, contact_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.segments.get(contact_id).cloned().unwrap_or_default()
    }

    pub(crate) fn score_of(&self, email: &str) -> Option<i32> {
        let state = self.state.lock().unwrap();
        state.contacts.get(email).and_then(|c| c.engagement_score)
    }

    pub(crate) fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    fn check_failure(state: &mut State) -> Result<(), ResendError> {
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(ResendError::Api {
                status: state.failure_status,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContactsApi for InMemoryContacts {
    async fn get_contact(&self, email: &str) -> Result<Option<Contact>, ResendError> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        Ok(state.contacts.get(email).cloned())
    }

    async fn update_contact_engagement(
        &self,
        contact_id: &str,
        score: i32,
    ) -> Result<(), ResendError> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state.mutations += 1;
        if let Some(contact) = state.contacts.values_mut().find(|c| c.id == contact_id) {
            contact.engagement_score = Some(score);
        }
        Ok(())
    }

    async fn list_contact_segments(&self, contact_id: &str) -> Result<Vec<String>, ResendError> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        Ok(state.segments.get(contact_id).cloned().unwrap_or_default())
    }

    async fn add_contact_to_segment(
        &self,
        contact_id: &str,
        segment_id: &str,
    ) -> Result<(), ResendError> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state.mutations += 1;
        let segments = state.segments.entry(contact_id.to_string()).or_default();
        if !segments.iter().any(|s| s == segment_id) {
            segments.push(segment_id.to_string());
        }
        Ok(())
    }

    async fn remove_contact_from_segment(
        &self,
        contact_id: &str,
        segment_id: &str,
    ) -> Result<(), ResendError> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state.mutations += 1;
        if let Some(segments) = state.segments.get_mut(contact_id) {
            segments.retain(|s| s != segment_id);
        }
        Ok(())
    }
}
