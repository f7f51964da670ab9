//! In-memory transport for pool and delivery tests.

#![allow(clippy::unwrap_used)]

use crate::classify::Disposition;
use crate::config::Credentials;
use crate::transport::{Capability, Connection, Transport};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("broken: {0}")]
    Broken(String),
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    connects: usize,
    failing_connects: usize,
    advertise: bool,
    rejected: HashSet<String>,
    break_on_body: bool,
    fail_resets: bool,
    log: Vec<String>,
    last_body: Option<Vec<u8>>,
}

/// Records every call; behaviour is switched with the setters below.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    pub fn last_body(&self) -> Option<Vec<u8>> {
        self.state().last_body.clone()
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state().failing_connects = count;
    }

    pub fn advertise_all(&self) {
        self.state().advertise = true;
    }

    pub fn reject_recipient(&self, address: &str) {
        self.state().rejected.insert(address.to_string());
    }

    pub fn break_on_body(&self) {
        self.state().break_on_body = true;
    }

    pub fn fail_resets(&self) {
        self.state().fail_resets = true;
    }

    pub fn heal(&self) {
        let mut state = self.state();
        state.break_on_body = false;
        state.fail_resets = false;
        state.rejected.clear();
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, MockError> {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(MockError::Broken("connection refused".into()));
        }
        state.connects += 1;
        state.log.push(format!("connect {id}"));
        Ok(MockConnection {
            id,
            encrypted: false,
            state: Arc::clone(&self.state),
        })
    }

    fn classify(&self, error: &MockError) -> Disposition {
        match error {
            MockError::Rejected(_) => Disposition::Reusable,
            MockError::Broken(_) => Disposition::Broken,
        }
    }
}

#[derive(Debug)]
pub struct MockConnection {
    pub id: usize,
    encrypted: bool,
    state: Arc<Mutex<State>>,
}

impl MockConnection {
    fn record(&self, entry: String) -> MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.log.push(entry);
        state
    }
}

impl Connection for MockConnection {
    type Error = MockError;

    fn supports(&self, capability: Capability) -> bool {
        let advertise = self.state.lock().unwrap().advertise;
        match capability {
            Capability::EncryptedUpgrade => advertise && !self.encrypted,
            Capability::Authentication => advertise,
        }
    }

    async fn upgrade_encrypted(mut self, server_name: &str) -> Result<Self, MockError> {
        drop(self.record(format!("upgrade {} {server_name}", self.id)));
        self.encrypted = true;
        Ok(self)
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), MockError> {
        drop(self.record(format!("auth {} {}", self.id, credentials.username)));
        Ok(())
    }

    async fn declare_sender(&mut self, sender: &str) -> Result<(), MockError> {
        drop(self.record(format!("mail {} {sender}", self.id)));
        Ok(())
    }

    async fn declare_recipient(&mut self, recipient: &str) -> Result<(), MockError> {
        let state = self.record(format!("rcpt {} {recipient}", self.id));
        if state.rejected.contains(recipient) {
            return Err(MockError::Rejected(format!("550 {recipient}")));
        }
        Ok(())
    }

    async fn stream_body(&mut self, body: &[u8]) -> Result<(), MockError> {
        let mut state = self.state.lock().unwrap();
        if state.break_on_body {
            return Err(MockError::Broken("connection reset".into()));
        }
        state.log.push(format!("data {} {}", self.id, body.len()));
        state.last_body = Some(body.to_vec());
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), MockError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_resets {
            return Err(MockError::Broken("reset failed".into()));
        }
        state.log.push(format!("reset {}", self.id));
        Ok(())
    }

    async fn close(self) {
        drop(self.record(format!("close {}", self.id)));
    }
}
