// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection session state (spec §4.5): `CONNECTED → IDENTIFIED →
//! JOINED → (active) → LEAVING → CLOSED`. The session struct is the sole
//! owner of its connection; cross-session communication only happens
//! through broadcasts on the pub/sub port.

use crate::model::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Identified,
    Joined,
    Leaving,
    Closed,
}

pub struct Session {
    pub state: SessionState,
    pub user: User,
    pub current_room: Option<String>,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self { state: SessionState::Identified, user, current_room: None }
    }

    pub fn join(&mut self, room_id: &str) {
        self.current_room = Some(room_id.to_owned());
        self.state = SessionState::Joined;
    }

    pub fn leave(&mut self) -> Option<String> {
        let left = self.current_room.take();
        if left.is_some() {
            self.state = SessionState::Identified;
        }
        left
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}
