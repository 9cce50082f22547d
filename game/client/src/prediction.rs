use novacore::components::velocity_from_input;
use std::collections::VecDeque;

/// Pending inputs are capped; past this the oldest record is dropped while
/// sequence numbering continues.
pub const MAX_PENDING_INPUTS: usize = 64;

/// Positions within this distance of the server's are considered agreeing;
/// no snap-back happens.
pub const POSITION_EPSILON: f32 = 0.5;

#[derive(Debug, Copy, Clone)]
pub struct PendingInput {
    pub sequence: u32,
    pub flags: u16,
    pub timestamp: u32,
    predicted_x: f32,
    predicted_y: f32,
}

/// Client-side prediction of the locally controlled entity. Every sent input
/// is applied immediately with the same deterministic movement rule the
/// server uses, and kept until the server acknowledges it so reconciliation
/// can replay the unacknowledged tail.
pub struct Predictor {
    pending: VecDeque<PendingInput>,
    sequence: u32,
    dt: f32,

    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
}

impl Predictor {
    /// `dt` is the fixed simulation step shared with the server.
    pub fn new(dt: f32) -> Predictor {
        Predictor {
            pending: VecDeque::with_capacity(MAX_PENDING_INPUTS),
            sequence: 0,
            dt,
            x: 0.0,
            y: 0.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
        }
    }

    /// Apply one tick of input locally and record it for replay. Returns the
    /// sequence number to put on the wire.
    pub fn record_input(&mut self, flags: u16, timestamp: u32) -> u32 {
        self.sequence += 1;

        self.advance(flags);

        if self.pending.len() == MAX_PENDING_INPUTS {
            self.pending.pop_front();
        }

        self.pending.push_back(PendingInput {
            sequence: self.sequence,
            flags,
            timestamp,
            predicted_x: self.x,
            predicted_y: self.y,
        });

        self.sequence
    }

    /// Fold in an authoritative snapshot: drop acknowledged inputs, and when
    /// the server position disagrees with what was predicted at the
    /// acknowledged sequence, snap to the server state and replay the rest.
    /// Returns true when a snap-back happened.
    pub fn reconcile(&mut self, server_x: f32, server_y: f32, last_processed: u32) -> bool {
        let mut acked = None;

        while let Some(front) = self.pending.front() {
            if front.sequence > last_processed {
                break;
            }
            acked = self.pending.pop_front();
        }

        let diverged = match acked {
            Some(record) if record.sequence == last_processed => {
                (record.predicted_x - server_x).abs() > POSITION_EPSILON
                    || (record.predicted_y - server_y).abs() > POSITION_EPSILON
            }
            _ => false,
        };

        if !diverged {
            return false;
        }

        self.x = server_x;
        self.y = server_y;

        let unacked = std::mem::replace(&mut self.pending, VecDeque::new());
        for mut record in unacked {
            self.advance(record.flags);
            record.predicted_x = self.x;
            record.predicted_y = self.y;
            self.pending.push_back(record);
        }

        true
    }

    /// Forget all pending inputs and move to a known position. Used on
    /// respawn, session change, or after a long disconnect.
    pub fn reset(&mut self, x: f32, y: f32) {
        self.pending.clear();
        self.x = x;
        self.y = y;
        self.velocity_x = 0.0;
        self.velocity_y = 0.0;
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    fn advance(&mut self, flags: u16) {
        let (vx, vy) = velocity_from_input(flags);

        self.velocity_x = vx;
        self.velocity_y = vy;
        self.x += vx * self.dt;
        self.y += vy * self.dt;
    }
}
