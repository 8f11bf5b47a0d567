use bitflags::bitflags;

use crate::{Error, ErrorKind, Result};

/// Receive window size, in tokens. Numbers older than this fall off the
/// trailing edge and become unknown again.
const WINDOW_SIZE: u64 = 64;

bitflags! {
    /// Which ordering guarantees this context negotiated.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct SequencePolicy: u8 {
        const REPLAY = 1;
        const SEQUENCE = 2;
    }
}

/// Classification of a received per-message sequence number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    InOrder,
    /// Seen before (exact repeat, or already marked inside the window).
    Duplicate,
    /// Jumped past the expected number; one or more tokens were skipped.
    Gap,
    /// Old number under strict ordering: neither expected nor the last
    /// accepted one.
    OutOfSequence,
    /// Older than the receive window can remember.
    OutOfWindow,
}

/// Tracks peer sequence numbers for one direction of one context.
///
/// Legacy token families carry 4-byte numbers and wrap modulo 2^32; CFX
/// carries 8 bytes. `wide` selects the representation. With an empty policy
/// every number passes through untouched and no state is kept.
#[derive(Debug, Clone)]
pub struct SequenceGuard {
    policy: SequencePolicy,
    wide: bool,
    /// Next number required under strict ordering.
    expected: u64,
    /// Highest number seen; anchor of the sliding window.
    top: u64,
    /// Bit i set = `top - i` was seen.
    bitmap: u64,
    primed: bool,
}

impl SequenceGuard {
    pub fn new(policy: SequencePolicy, wide: bool, initial: u64) -> Self {
        let mask = if wide { u64::MAX } else { u64::from(u32::MAX) };

        Self {
            policy,
            wide,
            expected: initial & mask,
            top: 0,
            bitmap: 0,
            primed: false,
        }
    }

    fn mask(&self) -> u64 {
        if self.wide {
            u64::MAX
        } else {
            u64::from(u32::MAX)
        }
    }

    /// `b` is ahead of `a` in wrapping order.
    fn is_ahead(&self, a: u64, b: u64) -> bool {
        let diff = b.wrapping_sub(a) & self.mask();

        diff != 0 && diff <= self.mask() / 2
    }

    /// Classifies `seen` and updates the window. Callers that need policy
    /// enforcement should use [`SequenceGuard::enforce`].
    pub fn check(&mut self, seen: u64) -> SequenceOutcome {
        if self.policy.is_empty() {
            return SequenceOutcome::InOrder;
        }

        let mask = self.mask();
        let seen = seen & mask;

        if !self.policy.contains(SequencePolicy::REPLAY) {
            return self.check_strict(seen);
        }

        if !self.primed {
            let outcome = self.classify_against_expected(seen);
            self.primed = true;
            self.top = seen;
            self.bitmap = 1;
            self.expected = seen.wrapping_add(1) & mask;

            return outcome;
        }

        let diff = seen.wrapping_sub(self.top) & mask;
        if diff == 0 {
            return SequenceOutcome::Duplicate;
        }

        if diff <= mask / 2 {
            // new window top
            let outcome = self.classify_against_expected(seen);
            if diff >= WINDOW_SIZE {
                self.bitmap = 1;
            } else {
                self.bitmap = (self.bitmap << diff) | 1;
            }
            self.top = seen;
            self.expected = seen.wrapping_add(1) & mask;

            return outcome;
        }

        let lag = self.top.wrapping_sub(seen) & mask;
        if lag >= WINDOW_SIZE {
            SequenceOutcome::OutOfWindow
        } else if self.bitmap >> lag & 1 == 1 {
            SequenceOutcome::Duplicate
        } else {
            self.bitmap |= 1 << lag;
            SequenceOutcome::InOrder
        }
    }

    /// Strict ordering without a replay window: the number must be exactly
    /// the expected one. Rejected numbers leave `expected` alone, so the
    /// legitimate token behind a skipped one is still accepted.
    fn check_strict(&mut self, seen: u64) -> SequenceOutcome {
        let outcome = self.classify_against_expected(seen);

        if outcome == SequenceOutcome::InOrder {
            self.expected = seen.wrapping_add(1) & self.mask();
        }

        outcome
    }

    fn classify_against_expected(&self, seen: u64) -> SequenceOutcome {
        let mask = self.mask();

        if seen == self.expected {
            SequenceOutcome::InOrder
        } else if self.is_ahead(self.expected, seen) {
            SequenceOutcome::Gap
        } else if seen == self.expected.wrapping_sub(1) & mask {
            SequenceOutcome::Duplicate
        } else {
            SequenceOutcome::OutOfSequence
        }
    }

    /// Classifies `seen` and applies the negotiated policy, turning
    /// violations into errors. The accepted classification is returned so
    /// callers can surface advisory outcomes (a tolerated gap, say).
    pub fn enforce(&mut self, seen: u64) -> Result<SequenceOutcome> {
        let outcome = self.check(seen);
        let strict = self.policy.contains(SequencePolicy::SEQUENCE);
        let windowed = self.policy.contains(SequencePolicy::REPLAY);

        match outcome {
            SequenceOutcome::InOrder => Ok(outcome),
            SequenceOutcome::Duplicate => Err(Error::new(
                ErrorKind::DuplicateToken,
                format!("token sequence number {} was already accepted", seen),
            )),
            SequenceOutcome::Gap => {
                if strict && !windowed {
                    Err(Error::new(
                        ErrorKind::GapToken,
                        format!("token sequence number {} skips past the expected one", seen),
                    ))
                } else {
                    warn!(seen, "sequence gap tolerated by replay-window policy");
                    Ok(outcome)
                }
            }
            SequenceOutcome::OutOfSequence => Err(Error::new(
                ErrorKind::UnseqToken,
                format!("token sequence number {} arrived out of order", seen),
            )),
            SequenceOutcome::OutOfWindow => {
                if strict {
                    Err(Error::new(
                        ErrorKind::DuplicateToken,
                        format!("token sequence number {} is below the receive window", seen),
                    ))
                } else {
                    // bounded-window trade-off: too old to remember, accepted
                    warn!(seen, "token older than the replay window accepted");
                    Ok(outcome)
                }
            }
        }
    }
}
