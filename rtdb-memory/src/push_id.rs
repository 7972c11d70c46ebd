//! Chronologically ordered child keys
//!
//! Keys are 20 characters: 8 characters of millisecond timestamp followed by
//! 12 random characters, all drawn from an alphabet whose byte order matches
//! its numeric order. Keys generated within the same millisecond increment
//! the random part, so keys from one generator sort in generation order.

use parking_lot::Mutex;

/// Alphabet in ascending byte order
pub const PUSH_CHARS: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Length of a generated key
pub const PUSH_ID_LEN: usize = 20;

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

#[derive(Debug, Default)]
struct State {
    last_time: i64,
    last_random: [u8; RANDOM_CHARS],
}

/// Generator of push keys
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<State>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a key for the current time.
    pub fn generate(&self) -> String {
        self.generate_at(chrono::Utc::now().timestamp_millis())
    }

    /// Generate a key for `now_millis`.
    ///
    /// A clock that moves backwards is treated as standing still.
    pub fn generate_at(&self, now_millis: i64) -> String {
        let mut state = self.state.lock();
        let now = now_millis.max(state.last_time);

        if now == state.last_time && state.last_time != 0 {
            increment(&mut state.last_random);
        } else {
            state.last_random = random_digits();
        }
        state.last_time = now;

        let mut id = String::with_capacity(PUSH_ID_LEN);
        let mut time_digits = [0u8; TIME_CHARS];
        let mut remaining = now.max(0);
        for digit in time_digits.iter_mut().rev() {
            *digit = (remaining % 64) as u8;
            remaining /= 64;
        }
        id.extend(time_digits.iter().map(|&d| PUSH_CHARS[d as usize] as char));
        id.extend(state.last_random.iter().map(|&d| PUSH_CHARS[d as usize] as char));
        id
    }
}

fn random_digits() -> [u8; RANDOM_CHARS] {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let mut digits = [0u8; RANDOM_CHARS];
    for (digit, byte) in digits.iter_mut().zip(bytes.iter()) {
        *digit = byte % 64;
    }
    digits
}

/// Add one to a base-64 number, carrying leftwards.
fn increment(digits: &mut [u8; RANDOM_CHARS]) {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
}
