use serde_json::Value;

use super::{EXPIRE_REQUESTS, EXPIRE_SECONDS, LAST_ACTIVITY, Session, SessionData};

/// Session-ID refresh budget: a number of requests and/or active seconds.
///
/// Counters are initialized on the first start, decremented on every later
/// start, and reset when either budget runs out. [`Expiration::check`]
/// reports exhaustion so the caller can issue a new session ID.
#[derive(Clone, Copy, Debug, Default)]
pub struct Expiration {
    requests: Option<u32>,
    seconds: Option<i64>,
}

impl Expiration {
    pub fn new(requests: Option<u32>, seconds: Option<i64>) -> Self {
        Self { requests, seconds }
    }

    /// Advances the counters for a start at unix time `now`. Returns `true`
    /// when the session ID must be refreshed.
    pub fn check(&self, session: &Session, now: i64) -> bool {
        session.with_data(|data| {
            if !data.contains_key(LAST_ACTIVITY) {
                self.reset(data, now);
                return false;
            }

            let mut exhausted = false;
            if let Some(max) = self.requests {
                let left = counter(data, EXPIRE_REQUESTS).unwrap_or(i64::from(max)) - 1;
                exhausted |= left <= 0;
                data.insert(EXPIRE_REQUESTS.to_owned(), Value::from(left));
            }
            if let Some(max) = self.seconds {
                let last = counter(data, LAST_ACTIVITY).unwrap_or(now);
                let left = counter(data, EXPIRE_SECONDS).unwrap_or(max) - (now - last).max(0);
                exhausted |= left <= 0;
                data.insert(EXPIRE_SECONDS.to_owned(), Value::from(left));
            }
            data.insert(LAST_ACTIVITY.to_owned(), Value::from(now));

            if exhausted {
                self.reset(data, now);
            }
            exhausted
        })
    }

    fn reset(&self, data: &mut SessionData, now: i64) {
        if let Some(max) = self.requests {
            data.insert(EXPIRE_REQUESTS.to_owned(), Value::from(max));
        }
        if let Some(max) = self.seconds {
            data.insert(EXPIRE_SECONDS.to_owned(), Value::from(max));
        }
        data.insert(LAST_ACTIVITY.to_owned(), Value::from(now));
    }
}

fn counter(data: &SessionData, key: &str) -> Option<i64> {
    data.get(key).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_budget_refreshes_after_n_requests() {
        let exp = Expiration::new(Some(3), None);
        let session = Session::detached();
        let refreshes: Vec<bool> = (0..7).map(|i| exp.check(&session, 1_000 + i)).collect();
        assert_eq!(refreshes, [false, false, false, true, false, false, true]);
    }

    #[test]
    fn seconds_budget_counts_elapsed_activity() {
        let exp = Expiration::new(None, Some(60));
        let session = Session::detached();
        assert!(!exp.check(&session, 0));
        assert!(!exp.check(&session, 30));
        assert_eq!(session.get::<i64>(EXPIRE_SECONDS), Some(30));
        assert!(exp.check(&session, 61));
        assert_eq!(session.get::<i64>(EXPIRE_SECONDS), Some(60));
    }

    #[test]
    fn unlimited_never_refreshes() {
        let exp = Expiration::default();
        let session = Session::detached();
        assert!((0..10).all(|i| !exp.check(&session, i)));
    }
}
