use crate::{ConfigSource, LookupError};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Storage secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Credential(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Obtain the storage credential once at startup: a non-empty local override
/// wins, otherwise `key` is fetched from `source` up to `attempts` times.
pub fn fetch_credential(
    local: Option<String>,
    source: &dyn ConfigSource,
    key: &str,
    attempts: u32,
    backoff: Duration,
) -> Result<Credential, LookupError> {
    if let Some(secret) = local.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        info!("using locally configured storage credential");
        return Ok(Credential(secret));
    }
    let attempts = attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        match source.lookup(key) {
            Ok(v) if !v.trim().is_empty() => {
                info!(source = %source.describe(), key, "fetched storage credential");
                return Ok(Credential(v.trim().to_string()));
            }
            Ok(_) => last = Some(LookupError::Empty { key: key.to_string() }),
            Err(e) => last = Some(e),
        }
        if let Some(e) = &last {
            warn!(source = %source.describe(), key, attempt, attempts, error = %e, "credential lookup failed");
        }
        if attempt < attempts {
            std::thread::sleep(backoff);
        }
    }
    Err(last.unwrap_or(LookupError::Empty { key: key.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        succeed_on: u32,
    }

    impl ConfigSource for Flaky {
        fn lookup(&self, key: &str) -> Result<String, LookupError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.succeed_on {
                Ok(" pw-from-store \n".into())
            } else {
                Err(LookupError::Missing { key: key.into(), source_desc: "flaky".into() })
            }
        }
        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    #[test]
    fn local_override_skips_lookup() {
        let src = Flaky { calls: AtomicU32::new(0), succeed_on: 1 };
        let c = fetch_credential(Some("local".into()), &src, "db-password", 3, Duration::ZERO).unwrap();
        assert_eq!(c.expose(), "local");
        assert_eq!(src.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lookup_is_retried_and_trimmed() {
        let src = Flaky { calls: AtomicU32::new(0), succeed_on: 3 };
        let c = fetch_credential(Some("  ".into()), &src, "db-password", 3, Duration::ZERO).unwrap();
        assert_eq!(c.expose(), "pw-from-store");
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_attempts_fail() {
        let src = Flaky { calls: AtomicU32::new(0), succeed_on: 10 };
        let err = fetch_credential(None, &src, "db-password", 2, Duration::ZERO).unwrap_err();
        assert!(matches!(err, LookupError::Missing { .. }));
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn debug_never_shows_secret() {
        assert_eq!(format!("{:?}", Credential::new("hunter2")), "Credential(***)");
    }
}
