use std::sync::Arc;

use tracing::warn;

use super::{FINGERPRINT, Session};
use crate::crypto::Crypto;
use crate::error::{Error, Result};
use crate::request::Request;

/// Binds a session to the client that opened it.
///
/// The first start stores a hash of the client IP and/or User-Agent; every
/// later start must reproduce it. A mismatch is treated as hijacking and
/// halts the request.
pub struct Fingerprint {
    ip: bool,
    user_agent: bool,
    crypto: Arc<dyn Crypto>,
}

impl Fingerprint {
    pub fn new(ip: bool, user_agent: bool, crypto: Arc<dyn Crypto>) -> Self {
        Self { ip, user_agent, crypto }
    }

    fn material(&self, req: &Request) -> String {
        let mut parts = Vec::with_capacity(2);
        if self.ip {
            parts.push(req.client_ip().map(|ip| ip.to_string()).unwrap_or_default());
        }
        if self.user_agent {
            parts.push(req.user_agent().unwrap_or_default().to_owned());
        }
        parts.join("|")
    }

    pub fn check(&self, session: &Session, req: &Request) -> Result<()> {
        let material = self.material(req);
        match session.get::<String>(FINGERPRINT) {
            None => {
                session.set(FINGERPRINT, self.crypto.hash(&material));
                Ok(())
            }
            Some(stored) if self.crypto.verify(&material, &stored) => Ok(()),
            Some(_) => {
                warn!(
                    client = ?req.client_ip(),
                    user_agent = req.user_agent(),
                    "session fingerprint mismatch"
                );
                Err(Error::SessionFingerprint)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCrypto;
    use http::Method;

    fn request(ip: &str, ua: &str) -> Request {
        Request::builder(Method::GET, "/")
            .header("user-agent", ua)
            .remote_addr(format!("{ip}:5000").parse().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn first_start_records_then_matches() {
        let fp = Fingerprint::new(true, true, Arc::new(DefaultCrypto));
        let session = Session::detached();
        fp.check(&session, &request("10.0.0.1", "firefox")).unwrap();
        assert!(session.contains(FINGERPRINT));
        fp.check(&session, &request("10.0.0.1", "firefox")).unwrap();
    }

    #[test]
    fn changed_client_is_rejected() {
        let fp = Fingerprint::new(true, true, Arc::new(DefaultCrypto));
        let session = Session::detached();
        fp.check(&session, &request("10.0.0.1", "firefox")).unwrap();
        let err = fp.check(&session, &request("10.0.0.2", "firefox")).unwrap_err();
        assert!(matches!(err, Error::SessionFingerprint));
    }

    #[test]
    fn ip_can_be_left_out() {
        let fp = Fingerprint::new(false, true, Arc::new(DefaultCrypto));
        let session = Session::detached();
        fp.check(&session, &request("10.0.0.1", "firefox")).unwrap();
        fp.check(&session, &request("192.168.1.9", "firefox")).unwrap();
        assert!(fp.check(&session, &request("10.0.0.1", "curl")).is_err());
    }
}
