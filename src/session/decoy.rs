use std::sync::Arc;

use crate::crypto::Crypto;

/// Emits fake session cookies under well-known names of other platforms so
/// the real cookie is harder to single out.
pub struct Decoy {
    names: Vec<String>,
    crypto: Arc<dyn Crypto>,
}

impl Decoy {
    pub fn new(names: Vec<String>, crypto: Arc<dyn Crypto>) -> Self {
        Self { names, crypto }
    }

    /// One `Set-Cookie` value per decoy name, each with a fresh random value
    /// shaped like a real session ID.
    pub fn cookies(&self, path: &str) -> Vec<String> {
        self.names
            .iter()
            .map(|name| format!("{name}={}; Path={path}; HttpOnly", self.crypto.random_string(32)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCrypto;

    #[test]
    fn one_cookie_per_name_with_random_values() {
        let decoy = Decoy::new(vec!["PHPSESSID".into(), "JSESSIONID".into()], Arc::new(DefaultCrypto));
        let a = decoy.cookies("/");
        let b = decoy.cookies("/");
        assert_eq!(a.len(), 2);
        assert!(a[0].starts_with("PHPSESSID="));
        assert!(a[1].starts_with("JSESSIONID="));
        assert!(a[0].ends_with("; Path=/; HttpOnly"));
        assert_ne!(a[0], b[0]);
    }
}
