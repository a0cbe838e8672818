use std::collections::HashMap;

/// Authenticated caller as handed over by the authentication layer.
///
/// Inserted into the request extensions before the proxy handler runs; a
/// request without one is anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    claims: HashMap<String, Vec<String>>,
    pub access_token: Option<String>,
    pub id_token: Option<String>,
}

impl Principal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claim(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_claim(claim_type, value);
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    pub fn add_claim(&mut self, claim_type: impl Into<String>, value: impl Into<String>) {
        self.claims
            .entry(claim_type.into())
            .or_default()
            .push(value.into());
    }

    /// First non-empty value of `claim_type`
    pub fn claim(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .get(claim_type)?
            .iter()
            .map(String::as_str)
            .find(|value| !value.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_returns_first_non_empty_value() {
        let principal = Principal::new()
            .with_claim("email", "")
            .with_claim("email", "a@example.org")
            .with_claim("email", "b@example.org");
        assert_eq!(principal.claim("email"), Some("a@example.org"));
        assert_eq!(principal.claim("sub"), None);
        assert_eq!(Principal::new().with_claim("sub", "  ").claim("sub"), None);
    }
}
