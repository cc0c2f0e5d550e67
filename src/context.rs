use crate::errors::Error;

/// Scope/claims pair a caller presents when requesting a token.
///
/// Two contexts are equivalent iff their scope lists are equal element for
/// element and their claims are equal (both absent counts as equal); the
/// derived `PartialEq` is exactly that rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    scopes: Vec<String>,
    claims: Option<String>,
}

impl RequestContext {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            claims: None,
        }
    }

    pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
        self.claims = Some(claims.into());
        self
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn claims(&self) -> Option<&str> {
        self.claims.as_deref()
    }

    /// Compact form used as the telemetry context field.
    pub(crate) fn label(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Two scope prefixes that must never appear in the same request.
///
/// Scopes addressing distinct token audiences cannot be satisfied by a single
/// bearer token, so a list mixing both families is rejected up front.
#[derive(Clone, Debug)]
pub struct AudienceRule {
    first: String,
    second: String,
}

impl AudienceRule {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Result<Self, Error> {
        let first = first.into();
        let second = second.into();
        if first.is_empty() || second.is_empty() {
            return Err(Error::InvalidArgument(
                "audience prefixes must be non-empty".into(),
            ));
        }
        if first == second {
            return Err(Error::InvalidArgument(
                "audience prefixes must be distinct".into(),
            ));
        }
        Ok(Self { first, second })
    }

    pub fn check(&self, context: &RequestContext) -> Result<(), Error> {
        let hits_first = context.scopes().iter().any(|s| s.starts_with(&self.first));
        let hits_second = context.scopes().iter().any(|s| s.starts_with(&self.second));
        if hits_first && hits_second {
            return Err(Error::InvalidArgument(format!(
                "scopes mix mutually exclusive audiences '{}' and '{}'",
                self.first, self.second
            )));
        }
        Ok(())
    }
}
