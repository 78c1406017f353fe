/// Identifies one issued enrichment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Last-request-wins bookkeeping: only the most recently issued token is
/// current, so late results from superseded requests can be dropped.
#[derive(Debug, Clone, Default)]
pub struct RequestSequence {
    latest: u64,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> RequestToken {
        self.latest += 1;
        RequestToken(self.latest)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        token.0 == self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_token_supersedes_older() {
        let mut sequence = RequestSequence::new();
        let first = sequence.issue();
        let second = sequence.issue();

        assert!(first < second);
        assert!(!sequence.is_current(first));
        assert!(sequence.is_current(second));
    }
}
