use ocbot_core::Retryable;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TestError {
    pub retryable: bool,
}

impl TestError {
    pub fn transient() -> Self {
        Self { retryable: true }
    }

    pub fn fatal() -> Self {
        Self { retryable: false }
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "test error (retryable={})", self.retryable)
    }
}

impl Retryable for TestError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}
