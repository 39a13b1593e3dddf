use std::fmt;

#[derive(Debug)]
pub enum BalancerError {
    InvalidBackendUrl(String),
    UnknownStrategy(String),
}

impl fmt::Display for BalancerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalancerError::InvalidBackendUrl(url) => write!(f, "invalid backend url: {}", url),
            BalancerError::UnknownStrategy(name) => {
                write!(f, "unknown load balancing strategy: {}", name)
            }
        }
    }
}

impl std::error::Error for BalancerError {}
