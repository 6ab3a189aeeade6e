//! Session identifier type

use std::fmt;

/// Sentinel at which the session id counter wraps back to zero.
///
/// Ids are only required to be unique among sessions live on one tunnel at
/// one time; the allocator does not check the registry on wrap.
pub const SESSION_ID_MAX: u32 = u32::MAX;

/// Identifies one proxied session on one tunnel.
///
/// Both ends address the same session with the same id; the Local end
/// allocates it and the Server end adopts it from the NewSession request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u32);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Successor in allocation order, wrapping to zero at the sentinel
    pub fn wrapping_next(self) -> Self {
        if self.0 == SESSION_ID_MAX {
            Self(0)
        } else {
            Self(self.0 + 1)
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl From<u32> for SessionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_raw_id() {
        assert_eq!(SessionId::new(42).to_string(), "session-42");
    }

    #[test]
    fn test_wrapping_next() {
        assert_eq!(SessionId::new(7).wrapping_next(), SessionId::new(8));
        assert_eq!(
            SessionId::new(SESSION_ID_MAX).wrapping_next(),
            SessionId::new(0)
        );
    }
}
