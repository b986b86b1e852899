//! Error types for the fast-pattern compiler crate.

use std::fmt;

pub type Result<T> = std::result::Result<T, FastPatternError>;

#[derive(Debug, Clone, PartialEq)]
pub enum FastPatternError {
    /// A search engine instance could not be created for the named buffer.
    EngineAllocation(String),
    /// Fewer engines finished compiling than were queued.
    EngineCountMismatch { queued: u32, compiled: u32 },
    /// A rule references a service that has no assigned service id.
    UnknownService(String),
    /// A backend rejected a pattern or failed to build its automaton.
    Compilation(String),
    /// A zero-length pattern was handed to a search engine.
    EmptyPattern,
    /// A rule or option handle does not exist in the rule set.
    InvalidHandle(u32),
}

impl fmt::Display for FastPatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FastPatternError::EngineAllocation(what) => {
                write!(f, "Failed to create a search engine for {what}")
            }
            FastPatternError::EngineCountMismatch { queued, compiled } => {
                write!(f, "Compiled {compiled} of {queued} queued search engines")
            }
            FastPatternError::UnknownService(service) => {
                write!(f, "Service {service} has rules but no service id")
            }
            FastPatternError::Compilation(msg) => write!(f, "Compilation error: {msg}"),
            FastPatternError::EmptyPattern => write!(f, "Empty pattern passed to search engine"),
            FastPatternError::InvalidHandle(id) => write!(f, "Invalid rule set handle: {id}"),
        }
    }
}

impl std::error::Error for FastPatternError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_engine_allocation_display() {
        let error = FastPatternError::EngineAllocation("packet buffer".to_string());
        assert_eq!(
            error.to_string(),
            "Failed to create a search engine for packet buffer"
        );
        assert!(error.source().is_none());
    }

    #[test]
    fn test_engine_count_mismatch_display() {
        let error = FastPatternError::EngineCountMismatch {
            queued: 7,
            compiled: 5,
        };
        assert_eq!(error.to_string(), "Compiled 5 of 7 queued search engines");
    }

    #[test]
    fn test_unknown_service_display() {
        let error = FastPatternError::UnknownService("http".to_string());
        assert_eq!(error.to_string(), "Service http has rules but no service id");
    }

    #[test]
    fn test_compilation_display() {
        let error = FastPatternError::Compilation("bad automaton".to_string());
        assert_eq!(error.to_string(), "Compilation error: bad automaton");
    }

    #[test]
    fn test_empty_pattern_display() {
        let error = FastPatternError::EmptyPattern;
        assert_eq!(error.to_string(), "Empty pattern passed to search engine");
    }

    #[test]
    fn test_invalid_handle_display() {
        let error = FastPatternError::InvalidHandle(19);
        assert_eq!(error.to_string(), "Invalid rule set handle: 19");
    }

    #[test]
    fn test_error_equality() {
        let error1 = FastPatternError::UnknownService("ssh".to_string());
        let error2 = FastPatternError::UnknownService("ssh".to_string());
        let error3 = FastPatternError::UnknownService("smtp".to_string());

        assert_eq!(error1, error2);
        assert_ne!(error1, error3);
        assert_ne!(
            FastPatternError::EmptyPattern,
            FastPatternError::InvalidHandle(0)
        );
    }

    #[test]
    fn test_error_clone() {
        let error = FastPatternError::EngineCountMismatch {
            queued: 3,
            compiled: 1,
        };
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }

    #[test]
    fn test_result_type_alias() {
        fn queue_one() -> Result<u32> {
            Ok(1)
        }

        assert_eq!(queue_one().unwrap(), 1);
    }
}
