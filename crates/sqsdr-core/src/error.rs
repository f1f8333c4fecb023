use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// A single entry of a batch request that the queue service rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchFailure {
    /// The batch-local id of the rejected entry
    pub id: String,
    pub message: Option<String>,
    /// `true` when the request itself was invalid and retrying cannot help
    pub sender_fault: bool,
}

impl BatchFailure {
    pub fn new(id: impl Into<String>, message: impl Into<String>, sender_fault: bool) -> Self {
        Self {
            id: id.into(),
            message: Some(message.into()),
            sender_fault,
        }
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.id,
            self.message.as_deref().unwrap_or("No Error Message")
        )
    }
}

/// Which side of a pipeline a sink was bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "leftSink"),
            Side::Right => write!(f, "rightSink"),
        }
    }
}

/// The step of a fallthrough run that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    CreateQueue,
    Filter,
    Return,
    DeleteQueue,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::CreateQueue => write!(f, "could not create fallthrough queue"),
            Phase::Filter => write!(f, "failed to pass source messages through the filter"),
            Phase::Return => write!(f, "failed to return fallthrough messages to the source"),
            Phase::DeleteQueue => write!(f, "could not delete fallthrough queue"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    QueueNotFound {
        name: String,
        region: String,
    },
    InvalidPattern(String),
    InvalidQuery(String),
    MalformedMessage(String),
    Service {
        operation: &'static str,
        queue: String,
        message: String,
    },
    BatchFailed {
        context: String,
        failures: Vec<BatchFailure>,
    },
    SinkFailed {
        side: Side,
        source: Box<Error>,
    },
    PipelineFailed {
        left: Box<Error>,
        right: Box<Error>,
    },
    Serialization(Vec<String>),
    Fallthrough {
        phase: Phase,
        queue: String,
        source: Box<Error>,
    },
    /// The handler failed part of a batch and deleting the part it did handle
    /// failed as well
    Unfinished {
        handler: Box<Error>,
        delete: Box<Error>,
    },
    Cancelled,
}

impl Error {
    pub(crate) fn batch(context: impl Into<String>, failures: Vec<BatchFailure>) -> Self {
        Error::BatchFailed {
            context: context.into(),
            failures,
        }
    }

    pub(crate) fn service(
        operation: &'static str,
        queue: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Service {
            operation,
            queue: queue.into(),
            message: message.into(),
        }
    }

    /// The ids of every failed batch entry carried by this error, including
    /// those of wrapped errors.
    pub fn failed_ids(&self) -> Vec<&str> {
        match self {
            Error::BatchFailed { failures, .. } => {
                failures.iter().map(|f| f.id.as_str()).collect()
            }
            Error::SinkFailed { source, .. } | Error::Fallthrough { source, .. } => {
                source.failed_ids()
            }
            Error::PipelineFailed { left, right } => {
                let mut ids = left.failed_ids();
                ids.extend(right.failed_ids());
                ids
            }
            Error::Unfinished { handler, delete } => {
                let mut ids = delete.failed_ids();
                ids.extend(handler.failed_ids());
                ids
            }
            _ => Vec::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::SinkFailed { source, .. } | Error::Fallthrough { source, .. } => {
                source.is_cancelled()
            }
            Error::Unfinished { delete, .. } => delete.is_cancelled(),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QueueNotFound { name, region } => {
                write!(f, "could not find queue with name '{}' in {}", name, region)
            }
            Error::InvalidPattern(msg) => {
                write!(f, "could not compile regular expression: {}", msg)
            }
            Error::InvalidQuery(msg) => {
                write!(f, "could not compile JMESPath expression: {}", msg)
            }
            Error::MalformedMessage(msg) => write!(f, "received malformed message: {}", msg),
            Error::Service {
                operation,
                queue,
                message,
            } => write!(f, "{} failed for {}: {}", operation, queue, message),
            Error::BatchFailed { context, failures } => {
                let joined = failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n============\n");
                write!(f, "{}: {}", context, joined)
            }
            Error::SinkFailed { side, source } => write!(f, "{} error: {}", side, source),
            Error::PipelineFailed { left, right } => write!(f, "{}\n{}", right, left),
            Error::Serialization(failures) => write!(
                f,
                "the following errors occurred while dumping messages: {}",
                failures.join("\n===\n")
            ),
            Error::Fallthrough {
                phase,
                queue,
                source,
            } => write!(f, "{} ({}): {}", phase, queue, source),
            Error::Unfinished { handler, delete } => write!(
                f,
                "{}\nthe batch was only partly handled: {}",
                delete, handler
            ),
            Error::Cancelled => write!(f, "operation was cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SinkFailed { source, .. } | Error::Fallthrough { source, .. } => {
                Some(source.as_ref())
            }
            Error::Unfinished { delete, .. } => Some(delete.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_failures_are_joined_per_id() {
        let err = Error::batch(
            "failed to batch delete messages",
            vec![
                BatchFailure::new("a", "throttled", false),
                BatchFailure {
                    id: "b".to_string(),
                    message: None,
                    sender_fault: false,
                },
            ],
        );

        assert_eq!(
            err.to_string(),
            "failed to batch delete messages: a: throttled\n============\nb: No Error Message"
        );
        assert_eq!(err.failed_ids(), vec!["a", "b"]);
    }

    #[test]
    fn pipeline_failure_labels_both_sides() {
        let err = Error::PipelineFailed {
            left: Box::new(Error::SinkFailed {
                side: Side::Left,
                source: Box::new(Error::service("SendMessageBatch", "dest", "boom")),
            }),
            right: Box::new(Error::SinkFailed {
                side: Side::Right,
                source: Box::new(Error::service("SendMessageBatch", "temp", "bang")),
            }),
        };

        let text = err.to_string();
        assert!(text.contains("rightSink error: SendMessageBatch failed for temp: bang"));
        assert!(text.contains("leftSink error: SendMessageBatch failed for dest: boom"));
    }

    #[test]
    fn cancellation_is_seen_through_wrappers() {
        let err = Error::Fallthrough {
            phase: Phase::Filter,
            queue: "q".to_string(),
            source: Box::new(Error::Cancelled),
        };
        assert!(err.is_cancelled());
        assert!(!Error::InvalidPattern("(".to_string()).is_cancelled());
    }
}
