//! Splitting a batch of messages between a left and a right sink.
//!
//! By convention the right side is the fallthrough side: messages that do not
//! meet the chooser's criteria, or that could not be evaluated, go right.

use crate::error::{Error, Result};
use crate::message::Message;
use regex::Regex;
use std::fmt;

/// Splits a batch into `(left, right)`.
///
/// A message never comes out on both sides, and each side keeps the input's
/// relative order.
pub trait Chooser: Send + Sync {
    fn choose(&self, messages: Vec<Message>) -> (Vec<Message>, Vec<Message>);
}

/// Sends every message left.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughChooser;

impl Chooser for PassthroughChooser {
    fn choose(&self, messages: Vec<Message>) -> (Vec<Message>, Vec<Message>) {
        (messages, Vec::new())
    }
}

/// Sends every message right.
#[derive(Clone, Copy, Debug, Default)]
pub struct RightPassthroughChooser;

impl Chooser for RightPassthroughChooser {
    fn choose(&self, messages: Vec<Message>) -> (Vec<Message>, Vec<Message>) {
        (Vec::new(), messages)
    }
}

/// Routes messages whose body matches a regular expression to the left.
///
/// When a JMESPath expression is set, the body is parsed as JSON, the
/// expression is run against it, and the JSON-encoded result is matched
/// instead of the raw body. This lets a large document be narrowed down to
/// the one field the pattern cares about.
///
/// Messages without a body are dropped from both sides and therefore never
/// reported back to the caller.
#[derive(Clone)]
pub struct FilterChooser {
    jmespath: Option<jmespath::Expression<'static>>,
    regex: Regex,
}

impl fmt::Debug for FilterChooser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChooser")
            .field("jmespath", &self.jmespath())
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl FilterChooser {
    /// Validates both expressions up front so that a bad filter fails before
    /// any message is received.
    pub fn new(jmespath: Option<&str>, regex: &str) -> Result<Self> {
        let regex = Regex::new(regex).map_err(|e| Error::InvalidPattern(e.to_string()))?;

        let jmespath = jmespath
            .filter(|expr| !expr.is_empty())
            .map(jmespath::compile)
            .transpose()
            .map_err(|e| Error::InvalidQuery(e.to_string()))?;

        Ok(Self { jmespath, regex })
    }

    pub fn jmespath(&self) -> Option<&str> {
        self.jmespath.as_ref().map(|expression| expression.as_str())
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    fn project(
        expression: &jmespath::Expression<'_>,
        body: &str,
    ) -> std::result::Result<String, String> {
        let json: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| format!("could not parse message body as json: {}", e))?;

        let found = expression
            .search(&json)
            .map_err(|e| format!("jmespath threw an error: {}", e))?;

        serde_json::to_string(&*found)
            .map_err(|e| format!("could not convert JMESPath output to JSON: {}", e))
    }
}

impl Chooser for FilterChooser {
    fn choose(&self, messages: Vec<Message>) -> (Vec<Message>, Vec<Message>) {
        let mut left = Vec::with_capacity(messages.len());
        let mut right = Vec::with_capacity(messages.len());

        for message in messages {
            let Some(body) = message.body.as_deref() else {
                log::warn!("message {} has no body, skipping it", message.message_id);
                continue;
            };

            let matched = match &self.jmespath {
                Some(expression) => match Self::project(expression, body) {
                    Ok(projected) => self.regex.is_match(&projected),
                    Err(e) => {
                        log::warn!("{} (message {})", e, message.message_id);
                        log::debug!("message body: {}", body);
                        false
                    }
                },
                None => self.regex.is_match(body),
            };

            if matched {
                left.push(message);
            } else {
                right.push(message);
            }
        }

        (left, right)
    }
}
