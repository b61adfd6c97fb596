use std::collections::VecDeque;

use crate::error::{Error, ErrorKind, Result};

/// The engine asks questions through this seam and never touches a
/// terminal itself. The binary supplies a stdin-backed implementation;
/// tests script the answers.
pub trait Prompt {
    fn ask(&mut self, question: &str) -> Result<String>;

    /// One-way status line shown to the user, with no answer expected.
    fn notify(&mut self, message: &str);
}

/// `Y`/`y` means yes, anything else means no.
pub fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// Canned answers for tests, consumed in order.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<String>,
    notices: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Questions that were asked, for asserting prompt flow.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    /// Status lines that were shown, for asserting user-facing context.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.asked.push(question.to_string());
        self.answers.pop_front().ok_or_else(|| {
            Error::new(
                ErrorKind::Config,
                format!("no scripted answer left for question: {question}"),
            )
        })
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}
