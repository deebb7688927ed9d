use anyhow::Result;

use crate::deps::tokenizer::{Token, TokenKind, Tokenizer};

/// Platform modules never reported as dependencies (matched
/// case-insensitively against the captured name).
pub const SWIFT_STD_MODULES: &[&str] = &["foundation", "uikit", "appkit", "xctest"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unknown,
    Import,
}

/// Dependency parser for Swift source.
///
/// A two-state machine over the token stream: the `import` keyword opens
/// a capture window, the next name token is taken as the module and
/// closes it, any other keyword closes it too. Unrecognized tokens are
/// ignored, which keeps the parser quiet on malformed or partial input.
/// State is reset before and after every parse, so one instance can be
/// reused without leaking output between calls.
pub struct SwiftParser {
    state: State,
    output: Vec<String>,
    denylist: &'static [&'static str],
}

impl Default for SwiftParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SwiftParser {
    pub fn new() -> Self {
        Self::with_denylist(SWIFT_STD_MODULES)
    }

    pub fn with_denylist(denylist: &'static [&'static str]) -> Self {
        Self {
            state: State::Unknown,
            output: Vec::new(),
            denylist,
        }
    }

    pub fn parse(&mut self, content: &str, tokenizer: &Tokenizer) -> Result<Vec<String>> {
        self.reset();

        let tokens = tokenizer.tokenize(content)?;
        for token in &tokens {
            self.process(token);
        }

        let output = std::mem::take(&mut self.output);
        self.reset();
        Ok(output)
    }

    fn reset(&mut self) {
        self.state = State::Unknown;
        self.output.clear();
    }

    fn process(&mut self, token: &Token) {
        match token.kind {
            TokenKind::Keyword => self.process_keyword(&token.text),
            TokenKind::Name => self.process_name(&token.text),
            TokenKind::Other => {}
        }
    }

    fn process_keyword(&mut self, value: &str) {
        self.state = match value {
            "import" => State::Import,
            _ => State::Unknown,
        };
    }

    fn process_name(&mut self, value: &str) {
        if self.state == State::Import {
            self.append(value);
        }
        self.state = State::Unknown;
    }

    fn append(&mut self, dep: &str) {
        let dep = dep.trim();
        if dep.is_empty() {
            return;
        }
        if self
            .denylist
            .iter()
            .any(|module| module.eq_ignore_ascii_case(dep))
        {
            return;
        }
        self.output.push(dep.to_string());
    }
}
