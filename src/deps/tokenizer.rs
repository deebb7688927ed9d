use anyhow::{anyhow, Result};
use tree_sitter::{Language, Parser};

/// Token classification the dependency state machines care about.
/// Everything that is neither a keyword nor a name is reported as
/// `Other` so a machine can observe (and ignore) it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Name,
    Other,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

/// Wraps a tree-sitter grammar as a plain lexical analyzer: the concrete
/// syntax tree is flattened into its leaf tokens, classified by node
/// kind. Grammars name their identifier-like leaves differently, so each
/// tokenizer carries the kinds that count as names.
pub struct Tokenizer {
    language: Language,
    name_kinds: &'static [&'static str],
}

impl Tokenizer {
    pub fn new(language: Language, name_kinds: &'static [&'static str]) -> Self {
        Self {
            language,
            name_kinds,
        }
    }

    pub fn swift() -> Self {
        Self::new(
            tree_sitter_swift::LANGUAGE.into(),
            &["simple_identifier", "identifier", "type_identifier"],
        )
    }

    pub fn tokenize(&self, content: &str) -> Result<Vec<Token>> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|err| anyhow!("grammar rejected by tokenizer: {err}"))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| anyhow!("failed to tokenize file content"))?;

        let mut tokens = Vec::new();
        let mut cursor = tree.root_node().walk();
        let mut done = false;

        while !done {
            let node = cursor.node();
            if node.child_count() == 0 {
                if let Some(token) = self.classify(node, content) {
                    tokens.push(token);
                }
            }

            if node.child_count() > 0 && cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    done = true;
                    break;
                }
            }
        }

        Ok(tokens)
    }

    fn classify(&self, node: tree_sitter::Node<'_>, source: &str) -> Option<Token> {
        let text = node.utf8_text(source.as_bytes()).ok()?.to_string();

        let kind = if self.name_kinds.contains(&node.kind()) {
            TokenKind::Name
        } else if !node.is_named() && text.chars().all(|c| c.is_ascii_alphabetic()) {
            // Anonymous alphabetic leaves are the grammar's keywords;
            // anonymous punctuation falls through to Other.
            TokenKind::Keyword
        } else {
            TokenKind::Other
        };

        Some(Token { kind, text })
    }
}
