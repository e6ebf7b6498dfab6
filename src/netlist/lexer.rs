//! Lexer (tokenizer) for SPICE netlists.

use crate::error::{NodalError, Result};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The token's text (braces stripped for variables)
    pub text: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types in a netlist.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A name (component, node, model, keyword)
    Identifier,
    /// A number, possibly with an engineering suffix
    Number,
    /// A dot command (`.TRAN`, `.END`, ...)
    Directive,
    /// A symbolic value `{NAME}`
    Variable,
    /// Open parenthesis '('
    OpenParen,
    /// Close parenthesis ')'
    CloseParen,
    /// Equals sign '='
    Equals,
    /// Newline
    Newline,
    /// End of file
    Eof,
}

/// Lexer for tokenizing netlist input.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    /// No token has been produced on the current line yet
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self::starting_at(input, 1)
    }

    /// Create a lexer whose first line is numbered `line`.
    pub fn starting_at(input: &'a str, line: usize) -> Self {
        Self {
            chars: input.chars().peekable(),
            line,
            column: 1,
            at_line_start: true,
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let Some(&ch) = self.chars.peek() else {
            return Ok(self.token(TokenKind::Eof, String::new(), self.column));
        };

        let start_column = self.column;
        let line_start = std::mem::replace(&mut self.at_line_start, false);

        let token = match ch {
            '\n' => {
                self.advance();
                self.at_line_start = true;
                Token {
                    kind: TokenKind::Newline,
                    text: "\n".to_string(),
                    line: self.line - 1,
                    column: start_column,
                }
            }
            '(' => {
                self.advance();
                self.token(TokenKind::OpenParen, "(".to_string(), start_column)
            }
            ')' => {
                self.advance();
                self.token(TokenKind::CloseParen, ")".to_string(), start_column)
            }
            '=' => {
                self.advance();
                self.token(TokenKind::Equals, "=".to_string(), start_column)
            }
            ',' => {
                // Separator inside argument lists, same as whitespace
                self.advance();
                return self.next_token();
            }
            '{' => {
                self.advance();
                let text = self.read_word();
                if self.chars.peek() != Some(&'}') || text.is_empty() {
                    return Err(NodalError::lexer(self.line, start_column, "unterminated '{' in value"));
                }
                self.advance();
                self.token(TokenKind::Variable, text, start_column)
            }
            _ if is_word_char(ch) => {
                let text = self.read_word();
                let kind = if line_start && text.starts_with('.') && text.len() > 1 {
                    TokenKind::Directive
                } else if parse_value(&text).is_some() {
                    TokenKind::Number
                } else {
                    TokenKind::Identifier
                };
                self.token(kind, text, start_column)
            }
            _ => {
                return Err(NodalError::lexer(
                    self.line,
                    start_column,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };

        Ok(token)
    }

    fn token(&self, kind: TokenKind, text: String, column: usize) -> Token {
        Token {
            kind,
            text,
            line: self.line,
            column,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_to_end_of_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&ch) = self.chars.peek() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else if ch == '*' && self.at_line_start {
                // Whole-line comment
                self.skip_to_end_of_line();
            } else if ch == ';' {
                // Inline comment
                self.skip_to_end_of_line();
            } else {
                break;
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut text = String::new();
        while let Some(&ch) = self.chars.peek() {
            if is_word_char(ch) {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | '+' | 'µ' | '#' | '$' | ':' | '/')
}

/// Parse a number with an optional engineering suffix.
///
/// Suffixes are case-insensitive: `f p n u µ m k meg g t`. Letters after
/// the suffix (units such as `10kohm` or `1uF`) are ignored, as are
/// unit letters with no multiplier (`5V`).
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    let bytes = text.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    // Exponent only when followed by digits
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'-' || bytes[exp_end] == b'+') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    let number: f64 = text[..end].parse().ok()?;
    let suffix = text[end..].to_lowercase();
    if !suffix.chars().all(char::is_alphabetic) {
        return None;
    }

    let multiplier = if suffix.starts_with("meg") {
        1e6
    } else {
        match suffix.chars().next() {
            Some('f') => 1e-15,
            Some('p') => 1e-12,
            Some('n') => 1e-9,
            Some('u') | Some('µ') => 1e-6,
            Some('m') => 1e-3,
            Some('k') => 1e3,
            Some('g') => 1e9,
            Some('t') => 1e12,
            _ => 1.0,
        }
    };

    Some(number * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_value() {
        assert_relative_eq!(parse_value("10k").unwrap(), 10_000.0);
        assert_relative_eq!(parse_value("100n").unwrap(), 100e-9);
        assert_relative_eq!(parse_value("4.7u").unwrap(), 4.7e-6);
        assert_relative_eq!(parse_value("4.7µ").unwrap(), 4.7e-6);
        assert_relative_eq!(parse_value("2.2").unwrap(), 2.2);
        assert_relative_eq!(parse_value("1e-9").unwrap(), 1e-9);
        assert_relative_eq!(parse_value("-5").unwrap(), -5.0);
        assert_relative_eq!(parse_value("3f").unwrap(), 3e-15);
        assert_relative_eq!(parse_value("2T").unwrap(), 2e12);
    }

    #[test]
    fn test_parse_value_case_insensitive_suffix() {
        assert_relative_eq!(parse_value("1Meg").unwrap(), 1e6);
        assert_relative_eq!(parse_value("1MEG").unwrap(), 1e6);
        // Plain M is milli in SPICE
        assert_relative_eq!(parse_value("1M").unwrap(), 1e-3);
        assert_relative_eq!(parse_value("10kohm").unwrap(), 1e4);
        assert_relative_eq!(parse_value("5V").unwrap(), 5.0);
    }

    #[test]
    fn test_parse_value_rejects_names() {
        assert!(parse_value("in").is_none());
        assert!(parse_value("out").is_none());
        assert!(parse_value("n1").is_none());
        assert!(parse_value("1n1").is_none());
    }

    #[test]
    fn test_lexer_basic() {
        let input = "R1 in out 10k";
        let mut lexer = Lexer::new(input);

        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Identifier);
        assert_eq!(tok.text, "R1");

        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Identifier);
        assert_eq!(tok.text, "in");

        lexer.next_token().unwrap();
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Number);
        assert_eq!(tok.column, 11);
    }

    #[test]
    fn test_lexer_directive_and_variable() {
        let mut lexer = Lexer::new(".step param R list 1k 2k\nR1 a 0 {R}");
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Directive);
        assert_eq!(tok.text, ".step");

        let mut last = tok;
        while last.kind != TokenKind::Eof {
            let next = lexer.next_token().unwrap();
            if next.kind == TokenKind::Eof {
                break;
            }
            last = next;
        }
        assert_eq!(last.kind, TokenKind::Variable);
        assert_eq!(last.text, "R");
        assert_eq!(last.line, 2);
    }

    #[test]
    fn test_lexer_comments() {
        let mut lexer = Lexer::new("* a comment\nR1 a 0 1k ; trailing");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Newline);
        assert_eq!(lexer.next_token().unwrap().text, "R1");
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_lexer_unterminated_variable() {
        let mut lexer = Lexer::new("R1 a 0 {R");
        for _ in 0..3 {
            lexer.next_token().unwrap();
        }
        assert!(matches!(lexer.next_token(), Err(NodalError::LexerError { .. })));
    }
}
