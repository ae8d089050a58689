use thiserror::Error;

use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Invalid integer literal '{literal}' at position {position}")]
    InvalidIntegerLiteral { literal: String, position: usize },
}

pub type LexResult<T> = Result<T, LexError>;

/// Pull lexer over Mython source text.
///
/// The first token is read during construction, so [`Lexer::current_token`]
/// is always valid; [`Lexer::next_token`] advances by one token. Once `Eof`
/// has been produced every further call keeps yielding `Eof`.
///
/// Block structure is reported through synthetic `Indent`/`Dedent` tokens.
/// One indentation level is exactly two leading spaces; `line_indent` tracks
/// the depth the current line asks for and `current_indent` the depth already
/// reported, and each call emits at most one `Indent` or `Dedent` until the
/// two agree.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    start_of_line: bool,
    current_indent: usize,
    line_indent: usize,
    current: Token,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> LexResult<Self> {
        let mut lexer = Self {
            input,
            pos: 0,
            start_of_line: true,
            current_indent: 0,
            line_indent: 0,
            current: Token::Eof,
        };
        lexer.read_next_token()?;
        Ok(lexer)
    }

    /// The most recently produced token, without consuming it.
    pub fn current_token(&self) -> &Token {
        &self.current
    }

    /// Advances to the next token and returns it.
    pub fn next_token(&mut self) -> LexResult<&Token> {
        self.read_next_token()?;
        Ok(&self.current)
    }

    fn read_next_token(&mut self) -> LexResult<()> {
        loop {
            let Some(ch) = self.peek_char() else {
                self.read_eof();
                return Ok(());
            };
            if ch == '\n' {
                if self.read_line_end() {
                    return Ok(());
                }
                continue;
            }
            if ch == '#' {
                self.skip_comment();
                continue;
            }
            if ch == ' ' {
                self.read_spaces();
                continue;
            }
            if self.start_of_line && self.current_indent != self.line_indent {
                self.read_indent();
                return Ok(());
            }
            self.read_token(ch)?;
            self.start_of_line = false;
            return Ok(());
        }
    }

    fn next_line_state(&mut self) {
        self.start_of_line = true;
        self.line_indent = 0;
    }

    fn read_eof(&mut self) {
        if !self.start_of_line {
            // Input ended on a non-empty line: close it with one Newline.
            self.next_line_state();
            self.current = Token::Newline;
        } else if self.current_indent > 0 {
            self.current_indent -= 1;
            self.current = Token::Dedent;
        } else {
            self.current = Token::Eof;
        }
    }

    /// Handles a `\n`; returns whether a `Newline` token was produced.
    /// Empty lines are skipped without a token.
    fn read_line_end(&mut self) -> bool {
        self.consume_char();
        let produced = !self.start_of_line;
        self.next_line_state();
        if produced {
            self.current = Token::Newline;
        }
        produced
    }

    fn skip_comment(&mut self) {
        // The terminating newline stays in place for read_line_end.
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn read_spaces(&mut self) {
        let count = self.consume_while(|c| c == ' ');
        if self.start_of_line {
            // Two spaces per level; a stray odd space is discarded.
            self.line_indent = count / 2;
        }
    }

    fn read_indent(&mut self) {
        if self.current_indent < self.line_indent {
            self.current_indent += 1;
            self.current = Token::Indent;
        } else {
            self.current_indent -= 1;
            self.current = Token::Dedent;
        }
    }

    fn read_token(&mut self, ch: char) -> LexResult<()> {
        self.current = if ch.is_ascii_digit() {
            self.read_number()?
        } else if ch.is_alphabetic() || ch == '_' {
            self.read_name()
        } else if ch == '"' || ch == '\'' {
            self.read_string(ch)?
        } else {
            self.read_char_token(ch)
        };
        Ok(())
    }

    fn read_number(&mut self) -> LexResult<Token> {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_digit());
        let literal = &self.input[start..self.pos];
        let value = literal
            .parse::<i32>()
            .map_err(|_| LexError::InvalidIntegerLiteral {
                literal: literal.to_string(),
                position: start,
            })?;
        Ok(Token::Number(value))
    }

    fn read_name(&mut self) -> Token {
        let start = self.pos;
        self.consume_while(|c| c.is_alphanumeric() || c == '_');
        match &self.input[start..self.pos] {
            "class" => Token::Class,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "def" => Token::Def,
            "print" => Token::Print,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "None" => Token::None,
            "True" => Token::True,
            "False" => Token::False,
            name => Token::Id(name.to_string()),
        }
    }

    fn read_string(&mut self, quote: char) -> LexResult<Token> {
        let start = self.pos;
        self.consume_char(); // opening quote
        let mut value = String::new();
        loop {
            let Some(c) = self.consume_char() else {
                return Err(LexError::UnterminatedString { position: start });
            };
            if c == '\\' {
                // Recognized escapes only; anything else after the backslash
                // is discarded.
                match self.consume_char() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    _ => {}
                }
            } else if c == quote {
                return Ok(Token::String(value));
            } else {
                value.push(c);
            }
        }
    }

    fn read_char_token(&mut self, first: char) -> Token {
        self.consume_char();
        let paired = match (first, self.peek_char()) {
            ('=', Some('=')) => Some(Token::Eq),
            ('!', Some('=')) => Some(Token::NotEq),
            ('<', Some('=')) => Some(Token::LessOrEq),
            ('>', Some('=')) => Some(Token::GreaterOrEq),
            _ => None,
        };
        match paired {
            Some(token) => {
                self.consume_char();
                token
            }
            None => Token::Char(first),
        }
    }

    fn consume_while<P>(&mut self, keep_predicate: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
        }
        self.pos - start
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

/// Drains a source text into its full token stream, `Eof` included.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(input)?;
    let mut tokens = vec![lexer.current_token().clone()];
    while !matches!(tokens.last(), Some(Token::Eof)) {
        tokens.push(lexer.next_token()?.clone());
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn id(name: &str) -> Token {
        Token::Id(name.to_string())
    }

    #[test]
    fn lexes_simple_program() {
        let input = indoc! {"
            x = 4 + 4
            print x
        "};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let expected = vec![
            id("x"),
            Token::Char('='),
            Token::Number(4),
            Token::Char('+'),
            Token::Number(4),
            Token::Newline,
            Token::Print,
            id("x"),
            Token::Newline,
            Token::Eof,
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn lexes_keywords_and_two_char_operators() {
        let input = indoc! {"
            if a >= 1 and b <= 2 or not c == d:
              return e != None
        "};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let expected = vec![
            Token::If,
            id("a"),
            Token::GreaterOrEq,
            Token::Number(1),
            Token::And,
            id("b"),
            Token::LessOrEq,
            Token::Number(2),
            Token::Or,
            Token::Not,
            id("c"),
            Token::Eq,
            id("d"),
            Token::Char(':'),
            Token::Newline,
            Token::Indent,
            Token::Return,
            id("e"),
            Token::NotEq,
            Token::None,
            Token::Newline,
            Token::Dedent,
            Token::Eof,
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn emits_one_indent_per_two_spaces() {
        let input = "if True:\n  if False:\n    x = 1\ny = 2\n";
        let tokens = tokenize(input).expect("tokenize should succeed");
        let expected = vec![
            Token::If,
            Token::True,
            Token::Char(':'),
            Token::Newline,
            Token::Indent,
            Token::If,
            Token::False,
            Token::Char(':'),
            Token::Newline,
            Token::Indent,
            id("x"),
            Token::Char('='),
            Token::Number(1),
            Token::Newline,
            Token::Dedent,
            Token::Dedent,
            id("y"),
            Token::Char('='),
            Token::Number(2),
            Token::Newline,
            Token::Eof,
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn blank_lines_and_comments_do_not_affect_indentation() {
        let input = indoc! {"
            if True:
              x = 1
            # full-line comment
              # indented comment

              y = 2  # trailing comment
        "};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let expected = vec![
            Token::If,
            Token::True,
            Token::Char(':'),
            Token::Newline,
            Token::Indent,
            id("x"),
            Token::Char('='),
            Token::Number(1),
            Token::Newline,
            id("y"),
            Token::Char('='),
            Token::Number(2),
            Token::Newline,
            Token::Dedent,
            Token::Eof,
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn closes_open_blocks_at_end_of_input() {
        // No trailing newline: the final line is closed with a Newline before
        // the Dedents are flushed.
        let input = "if True:\n  if True:\n    x = 1";
        let tokens = tokenize(input).expect("tokenize should succeed");
        let tail = &tokens[tokens.len() - 4..];
        assert_eq!(
            tail,
            &[Token::Newline, Token::Dedent, Token::Dedent, Token::Eof]
        );
    }

    #[test]
    fn indents_and_dedents_balance() {
        let input = indoc! {"
            class A:
              def f(x):
                if x:
                  return 1
                return 2
            a = A()
            print a.f(0)
        "};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let indents = tokens.iter().filter(|t| **t == Token::Indent).count();
        let dedents = tokens.iter().filter(|t| **t == Token::Dedent).count();
        assert_eq!(indents, dedents);
    }

    #[test]
    fn odd_leading_space_is_discarded() {
        // Three spaces are one level; the remainder does not count.
        let input = "if True:\n   x = 1\n";
        let tokens = tokenize(input).expect("tokenize should succeed");
        assert_eq!(
            tokens,
            vec![
                Token::If,
                Token::True,
                Token::Char(':'),
                Token::Newline,
                Token::Indent,
                id("x"),
                Token::Char('='),
                Token::Number(1),
                Token::Newline,
                Token::Dedent,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_strings_with_both_quotes_and_escapes() {
        let input = "a = \"ab\\ncd\"\nb = 'it\\'s \\\"q\\\" \\t end'\n";
        let tokens = tokenize(input).expect("tokenize should succeed");
        assert_eq!(tokens[2], Token::String("ab\ncd".to_string()));
        assert_eq!(tokens[6], Token::String("it's \"q\" \t end".to_string()));
    }

    #[test]
    fn unknown_escape_is_discarded() {
        let tokens = tokenize("x = \"a\\zb\"\n").expect("tokenize should succeed");
        assert_eq!(tokens[2], Token::String("ab".to_string()));
    }

    #[test]
    fn unknown_punctuation_becomes_char_token() {
        let tokens = tokenize("x @ y\n").expect("tokenize should succeed");
        assert_eq!(tokens[1], Token::Char('@'));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("x = \"abc").expect_err("expected unterminated string failure");
        assert_eq!(err, LexError::UnterminatedString { position: 4 });
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("n = 99999999999999999999\n").expect_err("expected overflow");
        assert!(err.to_string().contains("Invalid integer literal"));
    }

    #[test]
    fn keeps_yielding_eof_after_end() {
        let mut lexer = Lexer::new("x = 1").expect("lexer should construct");
        while *lexer.current_token() != Token::Eof {
            lexer.next_token().expect("token stream should be valid");
        }
        for _ in 0..3 {
            assert_eq!(*lexer.next_token().expect("steady state"), Token::Eof);
        }
    }

    #[test]
    fn current_token_does_not_consume() {
        let lexer = Lexer::new("print 1\n").expect("lexer should construct");
        assert_eq!(*lexer.current_token(), Token::Print);
        assert_eq!(*lexer.current_token(), Token::Print);
    }

    fn token_text(token: &Token) -> String {
        match token {
            Token::Number(value) => value.to_string(),
            Token::Id(name) => name.clone(),
            Token::Char(c) => c.to_string(),
            Token::String(value) => format!("\"{value}\""),
            Token::Class => "class".to_string(),
            Token::Return => "return".to_string(),
            Token::If => "if".to_string(),
            Token::Else => "else".to_string(),
            Token::Def => "def".to_string(),
            Token::Print => "print".to_string(),
            Token::And => "and".to_string(),
            Token::Or => "or".to_string(),
            Token::Not => "not".to_string(),
            Token::None => "None".to_string(),
            Token::True => "True".to_string(),
            Token::False => "False".to_string(),
            Token::Eq => "==".to_string(),
            Token::NotEq => "!=".to_string(),
            Token::LessOrEq => "<=".to_string(),
            Token::GreaterOrEq => ">=".to_string(),
            Token::Newline | Token::Indent | Token::Dedent | Token::Eof => String::new(),
        }
    }

    fn render_tokens(tokens: &[Token]) -> String {
        let mut source = String::new();
        let mut depth = 0usize;
        let mut at_line_start = true;
        for token in tokens {
            match token {
                Token::Newline => {
                    source.push('\n');
                    at_line_start = true;
                }
                Token::Indent => depth += 1,
                Token::Dedent => depth -= 1,
                Token::Eof => break,
                other => {
                    if at_line_start {
                        source.push_str(&"  ".repeat(depth));
                        at_line_start = false;
                    } else {
                        source.push(' ');
                    }
                    source.push_str(&token_text(other));
                }
            }
        }
        source
    }

    #[test]
    fn token_stream_survives_a_render_round_trip() {
        let input = indoc! {r#"
            class Rect:
              def __init__(w, h):
                self.w = w
                self.h = h
              def area():
                return self.w * self.h
            r = Rect(10, 5)
            print r.area(), "done"
        "#};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let rendered = render_tokens(&tokens);
        let reparsed = tokenize(&rendered).expect("rendered source should tokenize");
        assert_eq!(tokens, reparsed);
    }
}
