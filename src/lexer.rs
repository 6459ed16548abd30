use crate::ast::{Span, Token, TokenKind};
use crate::error::Error;

pub struct Lexer<'s> {
    input: &'s str,
    position: usize,
}

impl<'s> Lexer<'s> {
    pub fn new(input: &'s str) -> Self {
        Lexer { input, position: 0 }
    }

    /// Tokenizes the whole input; the parser backtracks over the buffer.
    pub fn tokenize(input: &'s str) -> Result<Vec<Token>, Error> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input[self.position..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parser {
            message: message.into(),
            span: Span::new(self.position, self.position),
        }
    }

    fn is_ident_start(ch: char) -> bool {
        ch.is_alphabetic() || ch == '_' || ch == '$' || ch == '\\'
    }

    fn is_ident_continue(ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_' || ch == '\\'
    }

    fn read_identifier(&mut self) -> Result<String, Error> {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch == '\\' {
                // Escaped identifier character: the next char is taken
                // verbatim.
                self.advance();
                match self.current_char() {
                    Some(escaped) => {
                        result.push(escaped);
                        self.advance();
                    }
                    None => return Err(self.error("unexpected end of input after '\\'")),
                }
            } else if Self::is_ident_continue(ch) || (result.is_empty() && ch == '$') {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Ok(result)
    }

    fn read_string(&mut self, quote: char, raw: bool) -> Result<String, Error> {
        let mut result = String::new();
        self.advance(); // consume opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Ok(result);
                }
                '\\' if !raw => {
                    self.advance();
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('0') => result.push('\0'),
                        Some('\'') => result.push('\''),
                        Some('"') => result.push('"'),
                        Some('\\') => result.push('\\'),
                        Some(ch) => {
                            return Err(self.error(format!("invalid escape sequence: \\{}", ch)))
                        }
                        None => {
                            return Err(self.error("unterminated string: input ends after '\\'"))
                        }
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(self.error("unterminated string: missing closing quote"))
    }

    fn read_number(&mut self) -> Result<TokenKind, Error> {
        // Hex and binary forms carry no decimal point or exponent.
        if self.current_char() == Some('0') {
            match self.peek_char(1) {
                Some('x') | Some('X') => return self.read_radix(16),
                Some('b') | Some('B') => return self.read_radix(2),
                _ => {}
            }
        }

        let mut number = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.'
                && !is_float
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                number.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E') && self.exponent_follows() {
                is_float = true;
                number.push('e');
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.current_char() {
                    number.push(sign);
                    self.advance();
                }
                while let Some(d) = self.current_char() {
                    if d.is_ascii_digit() {
                        number.push(d);
                        self.advance();
                    } else {
                        break;
                    }
                }
                break;
            } else {
                break;
            }
        }

        if is_float {
            number
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal '{}'", number)))
        } else {
            number
                .parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("invalid integer literal '{}'", number)))
        }
    }

    /// True when the char after `e`/`E` starts a valid exponent.
    fn exponent_follows(&self) -> bool {
        match self.peek_char(1) {
            Some(c) if c.is_ascii_digit() => true,
            Some('+') | Some('-') => self.peek_char(2).is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    fn read_radix(&mut self, radix: u32) -> Result<TokenKind, Error> {
        self.advance(); // '0'
        self.advance(); // 'x' or 'b'
        let mut digits = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_digit(radix) {
                digits.push(ch);
                self.advance();
            } else if ch.is_alphanumeric() {
                return Err(self.error(format!(
                    "digit '{}' is not valid in a base-{} literal",
                    ch, radix
                )));
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(self.error(format!("base-{} literal has no digits", radix)));
        }
        i64::from_str_radix(&digits, radix)
            .map(TokenKind::Int)
            .map_err(|_| self.error(format!("integer literal '{}' overflows", digits)))
    }

    /// Maps an identifier to its keyword token, case-insensitively.
    fn keyword(ident: &str) -> Option<TokenKind> {
        match ident.to_lowercase().as_str() {
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            "not" => Some(TokenKind::Not),
            "typeof" => Some(TokenKind::TypeOf),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "null" => Some(TokenKind::Null),
            "as" => Some(TokenKind::As),
            "exists" => Some(TokenKind::Exists),
            _ => None,
        }
    }

    pub fn next_token(&mut self) -> Result<Token, Error> {
        self.skip_whitespace();
        let start = self.position;
        let kind = self.next_kind()?;
        Ok(Token {
            kind,
            span: Span::new(start, self.position),
        })
    }

    fn next_kind(&mut self) -> Result<TokenKind, Error> {
        let Some(ch) = self.current_char() else {
            return Ok(TokenKind::Eof);
        };

        match ch {
            '(' => {
                self.advance();
                Ok(TokenKind::LParen)
            }
            ')' => {
                self.advance();
                Ok(TokenKind::RParen)
            }
            '[' => {
                self.advance();
                Ok(TokenKind::LBracket)
            }
            ']' => {
                self.advance();
                Ok(TokenKind::RBracket)
            }
            '{' => {
                self.advance();
                Ok(TokenKind::LBrace)
            }
            '}' => {
                self.advance();
                Ok(TokenKind::RBrace)
            }
            ',' => {
                self.advance();
                Ok(TokenKind::Comma)
            }
            ':' => {
                self.advance();
                Ok(TokenKind::Colon)
            }
            '?' => {
                self.advance();
                Ok(TokenKind::Question)
            }
            '#' => {
                self.advance();
                Ok(TokenKind::Hash)
            }
            '~' => {
                self.advance();
                Ok(TokenKind::Tilde)
            }
            '+' => {
                self.advance();
                Ok(TokenKind::Plus)
            }
            '-' => {
                self.advance();
                Ok(TokenKind::Minus)
            }
            '/' => {
                self.advance();
                Ok(TokenKind::Slash)
            }
            '%' => {
                self.advance();
                Ok(TokenKind::Percent)
            }
            '^' => {
                self.advance();
                Ok(TokenKind::Caret)
            }
            '&' => {
                self.advance();
                Ok(TokenKind::Amp)
            }
            '|' => {
                self.advance();
                Ok(TokenKind::Pipe)
            }
            '*' => {
                self.advance();
                if self.current_char() == Some('*') {
                    self.advance();
                    Ok(TokenKind::DoubleStar)
                } else {
                    Ok(TokenKind::Star)
                }
            }
            '.' => {
                if self.peek_char(1) == Some('.') && self.peek_char(2) == Some('.') {
                    self.advance();
                    self.advance();
                    self.advance();
                    Ok(TokenKind::Ellipsis)
                } else {
                    self.advance();
                    Ok(TokenKind::Dot)
                }
            }
            '=' => {
                self.advance();
                match self.current_char() {
                    Some('~') => {
                        self.advance();
                        Ok(TokenKind::MatchOp)
                    }
                    Some('=') => {
                        self.advance();
                        Ok(TokenKind::EqEq)
                    }
                    // Plain '=' is an alias for '=='.
                    _ => Ok(TokenKind::EqEq),
                }
            }
            '!' => {
                self.advance();
                match self.current_char() {
                    Some('=') => {
                        self.advance();
                        Ok(TokenKind::NotEq)
                    }
                    Some('~') => {
                        self.advance();
                        Ok(TokenKind::NotMatchOp)
                    }
                    _ => Err(self.error("unexpected '!' (did you mean '!=' or '!~'?)")),
                }
            }
            '<' => {
                self.advance();
                match self.current_char() {
                    Some('=') => {
                        self.advance();
                        Ok(TokenKind::LtEq)
                    }
                    Some('<') => {
                        self.advance();
                        Ok(TokenKind::Shl)
                    }
                    _ => Ok(TokenKind::Lt),
                }
            }
            '>' => {
                self.advance();
                match self.current_char() {
                    Some('=') => {
                        self.advance();
                        Ok(TokenKind::GtEq)
                    }
                    Some('>') => {
                        self.advance();
                        Ok(TokenKind::Shr)
                    }
                    _ => Ok(TokenKind::Gt),
                }
            }
            '\'' | '"' => Ok(TokenKind::Str(self.read_string(ch, false)?)),
            'r' | 'R' => {
                // r'...' raw string, re'...' regex, otherwise an ordinary
                // identifier.
                match (self.peek_char(1), self.peek_char(2)) {
                    (Some(q @ ('\'' | '"')), _) => {
                        self.advance();
                        Ok(TokenKind::Str(self.read_string(q, true)?))
                    }
                    (Some('e' | 'E'), Some(q @ ('\'' | '"'))) => {
                        self.advance();
                        self.advance();
                        Ok(TokenKind::Regex(self.read_string(q, true)?))
                    }
                    _ => self.read_word(),
                }
            }
            c if c.is_ascii_digit() => self.read_number(),
            c if Self::is_ident_start(c) => self.read_word(),
            c => Err(self.error(format!("unexpected character '{}'", c))),
        }
    }

    fn read_word(&mut self) -> Result<TokenKind, Error> {
        let ident = self.read_identifier()?;
        if ident == "_" {
            return Ok(TokenKind::This);
        }
        if let Some(keyword) = Self::keyword(&ident) {
            return Ok(keyword);
        }
        Ok(TokenKind::Word(ident))
    }
}
