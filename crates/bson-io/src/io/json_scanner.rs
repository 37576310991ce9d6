//! Tokenizer for the extended JSON grammar.

use std::fmt;

use crate::values::BsonRegularExpression;
use crate::BsonError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JsonToken {
    BeginArray,
    EndArray,
    BeginObject,
    EndObject,
    Colon,
    Comma,
    LeftParen,
    RightParen,
    Double { lexeme: String, value: f64 },
    Int32 { lexeme: String, value: i32 },
    Int64 { lexeme: String, value: i64 },
    /// A quoted string, already unescaped.
    String(String),
    /// A bare word: `true`, `ObjectId`, an unquoted name.
    UnquotedString(String),
    RegularExpression(BsonRegularExpression),
    EndOfFile,
}

impl JsonToken {
    /// The text the token stands for, as shown in error messages and
    /// compared by `verify_token`.
    pub fn lexeme(&self) -> &str {
        match self {
            JsonToken::BeginArray => "[",
            JsonToken::EndArray => "]",
            JsonToken::BeginObject => "{",
            JsonToken::EndObject => "}",
            JsonToken::Colon => ":",
            JsonToken::Comma => ",",
            JsonToken::LeftParen => "(",
            JsonToken::RightParen => ")",
            JsonToken::Double { lexeme, .. }
            | JsonToken::Int32 { lexeme, .. }
            | JsonToken::Int64 { lexeme, .. } => lexeme,
            JsonToken::String(s) | JsonToken::UnquotedString(s) => s,
            JsonToken::RegularExpression(regex) => &regex.pattern,
            JsonToken::EndOfFile => "<eof>",
        }
    }

    /// The integer value of an `Int32` or `Int64` token.
    pub fn integer(&self) -> Option<i64> {
        match self {
            JsonToken::Int32 { value, .. } => Some(i64::from(*value)),
            JsonToken::Int64 { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// A quoted or unquoted string's text.
    pub fn string(&self) -> Option<&str> {
        match self {
            JsonToken::String(s) | JsonToken::UnquotedString(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for JsonToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lexeme())
    }
}

/// Decoded input text plus the scan position (a byte offset).
#[derive(Debug, Clone)]
pub(crate) struct JsonBuffer {
    text: String,
    position: usize,
}

impl JsonBuffer {
    pub fn new(text: String) -> Self {
        Self { text, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.text.len());
    }

    /// True when nothing but whitespace remains.
    pub fn is_exhausted(&self) -> bool {
        self.text[self.position..].chars().all(char::is_whitespace)
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.position).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.position..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.position += c.len_utf8();
        }
    }

    /// Scans the next token, skipping leading whitespace.
    pub fn next_token(&mut self) -> Result<JsonToken, BsonError> {
        self.skip_whitespace();
        let Some(c) = self.peek() else {
            return Ok(JsonToken::EndOfFile);
        };
        let punctuation = match c {
            b'{' => Some(JsonToken::BeginObject),
            b'}' => Some(JsonToken::EndObject),
            b'[' => Some(JsonToken::BeginArray),
            b']' => Some(JsonToken::EndArray),
            b'(' => Some(JsonToken::LeftParen),
            b')' => Some(JsonToken::RightParen),
            b':' => Some(JsonToken::Colon),
            b',' => Some(JsonToken::Comma),
            _ => None,
        };
        if let Some(token) = punctuation {
            self.position += 1;
            return Ok(token);
        }
        match c {
            b'"' | b'\'' => self.scan_string(c),
            b'/' => self.scan_regular_expression(),
            b'-' | b'0'..=b'9' => self.scan_number(),
            _ => {
                let first = self.peek_char().unwrap_or('\0');
                if first == '$' || first == '_' || first.is_alphabetic() {
                    Ok(self.scan_unquoted_string())
                } else {
                    Err(BsonError::format(format!(
                        "Invalid JSON input '{}'.",
                        self.context_snippet(self.position)
                    )))
                }
            }
        }
    }

    fn scan_unquoted_string(&mut self) -> JsonToken {
        let start = self.position;
        while let Some(c) = self.peek_char() {
            if c == '$' || c == '_' || c.is_alphanumeric() {
                self.position += c.len_utf8();
            } else {
                break;
            }
        }
        JsonToken::UnquotedString(self.text[start..self.position].to_string())
    }

    fn scan_string(&mut self, quote: u8) -> Result<JsonToken, BsonError> {
        let start = self.position;
        self.position += 1;
        let mut value = String::new();
        loop {
            // Copy the run up to the next quote or escape in one go
            let run_start = self.position;
            while let Some(c) = self.peek() {
                if c == quote || c == b'\\' {
                    break;
                }
                self.position += 1;
            }
            value.push_str(&self.text[run_start..self.position]);
            match self.peek() {
                None => {
                    return Err(BsonError::format(format!(
                        "End of file in JSON string '{}'.",
                        self.context_snippet(start)
                    )))
                }
                Some(c) if c == quote => {
                    self.position += 1;
                    return Ok(JsonToken::String(value));
                }
                Some(_) => {
                    self.position += 1;
                    value.push(self.scan_escape(start)?);
                }
            }
        }
    }

    /// Decodes the escape after a backslash.
    fn scan_escape(&mut self, start: usize) -> Result<char, BsonError> {
        let Some(c) = self.peek_char() else {
            return Err(BsonError::format(format!(
                "End of file in JSON string '{}'.",
                self.context_snippet(start)
            )));
        };
        self.position += c.len_utf8();
        let decoded = match c {
            '\'' => '\'',
            '"' => '"',
            '\\' => '\\',
            '/' => '/',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => {
                let unit = self.scan_hex4(start)?;
                if (0xD800..0xDC00).contains(&unit) {
                    // A high surrogate must be followed by an escaped low surrogate
                    if self.text[self.position..].starts_with("\\u") {
                        self.position += 2;
                        let low = self.scan_hex4(start)?;
                        if (0xDC00..0xE000).contains(&low) {
                            let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                            if let Some(c) = char::from_u32(combined) {
                                return Ok(c);
                            }
                        }
                    }
                    return Err(BsonError::format(format!(
                        "Invalid surrogate pair in JSON string '{}'.",
                        self.context_snippet(start)
                    )));
                }
                char::from_u32(unit).ok_or_else(|| {
                    BsonError::format(format!(
                        "Invalid escape sequence in JSON string '{}'.",
                        self.context_snippet(start)
                    ))
                })?
            }
            other => {
                return Err(BsonError::format(format!(
                    "Invalid escape sequence in JSON string '\\{other}'."
                )))
            }
        };
        Ok(decoded)
    }

    fn scan_hex4(&mut self, start: usize) -> Result<u32, BsonError> {
        let digits = self
            .text
            .as_bytes()
            .get(self.position..self.position + 4)
            .filter(|d| d.iter().all(u8::is_ascii_hexdigit));
        let Some(digits) = digits else {
            return Err(BsonError::format(format!(
                "Invalid escape sequence in JSON string '{}'.",
                self.context_snippet(start)
            )));
        };
        let unit = digits
            .iter()
            .fold(0u32, |acc, &d| (acc << 4) | u32::from(hex_digit(d)));
        self.position += 4;
        Ok(unit)
    }

    /// `/pattern/options`. Only `\/` is unescaped; other escapes stay in the pattern.
    fn scan_regular_expression(&mut self) -> Result<JsonToken, BsonError> {
        let start = self.position;
        self.position += 1;
        let mut pattern = String::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(BsonError::format(format!(
                        "End of file in JSON regular expression '{}'.",
                        self.context_snippet(start)
                    )))
                }
                Some('/') => {
                    self.position += 1;
                    break;
                }
                Some('\\') => {
                    self.position += 1;
                    match self.peek_char() {
                        Some('/') => {
                            self.position += 1;
                            pattern.push('/');
                        }
                        Some(c) => {
                            self.position += c.len_utf8();
                            pattern.push('\\');
                            pattern.push(c);
                        }
                        None => {
                            return Err(BsonError::format(format!(
                                "End of file in JSON regular expression '{}'.",
                                self.context_snippet(start)
                            )))
                        }
                    }
                }
                Some(c) => {
                    self.position += c.len_utf8();
                    pattern.push(c);
                }
            }
        }
        let options_start = self.position;
        while matches!(self.peek(), Some(b'i' | b'm' | b'x' | b's')) {
            self.position += 1;
        }
        let options = self.text[options_start..self.position].to_string();
        if !self.at_delimiter() {
            return Err(BsonError::format(format!(
                "Invalid JSON regular expression '{}'.",
                self.context_snippet(start)
            )));
        }
        Ok(JsonToken::RegularExpression(BsonRegularExpression::new(pattern, &options)))
    }

    /// Numbers, including `-Infinity`. Integers that overflow i64 become doubles.
    fn scan_number(&mut self) -> Result<JsonToken, BsonError> {
        let start = self.position;
        let invalid = |buffer: &Self| {
            BsonError::format(format!(
                "Invalid JSON number '{}'.",
                buffer.context_snippet(start)
            ))
        };
        if self.peek() == Some(b'-') {
            self.position += 1;
            if self.text[self.position..].starts_with("Infinity") {
                self.position += "Infinity".len();
                if !self.at_delimiter() {
                    return Err(invalid(self));
                }
                return Ok(JsonToken::Double {
                    lexeme: "-Infinity".to_string(),
                    value: f64::NEG_INFINITY,
                });
            }
        }

        let int_start = self.position;
        self.skip_digits();
        let int_digits = self.position - int_start;
        if int_digits == 0 || (int_digits > 1 && self.text.as_bytes()[int_start] == b'0') {
            return Err(invalid(self));
        }
        let mut is_integer = true;
        if self.peek() == Some(b'.') {
            is_integer = false;
            self.position += 1;
            if self.skip_digits() == 0 {
                return Err(invalid(self));
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_integer = false;
            self.position += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.position += 1;
            }
            if self.skip_digits() == 0 {
                return Err(invalid(self));
            }
        }
        if !self.at_delimiter() {
            return Err(invalid(self));
        }

        let lexeme = self.text[start..self.position].to_string();
        if is_integer {
            if let Ok(value) = lexeme.parse::<i64>() {
                return Ok(match i32::try_from(value) {
                    Ok(value) => JsonToken::Int32 { lexeme, value },
                    Err(_) => JsonToken::Int64 { lexeme, value },
                });
            }
        }
        let value = lexeme.parse::<f64>().map_err(|_| invalid(self))?;
        Ok(JsonToken::Double { lexeme, value })
    }

    fn skip_digits(&mut self) -> usize {
        let start = self.position;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.position += 1;
        }
        self.position - start
    }

    /// Whether a number or regex may end here.
    fn at_delimiter(&self) -> bool {
        match self.peek_char() {
            None => true,
            Some(c) => matches!(c, ',' | '}' | ']' | ')' | ':') || c.is_whitespace(),
        }
    }

    /// A short excerpt of the input from `start`, for error messages.
    fn context_snippet(&self, start: usize) -> String {
        let start = start.min(self.text.len());
        let mut end = (self.position.max(start) + 1).min(self.text.len());
        while !self.text.is_char_boundary(end) {
            end += 1;
        }
        let snippet = &self.text[start..end];
        if snippet.chars().count() > 40 {
            let cut: String = snippet.chars().take(40).collect();
            format!("{cut}...")
        } else {
            snippet.to_string()
        }
    }
}

fn hex_digit(d: u8) -> u8 {
    match d {
        b'0'..=b'9' => d - b'0',
        b'a'..=b'f' => d - b'a' + 10,
        _ => d - b'A' + 10,
    }
}
