//! Positional scanner producing one token span per call.
//!
//! The lexer is a set of try-readers indexed by token kind. Each reader
//! either succeeds, returning a span and advancing the position, or fails
//! and leaves the position untouched, which is what makes the parser's
//! speculative strategy cheap: trying a production costs nothing when the
//! first token does not match.
//!
//! Tokens are opaque spans. The lexer does not attach a kind tag across its
//! API; the parser tries readers by kind in turn and interprets the span
//! itself.

use serde::{Deserialize, Serialize};

/// A point in source text as `(line, column, char-offset)`.
///
/// All three fields are zero-based; diagnostics add one when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

/// An inclusive-start, exclusive-end span of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Loc {
    pub start: Position,
    pub end: Position,
}

impl Loc {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// The characters covered by this span.
    pub fn text<'a>(&self, chars: &'a [char]) -> &'a [char] {
        &chars[self.start.offset as usize..self.end.offset as usize]
    }

    pub fn to_string(&self, chars: &[char]) -> String {
        self.text(chars).iter().collect()
    }
}

/// An opaque token span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub loc: Loc,
}

/// The sub-shape of a template token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateShape {
    /// `` `...` `` with no interpolation.
    Full,
    /// `` `...${ `` — first interpolation found.
    Head,
    /// `}...${` — between two interpolations.
    Middle,
    /// `` }...` `` — after the last interpolation.
    Tail,
}

/// A lexing failure; the parser converts it into a rendered `SyntaxError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

pub(crate) type LexResult<T> = Result<T, LexError>;

/// White space accepted between tokens.
const WHITESPACE: [char; 6] = ['\u{9}', '\u{b}', '\u{c}', '\u{20}', '\u{a0}', '\u{feff}'];

/// Line terminators. Crossing one is observable through
/// [`Lexer::skip_invisible`] for automatic-semicolon-insertion decisions.
const LINE_TERMINATORS: [char; 4] = ['\u{a}', '\u{d}', '\u{2028}', '\u{2029}'];

/// The reserved-word list. An identifier reader fails on these; the keyword
/// reader requires them.
pub const KEYWORDS: [&str; 46] = [
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do", "else",
    "export", "extends", "false", "finally", "for", "function", "if", "import", "in", "instanceof", "new",
    "null", "return", "super", "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while",
    "with", "enum", "implements", "interface", "let", "package", "private", "protected", "public", "static",
    "await", "yield",
];

/// The operator/punctuator set in longest-first order so that the symbol
/// reader's first match is the longest match.
const SYMBOLS: [&str; 49] = [
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", "&&=", "||=", "??=", ">>>", "=>", "?.", "??", "++",
    "--", "**", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<",
    ">>", "(", ")", "{", "}", "[", "]", ";", ",", ".", ":", "?", "@", "#", "~", "=", "!",
];

/// Single-character operators checked after the table above.
const SINGLE_SYMBOLS: [char; 10] = ['<', '>', '+', '-', '*', '/', '%', '&', '|', '^'];

/// The try-reader scanner over a character buffer.
pub struct Lexer<'a> {
    chars: &'a [char],
}

impl<'a> Lexer<'a> {
    pub fn new(chars: &'a [char]) -> Self {
        Self { chars }
    }

    fn at(&self, pos: Position) -> Option<char> {
        self.chars.get(pos.offset as usize).copied()
    }

    fn advance(&self, pos: &mut Position) {
        if let Some(ch) = self.at(*pos) {
            pos.offset += 1;
            if LINE_TERMINATORS.contains(&ch) {
                pos.line += 1;
                pos.column = 0;
            } else {
                pos.column += 1;
            }
        }
    }

    fn starts_with(&self, pos: Position, text: &str) -> bool {
        let mut offset = pos.offset as usize;
        for expect in text.chars() {
            if self.chars.get(offset) != Some(&expect) {
                return false;
            }
            offset += 1;
        }
        true
    }

    pub fn is_end(&self, pos: Position) -> bool {
        pos.offset as usize >= self.chars.len()
    }

    /// Skips white space, line terminators and comments. Returns whether a
    /// line terminator was crossed, which the parser queries when deciding
    /// on automatic semicolon insertion.
    pub fn skip_invisible(&self, pos: &mut Position) -> LexResult<bool> {
        let mut newline = false;
        loop {
            let Some(ch) = self.at(*pos) else { break };
            if WHITESPACE.contains(&ch) {
                self.advance(pos);
            } else if LINE_TERMINATORS.contains(&ch) {
                newline = true;
                self.advance(pos);
            } else if self.starts_with(*pos, "//") || self.starts_with(*pos, "/*") {
                let token = self.read_comment(pos)?.expect("comment prefix checked");
                if token.loc.text(self.chars).contains(&'\n') {
                    newline = true;
                }
            } else {
                break;
            }
        }
        Ok(newline)
    }

    /// `//` to end of line, or `/* */` which may span lines. An unterminated
    /// multi-line comment is a syntax error.
    pub fn read_comment(&self, pos: &mut Position) -> LexResult<Option<Token>> {
        let start = *pos;
        if self.starts_with(*pos, "//") {
            while let Some(ch) = self.at(*pos) {
                if LINE_TERMINATORS.contains(&ch) {
                    break;
                }
                self.advance(pos);
            }
            return Ok(Some(Token {
                loc: Loc::new(start, *pos),
            }));
        }
        if self.starts_with(*pos, "/*") {
            self.advance(pos);
            self.advance(pos);
            loop {
                if self.is_end(*pos) {
                    return Err(LexError {
                        message: "Invalid or unexpected token".to_owned(),
                        position: start,
                    });
                }
                if self.starts_with(*pos, "*/") {
                    self.advance(pos);
                    self.advance(pos);
                    break;
                }
                self.advance(pos);
            }
            return Ok(Some(Token {
                loc: Loc::new(start, *pos),
            }));
        }
        Ok(None)
    }

    /// `'` or `"` delimited; backslash toggles masking. Unterminated strings
    /// and raw newlines inside the literal are syntax errors.
    pub fn read_string(&self, pos: &mut Position) -> LexResult<Option<Token>> {
        let start = *pos;
        let Some(quote) = self.at(*pos) else { return Ok(None) };
        if quote != '\'' && quote != '"' {
            return Ok(None);
        }
        self.advance(pos);
        let mut masked = false;
        loop {
            let Some(ch) = self.at(*pos) else {
                *pos = start;
                return Err(LexError {
                    message: "Invalid or unexpected token".to_owned(),
                    position: start,
                });
            };
            if !masked && LINE_TERMINATORS.contains(&ch) {
                *pos = start;
                return Err(LexError {
                    message: "Invalid or unexpected token".to_owned(),
                    position: start,
                });
            }
            self.advance(pos);
            if masked {
                masked = false;
            } else if ch == '\\' {
                masked = true;
            } else if ch == quote {
                break;
            }
        }
        Ok(Some(Token {
            loc: Loc::new(start, *pos),
        }))
    }

    fn read_decimal_digits(&self, pos: &mut Position) -> bool {
        let mut any = false;
        while let Some(ch) = self.at(*pos) {
            if ch.is_ascii_digit() {
                any = true;
                self.advance(pos);
            } else {
                break;
            }
        }
        any
    }

    /// Decimal (with optional fraction and exponent), hex `0x`, octal `0o`.
    /// A bare leading dot followed by a digit is accepted.
    pub fn read_number(&self, pos: &mut Position) -> LexResult<Option<Token>> {
        let start = *pos;
        let Some(first) = self.at(*pos) else { return Ok(None) };

        if first == '0'
            && let Some(marker) = self.at(Position {
                offset: pos.offset + 1,
                column: pos.column + 1,
                ..*pos
            })
        {
            if marker == 'x' || marker == 'X' {
                self.advance(pos);
                self.advance(pos);
                let mut any = false;
                while let Some(ch) = self.at(*pos) {
                    if ch.is_ascii_hexdigit() {
                        any = true;
                        self.advance(pos);
                    } else {
                        break;
                    }
                }
                if !any {
                    *pos = start;
                    return Ok(None);
                }
                return Ok(Some(Token {
                    loc: Loc::new(start, *pos),
                }));
            }
            if marker == 'o' || marker == 'O' {
                self.advance(pos);
                self.advance(pos);
                let mut any = false;
                while let Some(ch) = self.at(*pos) {
                    if ('0'..='7').contains(&ch) {
                        any = true;
                        self.advance(pos);
                    } else {
                        break;
                    }
                }
                if !any {
                    *pos = start;
                    return Ok(None);
                }
                return Ok(Some(Token {
                    loc: Loc::new(start, *pos),
                }));
            }
        }

        let mut any = false;
        if first.is_ascii_digit() {
            any = self.read_decimal_digits(pos);
        }
        if self.at(*pos) == Some('.') {
            let after_dot = Position {
                offset: pos.offset + 1,
                column: pos.column + 1,
                ..*pos
            };
            if any || self.at(after_dot).is_some_and(|c| c.is_ascii_digit()) {
                self.advance(pos);
                self.read_decimal_digits(pos);
                any = true;
            }
        }
        if !any {
            *pos = start;
            return Ok(None);
        }
        if let Some(e) = self.at(*pos)
            && (e == 'e' || e == 'E')
        {
            let mut probe = *pos;
            self.advance(&mut probe);
            if let Some(sign) = self.at(probe)
                && (sign == '+' || sign == '-')
            {
                self.advance(&mut probe);
            }
            if self.at(probe).is_some_and(|c| c.is_ascii_digit()) {
                *pos = probe;
                self.read_decimal_digits(pos);
            }
        }
        Ok(Some(Token {
            loc: Loc::new(start, *pos),
        }))
    }

    /// A number literal immediately followed by `n`, without fraction or
    /// exponent form.
    pub fn read_bigint(&self, pos: &mut Position) -> LexResult<Option<Token>> {
        let start = *pos;
        let Some(number) = self.read_number(pos)? else {
            return Ok(None);
        };
        let digits = number.loc.to_string(self.chars);
        if digits.contains('.') || digits.contains('e') || digits.contains('E') {
            *pos = start;
            return Ok(None);
        }
        if self.at(*pos) != Some('n') {
            *pos = start;
            return Ok(None);
        }
        self.advance(pos);
        Ok(Some(Token {
            loc: Loc::new(start, *pos),
        }))
    }

    /// `/pattern/flags`. A character class disables `/` as terminator, and a
    /// backslash masks the next character (covering the `\uXXXX` form).
    pub fn read_regex(&self, pos: &mut Position) -> LexResult<Option<Token>> {
        let start = *pos;
        if self.at(*pos) != Some('/') || self.starts_with(*pos, "//") || self.starts_with(*pos, "/*") {
            return Ok(None);
        }
        self.advance(pos);
        let mut masked = false;
        let mut in_class = false;
        loop {
            let Some(ch) = self.at(*pos) else {
                *pos = start;
                return Ok(None);
            };
            if !masked && LINE_TERMINATORS.contains(&ch) {
                *pos = start;
                return Ok(None);
            }
            self.advance(pos);
            if masked {
                masked = false;
            } else if ch == '\\' {
                masked = true;
            } else if ch == '[' {
                in_class = true;
            } else if ch == ']' {
                in_class = false;
            } else if ch == '/' && !in_class {
                break;
            }
        }
        while let Some(ch) = self.at(*pos) {
            if ch.is_ascii_lowercase() {
                self.advance(pos);
            } else {
                break;
            }
        }
        Ok(Some(Token {
            loc: Loc::new(start, *pos),
        }))
    }

    /// Template starting at a backtick: returns the token and whether it is
    /// a full template or the head of an interpolated one.
    pub fn read_template_open(&self, pos: &mut Position) -> LexResult<Option<(Token, TemplateShape)>> {
        if self.at(*pos) != Some('`') {
            return Ok(None);
        }
        self.read_template_until(pos, TemplateShape::Full, TemplateShape::Head)
    }

    /// Template continuation starting at the `}` that closes an
    /// interpolation: a middle (`}...${`) or tail (`` }...` ``) piece.
    pub fn read_template_part(&self, pos: &mut Position) -> LexResult<Option<(Token, TemplateShape)>> {
        if self.at(*pos) != Some('}') {
            return Ok(None);
        }
        self.read_template_until(pos, TemplateShape::Tail, TemplateShape::Middle)
    }

    fn read_template_until(
        &self,
        pos: &mut Position,
        closed: TemplateShape,
        interpolated: TemplateShape,
    ) -> LexResult<Option<(Token, TemplateShape)>> {
        let start = *pos;
        self.advance(pos);
        let mut masked = false;
        loop {
            let Some(ch) = self.at(*pos) else {
                *pos = start;
                return Err(LexError {
                    message: "Unterminated template literal".to_owned(),
                    position: start,
                });
            };
            if masked {
                masked = false;
                self.advance(pos);
                continue;
            }
            if ch == '\\' {
                masked = true;
                self.advance(pos);
                continue;
            }
            if ch == '`' {
                self.advance(pos);
                return Ok(Some((
                    Token {
                        loc: Loc::new(start, *pos),
                    },
                    closed,
                )));
            }
            if ch == '$' && self.starts_with(*pos, "${") {
                self.advance(pos);
                self.advance(pos);
                return Ok(Some((
                    Token {
                        loc: Loc::new(start, *pos),
                    },
                    interpolated,
                )));
            }
            self.advance(pos);
        }
    }

    fn read_word(&self, pos: &mut Position) -> Option<Token> {
        let start = *pos;
        let first = self.at(*pos)?;
        if !(first == '_' || first == '$' || first.is_ascii_alphabetic()) {
            return None;
        }
        self.advance(pos);
        while let Some(ch) = self.at(*pos) {
            if ch == '_' || ch == '$' || ch.is_ascii_alphanumeric() {
                self.advance(pos);
            } else {
                break;
            }
        }
        Some(Token {
            loc: Loc::new(start, *pos),
        })
    }

    /// Identifier: word shape whose span is not a reserved word.
    pub fn read_identifier(&self, pos: &mut Position) -> LexResult<Option<Token>> {
        let start = *pos;
        let Some(token) = self.read_word(pos) else { return Ok(None) };
        let text = token.loc.to_string(self.chars);
        if KEYWORDS.contains(&text.as_str()) {
            *pos = start;
            return Ok(None);
        }
        Ok(Some(token))
    }

    /// Keyword: word shape whose span is a reserved word.
    pub fn read_keyword(&self, pos: &mut Position) -> LexResult<Option<Token>> {
        let start = *pos;
        let Some(token) = self.read_word(pos) else { return Ok(None) };
        let text = token.loc.to_string(self.chars);
        if !KEYWORDS.contains(&text.as_str()) {
            *pos = start;
            return Ok(None);
        }
        Ok(Some(token))
    }

    /// Longest match from the operator/punctuator set.
    pub fn read_symbol(&self, pos: &mut Position) -> LexResult<Option<Token>> {
        let start = *pos;
        for symbol in SYMBOLS {
            if self.starts_with(*pos, symbol) {
                for _ in 0..symbol.chars().count() {
                    self.advance(pos);
                }
                return Ok(Some(Token {
                    loc: Loc::new(start, *pos),
                }));
            }
        }
        if let Some(ch) = self.at(*pos)
            && SINGLE_SYMBOLS.contains(&ch)
        {
            self.advance(pos);
            return Ok(Some(Token {
                loc: Loc::new(start, *pos),
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(source: &str) -> Vec<char> {
        source.chars().collect()
    }

    fn span(source: &str, reader: impl Fn(&Lexer<'_>, &mut Position) -> LexResult<Option<Token>>) -> Option<String> {
        let buffer = chars(source);
        let lexer = Lexer::new(&buffer);
        let mut pos = Position::default();
        reader(&lexer, &mut pos).unwrap().map(|t| t.loc.to_string(&buffer))
    }

    #[test]
    fn string_reader_masks_escapes() {
        assert_eq!(span("'a\\'b' rest", |l, p| l.read_string(p)), Some("'a\\'b'".to_owned()));
        assert_eq!(span("\"x\"", |l, p| l.read_string(p)), Some("\"x\"".to_owned()));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let buffer = chars("'abc");
        let lexer = Lexer::new(&buffer);
        let mut pos = Position::default();
        assert!(lexer.read_string(&mut pos).is_err());
        assert_eq!(pos, Position::default());
    }

    #[test]
    fn number_reader_covers_all_forms() {
        for (input, expect) in [
            ("123", "123"),
            ("1.5e-3;", "1.5e-3"),
            ("0x1F", "0x1F"),
            ("0o17", "0o17"),
            (".5", ".5"),
            ("10.", "10."),
        ] {
            assert_eq!(span(input, |l, p| l.read_number(p)), Some(expect.to_owned()), "{input}");
        }
        assert_eq!(span("abc", |l, p| l.read_number(p)), None);
    }

    #[test]
    fn bigint_requires_integer_form() {
        assert_eq!(span("42n", |l, p| l.read_bigint(p)), Some("42n".to_owned()));
        assert_eq!(span("4.2n", |l, p| l.read_bigint(p)), None);
        assert_eq!(span("1e3n", |l, p| l.read_bigint(p)), None);
    }

    #[test]
    fn regex_reader_respects_classes_and_flags() {
        assert_eq!(span("/a[/]b/gi;", |l, p| l.read_regex(p)), Some("/a[/]b/gi".to_owned()));
        assert_eq!(span("/\\//", |l, p| l.read_regex(p)), Some("/\\//".to_owned()));
        assert_eq!(span("//not a regex", |l, p| l.read_regex(p)), None);
    }

    #[test]
    fn template_shapes() {
        let buffer = chars("`a${x}b`");
        let lexer = Lexer::new(&buffer);
        let mut pos = Position::default();
        let (head, shape) = lexer.read_template_open(&mut pos).unwrap().unwrap();
        assert_eq!(shape, TemplateShape::Head);
        assert_eq!(head.loc.to_string(&buffer), "`a${");

        // Skip over the interpolated identifier to the closing brace.
        let mut pos = Position {
            line: 0,
            column: 5,
            offset: 5,
        };
        let (tail, shape) = lexer.read_template_part(&mut pos).unwrap().unwrap();
        assert_eq!(shape, TemplateShape::Tail);
        assert_eq!(tail.loc.to_string(&buffer), "}b`");
    }

    #[test]
    fn identifier_rejects_keywords_and_keyword_requires_them() {
        assert_eq!(span("value", |l, p| l.read_identifier(p)), Some("value".to_owned()));
        assert_eq!(span("while", |l, p| l.read_identifier(p)), None);
        assert_eq!(span("while", |l, p| l.read_keyword(p)), Some("while".to_owned()));
        assert_eq!(span("whilex", |l, p| l.read_keyword(p)), None);
    }

    #[test]
    fn symbol_reader_prefers_longest_match() {
        assert_eq!(span(">>>=1", |l, p| l.read_symbol(p)), Some(">>>=".to_owned()));
        assert_eq!(span(">>> 1", |l, p| l.read_symbol(p)), Some(">>>".to_owned()));
        assert_eq!(span("?.x", |l, p| l.read_symbol(p)), Some("?.".to_owned()));
        assert_eq!(span("=> x", |l, p| l.read_symbol(p)), Some("=>".to_owned()));
    }

    #[test]
    fn skip_reports_newlines_including_inside_comments() {
        let buffer = chars("  // note\n  x");
        let lexer = Lexer::new(&buffer);
        let mut pos = Position::default();
        assert!(lexer.skip_invisible(&mut pos).unwrap());
        assert_eq!(buffer[pos.offset as usize], 'x');

        let buffer = chars("/* one line */ x");
        let lexer = Lexer::new(&buffer);
        let mut pos = Position::default();
        assert!(!lexer.skip_invisible(&mut pos).unwrap());
        assert_eq!(buffer[pos.offset as usize], 'x');
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let buffer = chars("/* never closed");
        let lexer = Lexer::new(&buffer);
        let mut pos = Position::default();
        assert!(lexer.skip_invisible(&mut pos).is_err());
    }
}
