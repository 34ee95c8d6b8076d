//! Lexical scanner (§10). Deliberately the simplest component in the
//! pipeline: a single left-to-right pass producing a flat token vector.
//! The interesting algorithmic work downstream (the PDA, the generator,
//! the interpreter) is not here.

use crate::error::LexError;
use crate::token::{Keyword, Operator, Token, TokenKind};
use crate::Code;
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:0[xX][0-9a-fA-F]+|[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?|\.[0-9]+(?:[eE][+-]?[0-9]+)?)").unwrap());
static IDENT_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*").unwrap());

/// A single-pass tokenizer over a [`Code`] source buffer.
pub struct Lexer<'c> {
    code: &'c Code<'c>,
}

impl<'c> Lexer<'c> {
    pub fn new(code: &'c Code<'c>) -> Self {
        Self { code }
    }

    /// Whether a `/` at `prev_significant` should be read as the start of a
    /// regex literal rather than a division operator: true at the start of
    /// input, after most operators, or after `(`, `,`, `return`.
    fn regex_allowed(prev: Option<TokenKind>) -> bool {
        match prev {
            None => true,
            Some(TokenKind::Ident) | Some(TokenKind::Number) | Some(TokenKind::String) => false,
            Some(TokenKind::Operator(Operator::RParen))
            | Some(TokenKind::Operator(Operator::RSquare))
            | Some(TokenKind::Operator(Operator::RBrace))
            | Some(TokenKind::Operator(Operator::Inc))
            | Some(TokenKind::Operator(Operator::Dec)) => false,
            Some(TokenKind::Keyword(Keyword::This)) => false,
            _ => true,
        }
    }

    pub fn tokenize(&self) -> Result<Vec<Token>, LexError> {
        let bytes = self.code.value;
        let mut pos = 0usize;
        let mut out = Vec::new();
        let mut prev_kind: Option<TokenKind> = None;

        while pos < bytes.len() {
            let c = bytes[pos];

            if c == b' ' || c == b'\t' || c == b'\r' || c == b'\n' {
                pos += 1;
                continue;
            }

            if c == b'/' && bytes.get(pos + 1) == Some(&b'/') {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                continue;
            }
            if c == b'/' && bytes.get(pos + 1) == Some(&b'*') {
                let start = pos;
                pos += 2;
                loop {
                    if pos + 1 >= bytes.len() {
                        return Err(LexError::new(
                            self.code.obtain_position(start),
                            "unterminated block comment",
                        ));
                    }
                    if bytes[pos] == b'*' && bytes[pos + 1] == b'/' {
                        pos += 2;
                        break;
                    }
                    pos += 1;
                }
                continue;
            }

            let start = pos;
            let position = self.code.obtain_position(start);

            if c == b'"' || c == b'\'' {
                let quote = c;
                pos += 1;
                loop {
                    if pos >= bytes.len() {
                        return Err(LexError::new(position, "unterminated string literal"));
                    }
                    if bytes[pos] == b'\\' {
                        pos += 2;
                        continue;
                    }
                    if bytes[pos] == quote {
                        pos += 1;
                        break;
                    }
                    pos += 1;
                }
                let tok = Token::new(TokenKind::String, start, pos, position);
                prev_kind = Some(tok.kind);
                out.push(tok);
                continue;
            }

            if c == b'/' && Self::regex_allowed(prev_kind) {
                let mut p = pos + 1;
                let mut in_class = false;
                let mut closed = false;
                while p < bytes.len() {
                    match bytes[p] {
                        b'\\' => p += 2,
                        b'[' => {
                            in_class = true;
                            p += 1;
                        }
                        b']' => {
                            in_class = false;
                            p += 1;
                        }
                        b'/' if !in_class => {
                            p += 1;
                            closed = true;
                            break;
                        }
                        b'\n' => break,
                        _ => p += 1,
                    }
                }
                if closed {
                    while p < bytes.len() && (bytes[p] as char).is_ascii_alphabetic() {
                        p += 1;
                    }
                    let tok = Token::new(TokenKind::Regex, start, p, position);
                    prev_kind = Some(tok.kind);
                    out.push(tok);
                    pos = p;
                    continue;
                }
                // Fall through to operator scanning: not actually a regex start.
            }

            let rest = self.code.slice(pos, bytes.len());

            if let Some(m) = NUMBER.find(rest) {
                let end = pos + m.end();
                let tok = Token::new(TokenKind::Number, start, end, position);
                prev_kind = Some(tok.kind);
                out.push(tok);
                pos = end;
                continue;
            }

            if let Some(m) = IDENT_START.find(rest) {
                let end = pos + m.end();
                let word = self.code.slice(start, end);
                let kind = match Keyword::lookup(word) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Ident,
                };
                let tok = Token::new(kind, start, end, position);
                prev_kind = Some(tok.kind);
                out.push(tok);
                pos = end;
                continue;
            }

            if let Some((op, len)) = Self::match_operator(&bytes[pos..]) {
                let end = pos + len;
                let tok = Token::new(TokenKind::Operator(op), start, end, position);
                prev_kind = Some(tok.kind);
                out.push(tok);
                pos = end;
                continue;
            }

            return Err(LexError::new(
                position,
                format!("unexpected character '{}'", c as char),
            ));
        }

        let eof_pos = self.code.obtain_position(bytes.len());
        out.push(Token::new(TokenKind::Eof, bytes.len(), bytes.len(), eof_pos));
        Ok(out)
    }

    /// Longest-match-first operator scan. Ordered so that e.g. `>>>=` is
    /// tried before `>>=` before `>>` before `>`.
    fn match_operator(s: &[u8]) -> Option<(Operator, usize)> {
        use Operator::*;
        const TABLE: &[(&str, Operator)] = &[
            (">>>=", AssignURShift),
            ("===", FEqual),
            ("!==", FNotEqual),
            (">>>", URShift),
            ("<<=", AssignLShift),
            (">>=", AssignRShift),
            ("**=", AssignPower),
            ("==", Equal),
            ("!=", NotEqual),
            ("<=", LessEqual),
            (">=", GreaterEqual),
            ("&&", LogAnd),
            ("||", LogOr),
            ("++", Inc),
            ("--", Dec),
            ("+=", AssignAdd),
            ("-=", AssignSub),
            ("*=", AssignMul),
            ("/=", AssignDiv),
            ("%=", AssignMod),
            ("&=", AssignAnd),
            ("|=", AssignOr),
            ("^=", AssignXor),
            ("**", Power),
            ("<<", LShift),
            (">>", RShift),
            ("+", Add),
            ("-", Sub),
            ("*", Mul),
            ("/", Div),
            ("%", Mod),
            ("=", Assign),
            ("<", Less),
            (">", Greater),
            ("!", LogNot),
            ("~", BitNot),
            ("&", BitAnd),
            ("|", BitOr),
            ("^", BitXor),
            (".", Dot),
            (",", Comma),
            (";", Semi),
            (":", Colon),
            ("?", Query),
            ("(", LParen),
            (")", RParen),
            ("[", LSquare),
            ("]", RSquare),
            ("{", LBrace),
            ("}", RBrace),
        ];
        for (lit, op) in TABLE {
            let bytes = lit.as_bytes();
            if s.len() >= bytes.len() && &s[..bytes.len()] == bytes {
                return Some((*op, bytes.len()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let code = Code::new(src.as_bytes());
        Lexer::new(&code)
            .tokenize()
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_var_declaration() {
        let k = kinds("var a = 1 + 2;");
        assert_eq!(
            k,
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Ident,
                TokenKind::Operator(Operator::Assign),
                TokenKind::Number,
                TokenKind::Operator(Operator::Add),
                TokenKind::Number,
                TokenKind::Operator(Operator::Semi),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn division_vs_regex() {
        let k = kinds("a / b");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident,
                TokenKind::Operator(Operator::Div),
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
        let k2 = kinds("return /ab+c/;");
        assert_eq!(
            k2,
            vec![
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Regex,
                TokenKind::Operator(Operator::Semi),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn strings_and_comments() {
        let k = kinds("// comment\n\"he\\\"llo\" /* block */ 'x'");
        assert_eq!(
            k,
            vec![TokenKind::String, TokenKind::String, TokenKind::Eof]
        );
    }
}
