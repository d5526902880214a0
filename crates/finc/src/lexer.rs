use crate::diag::Diagnostics;
use crate::span::Span;
use crate::token::{Keyword, Punct, Token, TokenKind};

pub fn lex(src: &str, diags: &mut Diagnostics) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < src.len() {
        let ch = src[i..].chars().next().unwrap();
        if ch.is_whitespace() {
            i += ch.len_utf8();
            continue;
        }

        let start = i;

        if src[i..].starts_with("//") {
            match src[i..].find('\n') {
                Some(off) => i += off + 1,
                None => i = src.len(),
            }
            continue;
        }

        if src[i..].starts_with("/*") {
            match src[i + 2..].find("*/") {
                Some(off) => i += 2 + off + 2,
                None => {
                    diags.error(Span::new(start, src.len()), "unterminated block comment");
                    i = src.len();
                }
            }
            continue;
        }

        if is_ident_start(ch) {
            let mut j = i + ch.len_utf8();
            while j < src.len() {
                let c = src[j..].chars().next().unwrap();
                if is_ident_continue(c) {
                    j += c.len_utf8();
                } else {
                    break;
                }
            }
            let text = &src[i..j];
            let kind = if let Some(kw) = Keyword::from_str(text) {
                TokenKind::Keyword(kw)
            } else if text == "true" {
                TokenKind::Bool(true)
            } else if text == "false" {
                TokenKind::Bool(false)
            } else if text == "null" {
                TokenKind::Null
            } else {
                TokenKind::Ident(text.to_string())
            };
            tokens.push(Token {
                kind,
                span: Span::new(start, j),
            });
            i = j;
            continue;
        }

        if ch.is_ascii_digit() {
            let mut j = i + 1;
            while j < src.len() && src.as_bytes()[j].is_ascii_digit() {
                j += 1;
            }
            let mut is_float = false;
            if j < src.len() && src.as_bytes()[j] == b'.' {
                let mut k = j + 1;
                let mut saw_digit = false;
                while k < src.len() && src.as_bytes()[k].is_ascii_digit() {
                    saw_digit = true;
                    k += 1;
                }
                if saw_digit {
                    is_float = true;
                    j = k;
                }
            }
            let text = &src[i..j];
            let kind = if is_float {
                TokenKind::Float(text.parse::<f64>().unwrap_or(0.0))
            } else {
                TokenKind::Int(text.parse::<i64>().unwrap_or(0))
            };
            tokens.push(Token {
                kind,
                span: Span::new(start, j),
            });
            i = j;
            continue;
        }

        if ch == '"' {
            let mut j = i + 1;
            let mut out = String::new();
            let mut terminated = false;
            while j < src.len() {
                let c = src[j..].chars().next().unwrap();
                if c == '"' {
                    terminated = true;
                    j += 1;
                    break;
                }
                if c == '\n' {
                    break;
                }
                if c == '\\' {
                    j += 1;
                    if j >= src.len() {
                        break;
                    }
                    let esc = src[j..].chars().next().unwrap();
                    out.push(unescape(esc));
                    j += esc.len_utf8();
                    continue;
                }
                out.push(c);
                j += c.len_utf8();
            }
            if !terminated {
                diags.error(Span::new(start, j), "unterminated string literal");
            }
            tokens.push(Token {
                kind: TokenKind::String(out),
                span: Span::new(start, j),
            });
            i = j;
            continue;
        }

        if ch == '\'' {
            let mut j = i + 1;
            let mut value = '\0';
            let mut terminated = false;
            if j < src.len() {
                let c = src[j..].chars().next().unwrap();
                if c == '\\' {
                    j += 1;
                    if j < src.len() {
                        let esc = src[j..].chars().next().unwrap();
                        value = unescape(esc);
                        j += esc.len_utf8();
                    }
                } else if c != '\'' {
                    value = c;
                    j += c.len_utf8();
                }
            }
            if j < src.len() && src[j..].starts_with('\'') {
                terminated = true;
                j += 1;
            }
            if !terminated {
                diags.error(Span::new(start, j), "unterminated character literal");
            }
            tokens.push(Token {
                kind: TokenKind::Char(value),
                span: Span::new(start, j),
            });
            i = j;
            continue;
        }

        if let Some((punct, width)) = match_punct(&src[i..]) {
            tokens.push(Token {
                kind: TokenKind::Punct(punct),
                span: Span::new(start, start + width),
            });
            i += width;
            continue;
        }

        diags.error(Span::new(start, start + ch.len_utf8()), "unexpected character");
        i += ch.len_utf8();
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(src.len(), src.len()),
    });

    tokens
}

fn unescape(esc: char) -> char {
    match esc {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn match_punct(s: &str) -> Option<(Punct, usize)> {
    if s.starts_with("...") {
        return Some((Punct::Ellipsis, 3));
    }
    if s.starts_with("::") {
        return Some((Punct::ColonColon, 2));
    }
    if s.starts_with("->") {
        return Some((Punct::Arrow, 2));
    }
    if s.starts_with("=>") {
        return Some((Punct::FatArrow, 2));
    }
    if s.starts_with("==") {
        return Some((Punct::EqEq, 2));
    }
    if s.starts_with("!=") {
        return Some((Punct::NotEq, 2));
    }
    if s.starts_with("<=") {
        return Some((Punct::LtEq, 2));
    }
    if s.starts_with(">=") {
        return Some((Punct::GtEq, 2));
    }
    if s.starts_with("&&") {
        return Some((Punct::AndAnd, 2));
    }
    if s.starts_with("||") {
        return Some((Punct::OrOr, 2));
    }
    if s.starts_with("+=") {
        return Some((Punct::PlusAssign, 2));
    }
    if s.starts_with("-=") {
        return Some((Punct::MinusAssign, 2));
    }
    if s.starts_with("*=") {
        return Some((Punct::StarAssign, 2));
    }
    if s.starts_with("/=") {
        return Some((Punct::SlashAssign, 2));
    }
    let ch = s.chars().next()?;
    let punct = match ch {
        '(' => Punct::LParen,
        ')' => Punct::RParen,
        '[' => Punct::LBracket,
        ']' => Punct::RBracket,
        '{' => Punct::LBrace,
        '}' => Punct::RBrace,
        ',' => Punct::Comma,
        ';' => Punct::Semicolon,
        ':' => Punct::Colon,
        '.' => Punct::Dot,
        '=' => Punct::Assign,
        '<' => Punct::Lt,
        '>' => Punct::Gt,
        '+' => Punct::Plus,
        '-' => Punct::Minus,
        '*' => Punct::Star,
        '/' => Punct::Slash,
        '%' => Punct::Percent,
        '&' => Punct::Amp,
        '!' => Punct::Bang,
        '?' => Punct::Question,
        '~' => Punct::Tilde,
        '$' => Punct::Dollar,
        _ => return None,
    };
    Some((punct, ch.len_utf8()))
}
