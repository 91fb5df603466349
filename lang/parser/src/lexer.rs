//! Tokenises the surface syntax (`spec.md` §6). A thin, mechanical layer: the
//! interesting engineering content of this repo is the core the parser feeds,
//! not the parser itself.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"--[^\n]*")]
pub enum Token {
    // Keywords
    //
    //
    #[token("type")]
    Type,
    #[token("import")]
    Import,
    #[token("prod")]
    Prod,

    // Punctuation, longest-match first so `:===` wins over `:=` and `:`.
    //
    //
    #[token(":===")]
    ColonEqEqEq,
    #[token(":=")]
    ColonEq,
    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
    #[token("\\")]
    Backslash,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("_")]
    Underscore,

    // Level literals, e.g. `0l`, `3l` — digits immediately followed by `l`,
    // kept distinct from a plain identifier by requiring the match to start
    // with a digit.
    #[regex(r"[0-9]+l", |lex| lex.slice()[..lex.slice().len() - 1].parse::<u64>().ok())]
    LevelLit(u64),

    #[regex(r"[A-Za-z][A-Za-z0-9]*", |lex| lex.slice().to_owned())]
    Ident(String),
}
