//! SPICE deck tokenizer and statement parser.
//!
//! Parsing a deck never fails. A line that cannot be tokenized or classified
//! is kept as an opaque comment-like statement and reported as a
//! [`ParseWarning`], so that every byte of the input survives a round trip.

#[cfg(test)]
mod tests;

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt::Display;
use std::ops::{Deref, Range};
use std::str::FromStr;

use arcstr::ArcStr;
use nom::bytes::complete::{take_till, take_while};
use thiserror::Error;

use crate::statement::{
    Arg, CloneOrigin, Directive, Instance, Marker, ParamDecl, Statement, StatementKind, Subckt,
};

/// The character that continues the previous logical line.
pub const LINE_CONTINUATION: char = '+';

/// A substring of the deck being parsed.
#[derive(Clone, Default, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Substr(arcstr::Substr);

/// The SPICE dialect to parse.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Debug)]
pub enum Dialect {
    /// Vanilla SPICE.
    ///
    /// Selected by default. Full-line comments start with `*` or `$`;
    /// inline comments start with `$` or `;`.
    #[default]
    Spice,
    /// LTspice.
    ///
    /// Full-line comments start with `*`, `;` or `#`; inline comments start with `;`.
    LtSpice,
}

/// An error parsing a SPICE dialect from a string.
#[derive(Copy, Clone, Debug, Error)]
#[error("error parsing SPICE dialect")]
pub struct ParseDialectError;

impl Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spice => write!(f, "spice"),
            Self::LtSpice => write!(f, "ltspice"),
        }
    }
}

impl FromStr for Dialect {
    type Err = ParseDialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spice" | "sp" => Ok(Self::Spice),
            "ltspice" | "lt" => Ok(Self::LtSpice),
            _ => Err(ParseDialectError),
        }
    }
}

impl Dialect {
    fn line_comments(&self) -> HashSet<char> {
        match self {
            Self::Spice => HashSet::from(['*', '$']),
            Self::LtSpice => HashSet::from(['*', ';', '#']),
        }
    }

    fn inline_comments(&self) -> HashSet<char> {
        match self {
            Self::Spice => HashSet::from(['$', ';']),
            Self::LtSpice => HashSet::from([';']),
        }
    }
}

/// A logical line of a deck.
///
/// A logical line is one physical line plus every `+` continuation line
/// directly following it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Line {
    raw: Substr,
    segments: Vec<Substr>,
    span: Range<usize>,
    eol: Substr,
}

/// The classification of a logical line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LineKind {
    /// An empty or whitespace-only line.
    Blank,
    /// A full-line comment.
    Comment,
    /// A line starting with `.`.
    Directive,
    /// A component instance.
    Instance,
    /// A continuation line with nothing to continue.
    Continuation,
}

/// Splits a deck into logical lines.
///
/// The tokenizer is a lazy iterator; cloning it before iteration, or calling
/// [`Tokenizer::restart`], yields the same sequence again.
#[derive(Clone, Debug)]
pub struct Tokenizer {
    data: Substr,
    rem: Substr,
    line_no: usize,
    comments: HashSet<char>,
}

/// A field-level token of a logical line.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Token {
    /// A word.
    ///
    /// Parenthesized and braced groups belong to a single word, spaces included.
    Word(ArcStr),
    /// An equal sign (`=`) outside any group.
    Equals,
    /// A trailing inline comment, including its leader.
    Comment(ArcStr),
}

/// A line that could not be tokenized.
#[derive(Debug, Error)]
pub struct TokenizerError {
    /// The byte offset in the logical line content.
    ofs: usize,
    message: ArcStr,
    token: ArcStr,
}

/// A non-fatal problem found while parsing a deck.
///
/// The offending line is kept verbatim.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParseWarning {
    /// The 1-based number of the first physical line.
    pub line: usize,
    /// The logical line content.
    pub text: ArcStr,
    /// Why the line was not understood.
    pub reason: ArcStr,
}

/// The result of parsing a deck.
#[derive(Debug, Clone, Default)]
pub struct ParsedDeck {
    /// The top-level statements.
    pub statements: Vec<Statement>,
    /// Lines that were kept verbatim because they could not be understood.
    pub warnings: Vec<ParseWarning>,
    /// The first line terminator found in the deck (`\n` if there is none).
    pub eol: ArcStr,
}

/// Parses SPICE decks into statements.
#[derive(Clone, Debug)]
pub struct Parser {
    dialect: Dialect,
    line_comments: HashSet<char>,
    inline_comments: HashSet<char>,
    state: ParserState,
}

#[derive(Clone, Debug, Default)]
struct ParserState {
    top: Vec<Statement>,
    open: Vec<Subckt>,
    pending_marker: Option<(Line, ArcStr, CloneOrigin)>,
    warnings: Vec<ParseWarning>,
}

/// The typed content of a single logical line.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum Parsed {
    Directive(Directive),
    Param(ParamDecl),
    SubcktBegin(Subckt),
    SubcktEnd(Option<ArcStr>),
    Instance(Instance),
}

impl Parser {
    /// Makes a new parser for the given SPICE dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            line_comments: dialect.line_comments(),
            inline_comments: dialect.inline_comments(),
            state: ParserState::default(),
        }
    }

    /// The dialect this parser accepts.
    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Parses the given deck.
    pub fn parse(dialect: Dialect, data: impl Into<Substr>) -> ParsedDeck {
        let data = data.into();
        let eol = detect_eol(&data);
        let mut parser = Self::new(dialect);
        for line in Tokenizer::new(dialect, data) {
            parser.parse_line(line);
        }
        parser.finish(eol)
    }

    fn parse_line(&mut self, line: Line) {
        match line.kind(&self.line_comments) {
            LineKind::Blank | LineKind::Comment => self.parse_comment(line),
            LineKind::Continuation => {
                self.flush_marker();
                self.opaque(line, "line continuation with nothing to continue");
            }
            LineKind::Directive | LineKind::Instance => {
                let (code, comment) = line.split_comments(&self.inline_comments);
                match parse_content(&self.inline_comments, &code, comment) {
                    Ok(Parsed::SubcktBegin(subckt)) => self.open_subckt(subckt, line),
                    Ok(Parsed::SubcktEnd(name)) => {
                        self.flush_marker();
                        self.close_subckt(name, line);
                    }
                    Ok(Parsed::Directive(d)) => {
                        self.flush_marker();
                        self.push(Statement::parsed(StatementKind::Directive(d), line));
                    }
                    Ok(Parsed::Param(p)) => {
                        self.flush_marker();
                        self.push(Statement::parsed(StatementKind::Param(p), line));
                    }
                    Ok(Parsed::Instance(inst)) => {
                        self.flush_marker();
                        self.push(Statement::parsed(StatementKind::Instance(inst), line));
                    }
                    Err(reason) => {
                        self.flush_marker();
                        self.opaque(line, reason);
                    }
                }
            }
        }
    }

    fn parse_comment(&mut self, line: Line) {
        match Marker::parse(&line.content()) {
            Some(Marker::Begin { name, origin }) => {
                self.flush_marker();
                self.state.pending_marker = Some((line, name, origin));
            }
            Some(Marker::End { name }) => {
                self.flush_marker();
                let closes_clone = self
                    .scope_mut()
                    .last()
                    .and_then(Statement::as_subckt)
                    .is_some_and(|subckt| {
                        subckt.clone_of().is_some()
                            && subckt.end_marker().is_none()
                            && subckt.name().eq_ignore_ascii_case(&name)
                    });
                if closes_clone {
                    if let Some(subckt) = self.scope_mut().last_mut().and_then(Statement::subckt_mut) {
                        subckt.attach_end_marker(line);
                        return;
                    }
                }
                self.push_comment(line);
            }
            None => {
                self.flush_marker();
                self.push_comment(line);
            }
        }
    }

    fn open_subckt(&mut self, mut subckt: Subckt, line: Line) {
        subckt.set_header(line);
        if let Some((marker, name, origin)) = self.state.pending_marker.take() {
            if name.eq_ignore_ascii_case(subckt.name()) {
                subckt.attach_begin_marker(marker, origin);
            } else {
                self.push_comment(marker);
            }
        }
        tracing::debug!(name = %subckt.name(), "opening subcircuit");
        self.state.open.push(subckt);
    }

    fn close_subckt(&mut self, name: Option<ArcStr>, line: Line) {
        let Some(mut subckt) = self.state.open.pop() else {
            self.opaque(line, "`.ends` without a matching `.subckt`");
            return;
        };
        if let Some(name) = name {
            if !name.eq_ignore_ascii_case(subckt.name()) {
                tracing::warn!(
                    expected = %subckt.name(),
                    found = %name,
                    line = line.line_no(),
                    "`.ends` name does not match the open subcircuit"
                );
            }
        }
        subckt.close(line);
        let eol = subckt.footer().map(|l| ArcStr::from(l.eol())).unwrap_or_default();
        self.push(Statement::fresh(StatementKind::Subckt(subckt), eol));
    }

    fn finish(mut self, eol: ArcStr) -> ParsedDeck {
        self.flush_marker();
        while let Some(subckt) = self.state.open.pop() {
            let (line, text) = subckt
                .header()
                .map(|l| (l.line_no(), ArcStr::from(l.content())))
                .unwrap_or_default();
            self.warn(line, text, "subcircuit is not terminated by `.ends`");
            self.push(Statement::fresh(StatementKind::Subckt(subckt), eol.clone()));
        }
        ParsedDeck {
            statements: self.state.top,
            warnings: self.state.warnings,
            eol,
        }
    }

    fn flush_marker(&mut self) {
        if let Some((line, _, _)) = self.state.pending_marker.take() {
            self.push_comment(line);
        }
    }

    fn scope_mut(&mut self) -> &mut Vec<Statement> {
        match self.state.open.last_mut() {
            Some(subckt) => &mut subckt.body,
            None => &mut self.state.top,
        }
    }

    fn push(&mut self, stmt: Statement) {
        self.scope_mut().push(stmt);
    }

    fn push_comment(&mut self, line: Line) {
        let text = ArcStr::from(line.content());
        self.push(Statement::parsed(StatementKind::Comment(text), line));
    }

    fn opaque(&mut self, line: Line, reason: impl Into<ArcStr>) {
        let text = ArcStr::from(line.content());
        self.warn(line.line_no(), text.clone(), reason);
        self.push(Statement::parsed(StatementKind::Comment(text), line));
    }

    fn warn(&mut self, line: usize, text: ArcStr, reason: impl Into<ArcStr>) {
        let warning = ParseWarning {
            line,
            text,
            reason: reason.into(),
        };
        tracing::warn!(line = warning.line, text = %warning.text, "{}", warning.reason);
        self.state.warnings.push(warning);
    }
}

/// Parses a single statement from text supplied by a caller.
///
/// Only directives, `.param` lines and instances are accepted.
pub(crate) fn parse_statement(dialect: Dialect, text: &str) -> Result<StatementKind, ArcStr> {
    let text = text.trim();
    if text.contains(['\n', '\r']) {
        return Err(arcstr::literal!("expected a single line"));
    }
    match parse_content(&dialect.inline_comments(), text, None)? {
        Parsed::Directive(d) => Ok(StatementKind::Directive(d)),
        Parsed::Param(p) => Ok(StatementKind::Param(p)),
        Parsed::Instance(inst) => Ok(StatementKind::Instance(inst)),
        Parsed::SubcktBegin(_) | Parsed::SubcktEnd(_) => {
            Err(arcstr::literal!("subcircuit boundaries cannot be added as statements"))
        }
    }
}

fn parse_content(
    inline_comments: &HashSet<char>,
    content: &str,
    comment: Option<ArcStr>,
) -> Result<Parsed, ArcStr> {
    let mut tokens = tokenize(content, inline_comments).map_err(|e| arcstr::format!("{e}"))?;
    tokens.extend(comment.map(Token::Comment));
    let (args, comment) = group_args(tokens)?;
    let first = match args.first() {
        Some(Arg::Word(w)) => w.clone(),
        _ => return Err(arcstr::literal!("line does not start with a word")),
    };
    if !first.starts_with('.') {
        return parse_instance(args, comment).map(Parsed::Instance);
    }
    let rest = args[1..].to_vec();
    if first.eq_ignore_ascii_case(".subckt") {
        parse_subckt(first, rest).map(Parsed::SubcktBegin)
    } else if first.eq_ignore_ascii_case(".ends") {
        match rest.first() {
            None => Ok(Parsed::SubcktEnd(None)),
            Some(Arg::Word(name)) => Ok(Parsed::SubcktEnd(Some(name.clone()))),
            Some(Arg::Param { .. }) => Err(arcstr::literal!("malformed `.ends`")),
        }
    } else if first.eq_ignore_ascii_case(".param") || first.eq_ignore_ascii_case(".params") {
        parse_param(first, rest, comment).map(Parsed::Param)
    } else {
        Ok(Parsed::Directive(Directive {
            keyword: first,
            args: rest,
            comment,
        }))
    }
}

fn is_params_keyword(word: &str) -> bool {
    word.eq_ignore_ascii_case("params:")
}

fn parse_subckt(keyword: ArcStr, args: Vec<Arg>) -> Result<Subckt, ArcStr> {
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Arg::Word(name)) => name,
        _ => return Err(arcstr::literal!("`.subckt` without a name")),
    };
    let mut ports = Vec::new();
    let mut params = Vec::new();
    for arg in args {
        match arg {
            Arg::Word(w) if is_params_keyword(&w) => {}
            Arg::Word(w) if params.is_empty() => ports.push(w),
            Arg::Word(w) => return Err(arcstr::format!("unexpected `{w}` among subcircuit parameters")),
            Arg::Param { name, value } => params.push((name, value)),
        }
    }
    Ok(Subckt::new(keyword, name, ports, params, None))
}

fn parse_param(
    keyword: ArcStr,
    args: Vec<Arg>,
    comment: Option<ArcStr>,
) -> Result<ParamDecl, ArcStr> {
    let mut assignments = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg {
            Arg::Param { name, value } => assignments.push((name, value)),
            Arg::Word(name) => match args.next() {
                Some(Arg::Word(value)) => assignments.push((name, value)),
                _ => return Err(arcstr::format!("parameter `{name}` has no value")),
            },
        }
    }
    if assignments.is_empty() {
        return Err(arcstr::literal!("`.param` declares no parameters"));
    }
    Ok(ParamDecl {
        keyword,
        assignments,
        comment,
    })
}

/// The number of nodes of an element, given its type letter and the number of
/// positional words following its designator.
fn node_count(kind: char, positional: usize) -> Result<usize, ArcStr> {
    Ok(match kind {
        'B' | 'C' | 'D' | 'F' | 'H' | 'I' | 'K' | 'L' | 'R' | 'V' | 'W' => 2,
        'J' | 'Q' | 'U' | 'Z' => 3,
        'O' | 'S' | 'T' => 4,
        'E' | 'G' => {
            if positional >= 5 {
                4
            } else {
                2
            }
        }
        'M' => {
            if positional >= 5 {
                4
            } else {
                3
            }
        }
        'A' => 8,
        'X' => positional
            .checked_sub(1)
            .ok_or(arcstr::literal!("subcircuit instance without a subcircuit name"))?,
        kind => return Err(arcstr::format!("unrecognized element type `{kind}`")),
    })
}

/// Elements whose value is everything after their nodes.
fn value_is_rest_of_line(kind: char) -> bool {
    matches!(
        kind,
        'B' | 'E' | 'F' | 'G' | 'H' | 'I' | 'S' | 'T' | 'U' | 'V' | 'W'
    )
}

fn parse_instance(args: Vec<Arg>, comment: Option<ArcStr>) -> Result<Instance, ArcStr> {
    let mut args = args.into_iter();
    let designator = match args.next() {
        Some(Arg::Word(w)) => w,
        _ => return Err(arcstr::literal!("missing designator")),
    };
    let rest: Vec<Arg> = args.collect();
    let kind = designator
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or_default();
    let positional = rest
        .iter()
        .take_while(|arg| matches!(arg, Arg::Word(w) if !is_params_keyword(w)))
        .count();
    let nodes = node_count(kind, positional)?;
    if positional < nodes || rest.len() <= nodes {
        return Err(arcstr::format!(
            "`{designator}` needs {nodes} nodes and a value"
        ));
    }
    let node_names = rest[..nodes]
        .iter()
        .filter_map(Arg::as_word)
        .cloned()
        .collect();
    let (value, args) = if value_is_rest_of_line(kind) {
        let value = rest[nodes..]
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        (ArcStr::from(value), Vec::new())
    } else {
        match &rest[nodes] {
            Arg::Word(value) => (value.clone(), rest[nodes + 1..].to_vec()),
            Arg::Param { .. } => {
                return Err(arcstr::format!("`{designator}` has no value"));
            }
        }
    };
    Ok(Instance {
        designator,
        nodes: node_names,
        value,
        args,
        comment,
    })
}

/// Pairs `name = value` tokens and separates the trailing comment.
fn group_args(tokens: Vec<Token>) -> Result<(Vec<Arg>, Option<ArcStr>), ArcStr> {
    let mut args: Vec<Arg> = Vec::new();
    let mut comment = None;
    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        match token {
            Token::Word(w) => args.push(Arg::Word(w)),
            Token::Equals => {
                let name = match args.pop() {
                    Some(Arg::Word(name)) => name,
                    _ => return Err(arcstr::literal!("`=` without a parameter name")),
                };
                let value = match tokens.next() {
                    Some(Token::Word(value)) => value,
                    _ => return Err(arcstr::format!("parameter `{name}` has no value")),
                };
                args.push(Arg::Param { name, value });
            }
            Token::Comment(c) => comment = Some(c),
        }
    }
    Ok((args, comment))
}

/// Splits the content of a logical line into tokens.
pub fn tokenize(
    content: &str,
    inline_comments: &HashSet<char>,
) -> Result<Vec<Token>, TokenizerError> {
    let mut tokens = Vec::new();
    let mut rem = content;
    loop {
        let (rest, _) = take_while::<_, _, ()>(is_space)(rem).unwrap_or((rem, ""));
        rem = rest;
        let Some(c) = rem.chars().next() else {
            break;
        };
        if c == '=' {
            tokens.push(Token::Equals);
            rem = &rem[1..];
        } else if inline_comments.contains(&c) {
            tokens.push(Token::Comment(rem.trim_end().into()));
            break;
        } else {
            let len = word_len(rem).map_err(|message| TokenizerError {
                ofs: content.len() - rem.len(),
                message,
                token: rem.into(),
            })?;
            tokens.push(Token::Word(rem[..len].into()));
            rem = &rem[len..];
        }
    }
    Ok(tokens)
}

/// Splits one physical line into code and a trailing inline comment.
///
/// `groups` holds the groups left open by earlier physical lines of the same
/// logical line; a comment leader only counts at the start of a word outside
/// every group.
fn split_inline_comment<'a>(
    segment: &'a str,
    inline_comments: &HashSet<char>,
    groups: &mut Vec<char>,
) -> (&'a str, Option<&'a str>) {
    let mut word_start = true;
    for (i, c) in segment.char_indices() {
        if groups.is_empty() {
            if word_start && inline_comments.contains(&c) {
                return (&segment[..i], Some(segment[i..].trim_end()));
            }
            word_start = is_space(c) || c == '=';
        }
        match (groups.last().copied(), c) {
            (None, '(' | '{') | (Some('('), '(' | '{') | (Some('{'), '{') => groups.push(c),
            (Some('('), ')') | (Some('{'), '}') => {
                groups.pop();
            }
            _ => {}
        }
    }
    (segment, None)
}

/// The byte length of the word at the start of `s`.
fn word_len(s: &str) -> Result<usize, ArcStr> {
    let mut groups: Vec<char> = Vec::new();
    for (i, c) in s.char_indices() {
        match groups.last().copied() {
            // Inside braces only braces nest.
            Some('{') => match c {
                '{' => groups.push(c),
                '}' => {
                    groups.pop();
                }
                _ => {}
            },
            Some(_) => match c {
                '(' | '{' => groups.push(c),
                ')' => {
                    groups.pop();
                }
                _ => {}
            },
            None => match c {
                c if is_space(c) || c == '=' => return Ok(i),
                '(' | '{' => groups.push(c),
                _ => {}
            },
        }
    }
    match groups.last() {
        None => Ok(s.len()),
        Some(open) => Err(arcstr::format!("unterminated `{open}`")),
    }
}

fn detect_eol(data: &str) -> ArcStr {
    match data.find(is_newline) {
        Some(i) if data[i..].starts_with("\r\n") => arcstr::literal!("\r\n"),
        Some(i) if data[i..].starts_with('\r') => arcstr::literal!("\r"),
        _ => arcstr::literal!("\n"),
    }
}

#[inline]
fn is_newline(c: char) -> bool {
    c == '\n' || c == '\r'
}

#[inline]
fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

impl Tokenizer {
    /// Creates a tokenizer over the given deck.
    pub fn new(dialect: Dialect, data: impl Into<Substr>) -> Self {
        let data = data.into();
        Self {
            rem: data.clone(),
            data,
            line_no: 0,
            comments: dialect.line_comments(),
        }
    }

    /// Rewinds the tokenizer to the start of the deck.
    pub fn restart(&mut self) {
        self.rem = self.data.clone();
        self.line_no = 0;
    }

    /// Takes one physical line, returning its content and terminator.
    fn take_physical(&mut self) -> Option<(Substr, Substr)> {
        if self.rem.is_empty() {
            return None;
        }
        let rem: &str = &self.rem;
        let (rest, content) = take_till::<_, _, ()>(is_newline)(rem).unwrap_or(("", rem));
        let eol_len = if rest.starts_with("\r\n") {
            2
        } else if rest.starts_with(is_newline) {
            1
        } else {
            0
        };
        let content = self.rem.slice(content);
        let eol = self.rem.slice(&rest[..eol_len]);
        let rest = self.rem.slice(&rest[eol_len..]);
        self.rem = rest;
        self.line_no += 1;
        Some((content, eol))
    }

    fn next_is_continuation(&self) -> bool {
        let (rest, _) = take_while::<_, _, ()>(is_space)(self.rem.as_str())
            .unwrap_or((self.rem.as_str(), ""));
        rest.starts_with(LINE_CONTINUATION)
    }

    fn starts_comment(&self, content: &str) -> bool {
        match content.trim_start().chars().next() {
            None => true,
            Some(c) => self.comments.contains(&c),
        }
    }
}

impl Iterator for Tokenizer {
    type Item = Line;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.line_no;
        let raw_start = self.data.len() - self.rem.len();
        let (first, mut eol) = self.take_physical()?;
        let mut segments = vec![first];
        if !self.starts_comment(&segments[0]) {
            while !eol.is_empty() && self.next_is_continuation() {
                let Some((segment, next_eol)) = self.take_physical() else {
                    break;
                };
                segments.push(segment);
                eol = next_eol;
            }
        }
        let raw_end = self.data.len() - self.rem.len();
        Some(Line {
            raw: Substr(self.data.0.substr(raw_start..raw_end)),
            segments,
            span: start..self.line_no,
            eol,
        })
    }
}

impl Line {
    /// The raw source text, including every line terminator.
    #[inline]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The physical lines, without their terminators.
    #[inline]
    pub fn segments(&self) -> &[Substr] {
        &self.segments
    }

    /// The 0-based range of physical lines covered by this logical line.
    #[inline]
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// The 1-based number of the first physical line.
    #[inline]
    pub fn line_no(&self) -> usize {
        self.span.start + 1
    }

    /// The terminator of the last physical line; empty at the end of input.
    #[inline]
    pub fn eol(&self) -> &str {
        &self.eol
    }

    /// The folded content: continuation lines are joined to the first line
    /// with a single space, without their `+`.
    pub fn content(&self) -> String {
        let mut content = self.segments[0].trim().to_string();
        for segment in self.segments[1..].iter() {
            let segment = segment
                .trim_start()
                .trim_start_matches(LINE_CONTINUATION)
                .trim();
            if !segment.is_empty() {
                content.push(' ');
                content.push_str(segment);
            }
        }
        content
    }

    /// The folded content with inline comments removed from every physical
    /// line, and those comments joined in order.
    pub fn split_comments(&self, inline_comments: &HashSet<char>) -> (String, Option<ArcStr>) {
        let mut groups = Vec::new();
        let mut code: Vec<&str> = Vec::new();
        let mut comments: Vec<&str> = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            let segment = if i == 0 {
                segment.trim()
            } else {
                segment
                    .trim_start()
                    .trim_start_matches(LINE_CONTINUATION)
                    .trim()
            };
            let (text, comment) = split_inline_comment(segment, inline_comments, &mut groups);
            let text = text.trim();
            if !text.is_empty() {
                code.push(text);
            }
            comments.extend(comment);
        }
        let comment = (!comments.is_empty()).then(|| ArcStr::from(comments.join(" ")));
        (code.join(" "), comment)
    }

    /// Classifies this line by its first non-blank character.
    pub fn kind(&self, comments: &HashSet<char>) -> LineKind {
        match self.segments[0].trim_start().chars().next() {
            None => LineKind::Blank,
            Some(c) if comments.contains(&c) => LineKind::Comment,
            Some(LINE_CONTINUATION) => LineKind::Continuation,
            Some('.') => LineKind::Directive,
            Some(_) => LineKind::Instance,
        }
    }
}

impl Substr {
    /// Maps a subslice of `self` back to a [`Substr`] sharing the same buffer.
    fn slice(&self, s: &str) -> Substr {
        Substr(self.0.substr_from(s))
    }
}

impl Deref for Substr {
    type Target = arcstr::Substr;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Substr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Substr> for arcstr::Substr {
    fn from(value: Substr) -> Self {
        value.0
    }
}

impl From<&str> for Substr {
    fn from(value: &str) -> Self {
        Self(arcstr::Substr::from(value))
    }
}

impl From<arcstr::Substr> for Substr {
    fn from(value: arcstr::Substr) -> Self {
        Self(value)
    }
}

impl From<ArcStr> for Substr {
    fn from(value: ArcStr) -> Self {
        Self(arcstr::Substr::full(value))
    }
}

impl From<&Substr> for ArcStr {
    fn from(value: &Substr) -> Self {
        ArcStr::from(value.as_str())
    }
}

impl Borrow<str> for Substr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for TokenizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (token `{}` at offset {})",
            self.message, self.token, self.ofs
        )
    }
}

impl Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}: `{}`", self.line, self.reason, self.text)
    }
}
