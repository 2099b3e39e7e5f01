//! The statement model of a parsed deck.
//!
//! Every statement remembers the logical line it was parsed from. A statement
//! that has not been mutated since parsing is serialized from that source text,
//! byte-for-byte; a mutated statement is formatted afresh from its fields.

use std::fmt::Display;

use arcstr::ArcStr;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use crate::parser::Line;
use crate::path::{DesignatorPath, SUBCIRCUIT_DIVIDER};

/// The tag identifying comment lines that bracket editor-generated subcircuits.
pub const CLONE_MARKER_TAG: &str = "[spice-editor]";

lazy_static! {
    static ref BEGIN_MARKER: Regex = Regex::new(
        r"^\*+\s*\[spice-editor\]\s+begin\s+clone\s+(\S+)\s+of\s+(\S+)\s+for\s+(\S+)\s*$"
    )
    .unwrap();
    static ref END_MARKER: Regex =
        Regex::new(r"^\*+\s*\[spice-editor\]\s+end\s+clone\s+(\S+)\s*$").unwrap();
}

/// A single statement of a deck.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Statement {
    kind: StatementKind,
    source: Option<Line>,
    eol: ArcStr,
}

/// The typed content of a [`Statement`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StatementKind {
    /// A comment, a blank line, or a line that could not be parsed.
    ///
    /// Reproduced verbatim.
    Comment(ArcStr),
    /// A dot directive other than `.param`, `.subckt` and `.ends`.
    Directive(Directive),
    /// A `.param` directive.
    Param(ParamDecl),
    /// A component instance.
    Instance(Instance),
    /// A subcircuit definition.
    Subckt(Subckt),
}

/// An argument following the positional fields of a line.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Arg {
    /// A bare word.
    Word(ArcStr),
    /// A `name=value` pair.
    Param {
        /// The parameter name.
        name: ArcStr,
        /// The parameter value.
        value: ArcStr,
    },
}

/// A dot directive, such as `.ac dec 10 1 100k` or `.backanno`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Directive {
    /// The directive keyword, including the leading dot, as written.
    pub keyword: ArcStr,
    /// The arguments following the keyword.
    pub args: Vec<Arg>,
    /// A trailing inline comment, including its leader.
    pub comment: Option<ArcStr>,
}

/// A `.param` directive.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParamDecl {
    /// The directive keyword as written (`.param`, `.PARAMS`, ...).
    pub keyword: ArcStr,
    /// The declared parameters and their expressions, in declaration order.
    pub assignments: Vec<(ArcStr, ArcStr)>,
    /// A trailing inline comment, including its leader.
    pub comment: Option<ArcStr>,
}

/// A component instance.
///
/// An instance whose designator starts with `X` references a subcircuit
/// by name through its [`value`](Instance::value).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Instance {
    /// The designator, e.g. `R1` or `XU1`.
    pub designator: ArcStr,
    /// The connected nodes.
    pub nodes: Vec<ArcStr>,
    /// The value, model, or subcircuit name.
    pub value: ArcStr,
    /// Arguments after the value, including inline `name=value` parameters.
    pub args: Vec<Arg>,
    /// A trailing inline comment, including its leader.
    pub comment: Option<ArcStr>,
}

/// Records that a subcircuit was generated by specializing another one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CloneOrigin {
    /// The name of the subcircuit that was copied.
    pub origin: ArcStr,
    /// The designator path of the instance the copy was made for.
    pub path: DesignatorPath,
}

/// A subcircuit definition.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Subckt {
    keyword: ArcStr,
    name: ArcStr,
    ports: Vec<ArcStr>,
    params: Vec<(ArcStr, ArcStr)>,
    pub(crate) body: Vec<Statement>,
    clone_of: Option<CloneOrigin>,
    terminated: bool,
    header: Option<Line>,
    footer: Option<Line>,
    begin_marker: Option<Line>,
    end_marker: Option<Line>,
    eol: ArcStr,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum Marker {
    Begin { name: ArcStr, origin: CloneOrigin },
    End { name: ArcStr },
}

impl Statement {
    pub(crate) fn parsed(kind: StatementKind, source: Line) -> Self {
        Self {
            eol: source.eol().into(),
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn fresh(kind: StatementKind, eol: ArcStr) -> Self {
        Self {
            kind,
            source: None,
            eol,
        }
    }

    /// The typed content of this statement.
    #[inline]
    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// The logical line this statement was parsed from, if it is unmodified.
    #[inline]
    pub fn source(&self) -> Option<&Line> {
        self.source.as_ref()
    }

    /// Returns `true` if this statement must be formatted afresh when serialized.
    pub fn is_modified(&self) -> bool {
        match &self.kind {
            StatementKind::Subckt(s) => s.is_modified(),
            _ => self.source.is_none(),
        }
    }

    /// The line terminator used when this statement is formatted afresh.
    #[inline]
    pub fn eol(&self) -> &str {
        &self.eol
    }

    /// The statement as an instance, if it is one.
    pub fn as_instance(&self) -> Option<&Instance> {
        match &self.kind {
            StatementKind::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    /// The statement as a subcircuit definition, if it is one.
    pub fn as_subckt(&self) -> Option<&Subckt> {
        match &self.kind {
            StatementKind::Subckt(subckt) => Some(subckt),
            _ => None,
        }
    }

    /// The statement as a `.param` directive, if it is one.
    pub fn as_param(&self) -> Option<&ParamDecl> {
        match &self.kind {
            StatementKind::Param(decl) => Some(decl),
            _ => None,
        }
    }

    /// The statement as a directive, if it is one.
    pub fn as_directive(&self) -> Option<&Directive> {
        match &self.kind {
            StatementKind::Directive(d) => Some(d),
            _ => None,
        }
    }

    /// The lowercase directive keyword, if this is a directive or `.param`.
    pub(crate) fn keyword(&self) -> Option<String> {
        match &self.kind {
            StatementKind::Directive(d) => Some(d.keyword.to_ascii_lowercase()),
            StatementKind::Param(p) => Some(p.keyword.to_ascii_lowercase()),
            _ => None,
        }
    }

    pub(crate) fn instance_mut(&mut self) -> Option<&mut Instance> {
        match &mut self.kind {
            StatementKind::Instance(inst) => {
                self.source = None;
                Some(inst)
            }
            _ => None,
        }
    }

    pub(crate) fn param_mut(&mut self) -> Option<&mut ParamDecl> {
        match &mut self.kind {
            StatementKind::Param(decl) => {
                self.source = None;
                Some(decl)
            }
            _ => None,
        }
    }

    /// Subcircuits track their own header and footer, so borrowing one mutably
    /// does not invalidate any source text.
    pub(crate) fn subckt_mut(&mut self) -> Option<&mut Subckt> {
        match &mut self.kind {
            StatementKind::Subckt(subckt) => Some(subckt),
            _ => None,
        }
    }
}

impl Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comment(text) => write!(f, "{text}"),
            Self::Directive(d) => write!(f, "{d}"),
            Self::Param(p) => write!(f, "{p}"),
            Self::Instance(inst) => write!(f, "{inst}"),
            Self::Subckt(subckt) => write!(f, "{}", subckt.header_text()),
        }
    }
}

impl Arg {
    /// The word, if this argument is a bare word.
    pub fn as_word(&self) -> Option<&ArcStr> {
        match self {
            Self::Word(w) => Some(w),
            Self::Param { .. } => None,
        }
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Word(w) => write!(f, "{w}"),
            Self::Param { name, value } => write!(f, "{name}={value}"),
        }
    }
}

fn write_comment(f: &mut std::fmt::Formatter<'_>, comment: &Option<ArcStr>) -> std::fmt::Result {
    if let Some(comment) = comment {
        write!(f, " {comment}")?;
    }
    Ok(())
}

impl Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword)?;
        for arg in self.args.iter() {
            write!(f, " {arg}")?;
        }
        write_comment(f, &self.comment)
    }
}

impl ParamDecl {
    /// Creates a `.param` directive declaring a single parameter.
    pub fn new(name: impl Into<ArcStr>, expr: impl Into<ArcStr>) -> Self {
        Self {
            keyword: arcstr::literal!(".param"),
            assignments: vec![(name.into(), expr.into())],
            comment: None,
        }
    }

    /// The expression assigned to `name`, if this directive declares it.
    pub fn get(&self, name: &str) -> Option<&ArcStr> {
        self.assignments
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Replaces the expression of an existing assignment.
    ///
    /// Returns `false` if this directive does not declare `name`.
    pub(crate) fn set(&mut self, name: &str, expr: ArcStr) -> bool {
        match self
            .assignments
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => {
                *v = expr;
                true
            }
            None => false,
        }
    }
}

impl Display for ParamDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword)?;
        for (name, expr) in self.assignments.iter() {
            write!(f, " {name}={expr}")?;
        }
        write_comment(f, &self.comment)
    }
}

impl Instance {
    /// The element type letter, uppercased.
    pub fn prefix(&self) -> char {
        self.designator
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or_default()
    }

    /// Returns `true` if this instance references a subcircuit.
    #[inline]
    pub fn is_subckt_ref(&self) -> bool {
        self.prefix() == 'X'
    }

    /// Inline `name=value` parameters, in order.
    pub fn params(&self) -> impl Iterator<Item = (&ArcStr, &ArcStr)> {
        self.args.iter().filter_map(|arg| match arg {
            Arg::Param { name, value } => Some((name, value)),
            Arg::Word(_) => None,
        })
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.designator)?;
        for node in self.nodes.iter() {
            write!(f, " {node}")?;
        }
        write!(f, " {}", self.value)?;
        for arg in self.args.iter() {
            write!(f, " {arg}")?;
        }
        write_comment(f, &self.comment)
    }
}

impl CloneOrigin {
    /// The comment line emitted before a generated subcircuit.
    pub fn begin_marker(&self, name: &str) -> String {
        format!(
            "*** {CLONE_MARKER_TAG} begin clone {name} of {} for {}",
            self.origin,
            self.path.join(&SUBCIRCUIT_DIVIDER.to_string())
        )
    }

    /// The comment line emitted after a generated subcircuit.
    pub fn end_marker(name: &str) -> String {
        format!("*** {CLONE_MARKER_TAG} end clone {name}")
    }
}

impl Marker {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(caps) = BEGIN_MARKER.captures(text) {
            return Some(Self::Begin {
                name: caps[1].into(),
                origin: CloneOrigin {
                    origin: caps[2].into(),
                    path: DesignatorPath::from(&caps[3]),
                },
            });
        }
        END_MARKER
            .captures(text)
            .map(|caps| Self::End { name: caps[1].into() })
    }
}

impl Subckt {
    pub(crate) fn new(
        keyword: ArcStr,
        name: ArcStr,
        ports: Vec<ArcStr>,
        params: Vec<(ArcStr, ArcStr)>,
        header: Option<Line>,
    ) -> Self {
        Self {
            keyword,
            name,
            ports,
            params,
            body: Vec::new(),
            clone_of: None,
            terminated: false,
            header,
            footer: None,
            begin_marker: None,
            end_marker: None,
            eol: ArcStr::default(),
        }
    }

    /// The subcircuit name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The port names, in order.
    #[inline]
    pub fn ports(&self) -> &[ArcStr] {
        &self.ports
    }

    /// The `params:` defaults, in declaration order.
    #[inline]
    pub fn params(&self) -> &[(ArcStr, ArcStr)] {
        &self.params
    }

    /// The default expression of the given parameter.
    pub fn param(&self, name: &str) -> Option<&ArcStr> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// The statements between `.subckt` and `.ends`.
    #[inline]
    pub fn body(&self) -> &[Statement] {
        &self.body
    }

    /// Where this subcircuit was copied from, if the editor generated it.
    #[inline]
    pub fn clone_of(&self) -> Option<&CloneOrigin> {
        self.clone_of.as_ref()
    }

    /// Returns `true` if the header, footer or body must be formatted afresh.
    pub fn is_modified(&self) -> bool {
        self.header.is_none()
            || (self.terminated && self.footer.is_none())
            || self.body.iter().any(Statement::is_modified)
    }

    pub(crate) fn header(&self) -> Option<&Line> {
        self.header.as_ref()
    }

    pub(crate) fn footer(&self) -> Option<&Line> {
        self.footer.as_ref()
    }

    pub(crate) fn begin_marker(&self) -> Option<&Line> {
        self.begin_marker.as_ref()
    }

    pub(crate) fn end_marker(&self) -> Option<&Line> {
        self.end_marker.as_ref()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub(crate) fn set_header(&mut self, header: Line) {
        self.eol = header.eol().into();
        self.header = Some(header);
    }

    /// The terminator of the `.subckt` line, reused for generated lines.
    pub(crate) fn eol(&self) -> &str {
        &self.eol
    }

    pub(crate) fn close(&mut self, footer: Line) {
        self.footer = Some(footer);
        self.terminated = true;
    }

    pub(crate) fn attach_begin_marker(&mut self, line: Line, origin: CloneOrigin) {
        self.begin_marker = Some(line);
        self.clone_of = Some(origin);
    }

    pub(crate) fn attach_end_marker(&mut self, line: Line) {
        self.end_marker = Some(line);
    }

    /// Replaces the default of an existing `params:` entry.
    ///
    /// Returns `false` if the subcircuit declares no such parameter.
    pub(crate) fn set_param(&mut self, name: &str, expr: ArcStr) -> bool {
        match self
            .params
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => {
                *v = expr;
                self.header = None;
                true
            }
            None => false,
        }
    }

    /// Deep-copies this definition under a new name.
    ///
    /// Body statements keep their source text; the header, footer and
    /// clone markers are generated.
    pub(crate) fn specialize(&self, name: ArcStr, origin: CloneOrigin) -> Self {
        Self {
            keyword: self.keyword.clone(),
            name,
            ports: self.ports.clone(),
            params: self.params.clone(),
            body: self.body.clone(),
            clone_of: Some(origin),
            terminated: true,
            header: None,
            footer: None,
            begin_marker: None,
            end_marker: None,
            eol: self.eol.clone(),
        }
    }

    /// The `.subckt` line, formatted afresh.
    pub fn header_text(&self) -> String {
        let mut text = format!("{} {}", self.keyword, self.name);
        for port in self.ports.iter() {
            text.push(' ');
            text.push_str(port);
        }
        if !self.params.is_empty() {
            text.push_str(" params: ");
            text.push_str(
                &self
                    .params
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .join(" "),
            );
        }
        text
    }

    /// The `.ends` line, formatted afresh.
    pub fn footer_text(&self) -> String {
        let keyword = if self.keyword.chars().any(|c| c.is_ascii_lowercase()) {
            ".ends"
        } else {
            ".ENDS"
        };
        format!("{keyword} {}", self.name)
    }
}
