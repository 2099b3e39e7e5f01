//! Deck serialization.

use std::fmt::{self, Display, Write};

use crate::document::Document;
use crate::statement::{CloneOrigin, Statement, StatementKind, Subckt};

/// Writes a [`Document`] back out as deck text.
///
/// Statements that were not edited are written from their source text, so an
/// unedited document reproduces its input exactly.
pub struct Netlister<'a, W: Write> {
    doc: &'a Document,
    out: &'a mut W,
    at_line_start: bool,
}

impl<'a, W: Write> Netlister<'a, W> {
    /// Create a new netlister writing the given document to the given output.
    pub fn new(doc: &'a Document, out: &'a mut W) -> Self {
        Self {
            doc,
            out,
            at_line_start: true,
        }
    }

    /// Exports the document to the output.
    #[inline]
    pub fn export(mut self) -> fmt::Result {
        let doc = self.doc;
        for stmt in doc.statements() {
            self.export_statement(stmt)?;
        }
        Ok(())
    }

    fn export_statement(&mut self, stmt: &Statement) -> fmt::Result {
        match (stmt.kind(), stmt.source()) {
            (StatementKind::Subckt(subckt), _) => self.export_subckt(subckt),
            (_, Some(line)) => self.raw(line.raw()),
            (kind, None) => self.fresh(&kind.to_string(), stmt.eol()),
        }
    }

    fn export_subckt(&mut self, subckt: &Subckt) -> fmt::Result {
        let doc = self.doc;
        let eol = if subckt.eol().is_empty() {
            doc.eol().as_str()
        } else {
            subckt.eol()
        };
        match (subckt.begin_marker(), subckt.clone_of()) {
            (Some(line), _) => self.raw(line.raw())?,
            (None, Some(origin)) => self.fresh(&origin.begin_marker(subckt.name()), eol)?,
            (None, None) => {}
        }
        match subckt.header() {
            Some(line) => self.raw(line.raw())?,
            None => self.fresh(&subckt.header_text(), eol)?,
        }
        for stmt in subckt.body() {
            self.export_statement(stmt)?;
        }
        match subckt.footer() {
            Some(line) => self.raw(line.raw())?,
            None if subckt.is_terminated() => self.fresh(&subckt.footer_text(), eol)?,
            None => {}
        }
        match (subckt.end_marker(), subckt.clone_of()) {
            (Some(line), _) => self.raw(line.raw()),
            (None, Some(_)) => self.fresh(&CloneOrigin::end_marker(subckt.name()), eol),
            (None, None) => Ok(()),
        }
    }

    fn raw(&mut self, text: &str) -> fmt::Result {
        if text.is_empty() {
            return Ok(());
        }
        self.out.write_str(text)?;
        self.at_line_start = text.ends_with(['\n', '\r']);
        Ok(())
    }

    fn fresh(&mut self, text: &str, eol: &str) -> fmt::Result {
        if !self.at_line_start {
            self.out.write_str(self.doc.eol())?;
        }
        self.out.write_str(text)?;
        self.out.write_str(eol)?;
        self.at_line_start = !eol.is_empty();
        Ok(())
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Netlister::new(self, f).export()
    }
}

impl Document {
    /// Renders this document as deck text.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Writes this document to the given output stream.
    pub fn write_to(&self, mut out: impl std::io::Write) -> std::io::Result<()> {
        out.write_all(self.render().as_bytes())?;
        out.flush()
    }
}
