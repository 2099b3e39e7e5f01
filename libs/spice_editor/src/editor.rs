//! The editing surface over a [`Document`].

use std::path::Path;

use arcstr::ArcStr;
use itertools::Itertools;

use crate::conv::{format_eng, scan_eng};
use crate::document::{Document, EditError, EditResult, Location, ScopeAddr};
use crate::expr::{resolve, ParamTable};
use crate::parser::{parse_statement, Dialect, Line};
use crate::path::DesignatorPath;
use crate::statement::{ParamDecl, Statement, StatementKind};

/// Analysis directives of which a deck may hold only one.
pub const UNIQUE_ANALYSES: [&str; 6] = [".ac", ".dc", ".tran", ".noise", ".tf", ".op"];

/// Edits a deck in place.
///
/// Every operation either succeeds or leaves the deck unchanged. Edits below
/// a subcircuit instance first specialize the subcircuits along the path, so
/// other instances of the same subcircuits keep their values.
#[derive(Debug, Clone)]
pub struct Editor {
    doc: Document,
    base: Document,
}

fn normalize(text: &str) -> String {
    text.split_whitespace().join(" ").to_lowercase()
}

fn matches_prefix(designator: &str, prefixes: &str) -> bool {
    prefixes == "*"
        || designator
            .chars()
            .next()
            .is_some_and(|c| prefixes.chars().any(|p| p.eq_ignore_ascii_case(&c)))
}

/// The text of a statement as a single logical line.
fn statement_text(stmt: &Statement) -> String {
    stmt.source()
        .map(Line::content)
        .unwrap_or_else(|| stmt.kind().to_string())
}

impl From<Document> for Editor {
    fn from(doc: Document) -> Self {
        Self {
            base: doc.clone(),
            doc,
        }
    }
}

impl Editor {
    /// Parses a deck for editing.
    pub fn parse(text: &str) -> Self {
        Document::parse(text).into()
    }

    /// Parses a deck in the given dialect for editing.
    pub fn parse_dialect(text: &str, dialect: Dialect) -> Self {
        Document::parse_dialect(text, dialect).into()
    }

    /// Reads and parses the deck at `path`.
    pub fn open(path: impl AsRef<Path>) -> EditResult<Self> {
        Self::open_dialect(path, Dialect::default())
    }

    /// Reads and parses the deck at `path` in the given dialect.
    pub fn open_dialect(path: impl AsRef<Path>, dialect: Dialect) -> EditResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| EditError::FailedToRead {
            path: path.to_path_buf(),
            err,
        })?;
        Ok(Self::parse_dialect(&text, dialect))
    }

    /// Writes the edited deck to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> EditResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.doc.render()).map_err(|err| EditError::FailedToWrite {
            path: path.to_path_buf(),
            err,
        })
    }

    /// The document being edited.
    #[inline]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Consumes the editor, returning the edited document.
    #[inline]
    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Discards every edit, restoring the deck as it was parsed.
    pub fn reset(&mut self) {
        self.doc = self.base.clone();
        tracing::debug!("reset deck");
    }

    /// Renders the edited deck.
    pub fn render(&self) -> String {
        self.doc.render()
    }

    /// Specializes the subcircuits along `path`; see
    /// [`Document::clone_subckt_for_instance`].
    pub fn clone_subckt_for_instance(
        &mut self,
        path: impl Into<DesignatorPath>,
    ) -> EditResult<ArcStr> {
        self.doc.clone_subckt_for_instance(&path.into())
    }

    /// Locates the instance at `path`, specializing its enclosing subcircuits.
    fn locate_private(&mut self, path: &DesignatorPath) -> EditResult<Location> {
        self.doc.locate(path)?;
        if path.len() > 1 {
            self.doc.clone_subckt_for_instance(&path.parent())?;
        }
        self.doc.locate(path)
    }

    /// Resolves a scope path to the address of its body, specializing it.
    ///
    /// The empty path is the top level.
    fn scope_private(&mut self, scope: &DesignatorPath) -> EditResult<ScopeAddr> {
        if scope.is_empty() {
            return Ok(Vec::new());
        }
        self.doc.subckt_of(scope)?;
        self.doc.clone_subckt_for_instance(scope)?;
        self.doc.subckt_of(scope)
    }

    /// The value field of the instance at `path`.
    ///
    /// For subcircuit instances this is the subcircuit name.
    pub fn value(&self, path: impl Into<DesignatorPath>) -> EditResult<ArcStr> {
        Ok(self.doc.instance(&path.into())?.value.clone())
    }

    /// Replaces the value field of the instance at `path`.
    pub fn set_value(
        &mut self,
        path: impl Into<DesignatorPath>,
        value: impl Into<ArcStr>,
    ) -> EditResult<()> {
        let path = path.into();
        let value = value.into();
        if self.doc.instance(&path)?.value == value {
            return Ok(());
        }
        let loc = self.locate_private(&path)?;
        if let Some(inst) = self.doc.statement_mut(&loc).and_then(Statement::instance_mut) {
            inst.value = value;
        }
        tracing::debug!(%path, "set value");
        Ok(())
    }

    /// Replaces the model of the instance at `path`.
    #[inline]
    pub fn set_model(
        &mut self,
        path: impl Into<DesignatorPath>,
        model: impl Into<ArcStr>,
    ) -> EditResult<()> {
        self.set_value(path, model)
    }

    /// Applies [`Editor::set_value`] to each pair, stopping at the first error.
    pub fn set_values<P, V>(&mut self, values: impl IntoIterator<Item = (P, V)>) -> EditResult<()>
    where
        P: Into<DesignatorPath>,
        V: Into<ArcStr>,
    {
        for (path, value) in values {
            self.set_value(path, value)?;
        }
        Ok(())
    }

    /// The value field of the instance at `path` as a number.
    pub fn value_f64(&self, path: impl Into<DesignatorPath>) -> EditResult<f64> {
        let path = path.into();
        let value = self.value(&path)?;
        scan_eng(&value).ok_or(EditError::NotNumeric { path, value })
    }

    /// Writes a number with an engineering suffix into the value field.
    pub fn set_value_f64(&mut self, path: impl Into<DesignatorPath>, value: f64) -> EditResult<()> {
        self.set_value(path, format_eng(value))
    }

    /// The nodes of the instance at `path`.
    pub fn nodes(&self, path: impl Into<DesignatorPath>) -> EditResult<Vec<ArcStr>> {
        Ok(self.doc.instance(&path.into())?.nodes.clone())
    }

    /// The designators of the top-level instances whose type letter is in
    /// `prefixes`; `"*"` selects every instance.
    pub fn components(&self, prefixes: &str) -> Vec<ArcStr> {
        designators(self.doc.statements(), prefixes)
    }

    /// Like [`Editor::components`], within the subcircuit instantiated at `path`.
    pub fn components_in(
        &self,
        path: impl Into<DesignatorPath>,
        prefixes: &str,
    ) -> EditResult<Vec<ArcStr>> {
        let path = path.into();
        let addr = self.doc.subckt_of(&path)?;
        let body = self.doc.scope(&addr).unwrap_or_default();
        Ok(designators(body, prefixes))
    }

    /// Removes the instance at `path`.
    pub fn remove_component(&mut self, path: impl Into<DesignatorPath>) -> EditResult<()> {
        let path = path.into();
        let loc = self.locate_private(&path)?;
        self.doc
            .remove(&loc)
            .ok_or_else(|| EditError::DesignatorNotFound(path.clone()))?;
        tracing::debug!(%path, "removed component");
        Ok(())
    }

    /// Adds an instance line to the top level (empty `scope`) or to the body of
    /// the subcircuit instantiated at `scope`.
    pub fn add_component(
        &mut self,
        scope: impl Into<DesignatorPath>,
        line: &str,
    ) -> EditResult<()> {
        let scope = scope.into();
        let inst = match parse_statement(self.doc.dialect(), line) {
            Ok(StatementKind::Instance(inst)) => inst,
            Ok(_) => {
                return Err(EditError::InvalidStatement {
                    text: line.into(),
                    reason: arcstr::literal!("not a component instance"),
                })
            }
            Err(reason) => {
                return Err(EditError::InvalidStatement {
                    text: line.into(),
                    reason,
                })
            }
        };
        let addr = if scope.is_empty() {
            Vec::new()
        } else {
            self.doc.subckt_of(&scope)?
        };
        if self.doc.find_instance(&addr, &inst.designator).is_some() {
            return Err(EditError::DuplicateDesignator {
                designator: inst.designator,
                scope,
            });
        }
        let addr = self.scope_private(&scope)?;
        let stmts = self.doc.scope(&addr).unwrap_or_default();
        let at = match stmts.iter().rposition(|s| s.as_instance().is_some()) {
            Some(i) => i + 1,
            None if addr.is_empty() => end_of_deck(stmts),
            None => stmts.len(),
        };
        let designator = inst.designator.clone();
        let stmt = Statement::fresh(StatementKind::Instance(inst), self.doc.eol().clone());
        self.doc
            .insert(&addr, at, stmt)
            .ok_or_else(|| EditError::DesignatorNotFound(scope.clone()))?;
        tracing::debug!(%designator, %scope, "added component");
        Ok(())
    }

    /// The location of the last top-level `.param` declaring `name`.
    fn find_param(&self, name: &str) -> Option<Location> {
        self.doc
            .statements()
            .iter()
            .rposition(|s| s.as_param().is_some_and(|decl| decl.get(name).is_some()))
            .map(|index| Location {
                scope: Vec::new(),
                index,
            })
    }

    /// The expression of a top-level parameter.
    pub fn param(&self, name: &str) -> EditResult<ArcStr> {
        self.find_param(name)
            .and_then(|loc| self.doc.statement(&loc))
            .and_then(Statement::as_param)
            .and_then(|decl| decl.get(name))
            .cloned()
            .ok_or_else(|| EditError::ParameterNotFound(name.into()))
    }

    /// Sets a top-level parameter.
    ///
    /// An existing declaration is rewritten in place. Otherwise a new `.param`
    /// line is added after the last top-level `.param`, or before `.backanno`
    /// or `.end` if there is none.
    pub fn set_param(&mut self, name: &str, expr: impl Into<ArcStr>) -> EditResult<()> {
        let expr = expr.into();
        if let Some(loc) = self.find_param(name) {
            if let Some(decl) = self.doc.statement(&loc).and_then(Statement::as_param) {
                if decl.get(name) == Some(&expr) {
                    return Ok(());
                }
            }
            if let Some(decl) = self.doc.statement_mut(&loc).and_then(Statement::param_mut) {
                decl.set(name, expr);
            }
            return Ok(());
        }

        let stmts = self.doc.statements();
        let last_param = stmts.iter().rposition(|s| s.as_param().is_some());
        let mut decl = ParamDecl::new(name, expr);
        if let Some(keyword) = last_param.and_then(|i| stmts[i].as_param()).map(|d| &d.keyword) {
            decl.keyword = keyword.clone();
        }
        let at = match last_param {
            Some(i) => i + 1,
            None => end_of_deck(stmts),
        };
        let stmt = Statement::fresh(StatementKind::Param(decl), self.doc.eol().clone());
        self.doc
            .insert(&[], at, stmt)
            .ok_or_else(|| EditError::ParameterNotFound(name.into()))?;
        tracing::debug!(name, "added parameter");
        Ok(())
    }

    /// Applies [`Editor::set_param`] to each pair, stopping at the first error.
    pub fn set_params<N, E>(&mut self, params: impl IntoIterator<Item = (N, E)>) -> EditResult<()>
    where
        N: AsRef<str>,
        E: Into<ArcStr>,
    {
        for (name, expr) in params {
            self.set_param(name.as_ref(), expr)?;
        }
        Ok(())
    }

    /// The expression of a parameter declared inside the subcircuit
    /// instantiated at `path`, by a body `.param` or a `params:` default.
    pub fn param_in(&self, path: impl Into<DesignatorPath>, name: &str) -> EditResult<ArcStr> {
        let addr = self.doc.subckt_of(&path.into())?;
        let subckt = self.doc.subckt_at(&addr);
        let body_param = subckt
            .into_iter()
            .flat_map(|s| s.body().iter().filter_map(Statement::as_param))
            .filter_map(|decl| decl.get(name))
            .last();
        body_param
            .or_else(|| subckt.and_then(|s| s.param(name)))
            .cloned()
            .ok_or_else(|| EditError::ParameterNotFound(name.into()))
    }

    /// Sets a parameter inside the subcircuit instantiated at `path`,
    /// specializing it first.
    ///
    /// A body `.param` or `params:` default declaring `name` is rewritten;
    /// otherwise a `.param` line is added to the start of the body.
    pub fn set_param_in(
        &mut self,
        path: impl Into<DesignatorPath>,
        name: &str,
        expr: impl Into<ArcStr>,
    ) -> EditResult<()> {
        let path = path.into();
        let expr = expr.into();
        if self.param_in(&path, name).ok().as_ref() == Some(&expr) {
            return Ok(());
        }
        let addr = self.scope_private(&path)?;
        let body = self.doc.scope(&addr).unwrap_or_default();
        let decl_at = body
            .iter()
            .rposition(|s| s.as_param().is_some_and(|d| d.get(name).is_some()));
        let last_param = body.iter().rposition(|s| s.as_param().is_some());
        let in_header = self
            .doc
            .subckt_at(&addr)
            .is_some_and(|s| s.param(name).is_some());

        match decl_at {
            Some(index) => {
                let loc = Location {
                    scope: addr.clone(),
                    index,
                };
                if let Some(decl) = self.doc.statement_mut(&loc).and_then(Statement::param_mut) {
                    decl.set(name, expr);
                }
            }
            None if in_header => {
                let (last, parent) = addr
                    .split_last()
                    .ok_or_else(|| EditError::ParameterNotFound(name.into()))?;
                let loc = Location {
                    scope: parent.to_vec(),
                    index: *last,
                };
                if let Some(subckt) = self.doc.statement_mut(&loc).and_then(Statement::subckt_mut) {
                    subckt.set_param(name, expr);
                }
            }
            None => {
                let at = last_param.map_or(0, |i| i + 1);
                let stmt = Statement::fresh(
                    StatementKind::Param(ParamDecl::new(name, expr)),
                    self.doc.eol().clone(),
                );
                self.doc
                    .insert(&addr, at, stmt)
                    .ok_or_else(|| EditError::DesignatorNotFound(path.clone()))?;
            }
        }
        tracing::debug!(%path, name, "set scoped parameter");
        Ok(())
    }

    /// The parameters visible to the instance at `path`.
    ///
    /// The empty path gives the top-level parameters.
    pub fn param_table(&self, path: impl Into<DesignatorPath>) -> EditResult<ParamTable> {
        self.doc.param_table(&path.into())
    }

    /// Resolves the value field of the instance at `path` in its scope.
    pub fn evaluate(&self, path: impl Into<DesignatorPath>, seed: u64) -> EditResult<f64> {
        let path = path.into();
        let value = self.doc.instance(&path)?.value.clone();
        let table = self.doc.param_table(&path)?;
        Ok(resolve(&value, &table, seed)?)
    }

    /// Resolves `expr` in the scope of the instance at `path` and writes the
    /// result into its value field.
    ///
    /// Returns the resolved value.
    pub fn bind(
        &mut self,
        path: impl Into<DesignatorPath>,
        expr: &str,
        seed: u64,
    ) -> EditResult<f64> {
        let path = path.into();
        let table = self.doc.param_table(&path)?;
        let value = resolve(expr, &table, seed)?;
        self.set_value(path, format_eng(value))?;
        Ok(value)
    }

    /// The top-level directives, excluding `.param`s and subcircuits.
    pub fn instructions(&self) -> Vec<String> {
        self.doc
            .statements()
            .iter()
            .filter(|s| s.as_directive().is_some())
            .map(statement_text)
            .collect()
    }

    /// Adds a directive.
    ///
    /// An identical directive is not added twice. Analysis directives
    /// (`.ac`, `.dc`, `.tran`, `.noise`, `.tf`, `.op`) replace the existing
    /// analysis. Other directives go before `.backanno`, else before `.end`,
    /// else at the end of the deck.
    pub fn add_instruction(&mut self, text: &str) -> EditResult<()> {
        let kind = match parse_statement(self.doc.dialect(), text) {
            Ok(kind @ (StatementKind::Directive(_) | StatementKind::Param(_))) => kind,
            Ok(_) => {
                return Err(EditError::InvalidStatement {
                    text: text.into(),
                    reason: arcstr::literal!("not a directive"),
                })
            }
            Err(reason) => {
                return Err(EditError::InvalidStatement {
                    text: text.into(),
                    reason,
                })
            }
        };
        let wanted = normalize(&kind.to_string());
        let stmts = self.doc.statements();
        if stmts
            .iter()
            .filter(|s| s.keyword().is_some())
            .any(|s| normalize(&statement_text(s)) == wanted)
        {
            return Ok(());
        }

        let is_analysis = |s: &Statement| {
            s.as_directive()
                .is_some_and(|d| UNIQUE_ANALYSES.contains(&d.keyword.to_ascii_lowercase().as_str()))
        };
        let stmt_is_analysis = match &kind {
            StatementKind::Directive(d) => {
                UNIQUE_ANALYSES.contains(&d.keyword.to_ascii_lowercase().as_str())
            }
            _ => false,
        };
        if stmt_is_analysis {
            if let Some(index) = stmts.iter().position(is_analysis) {
                let loc = Location {
                    scope: Vec::new(),
                    index,
                };
                let eol = ArcStr::from(stmts[index].eol());
                let not_found = || EditError::InstructionNotFound(text.into());
                self.doc.remove(&loc).ok_or_else(not_found)?;
                self.doc
                    .insert(&[], index, Statement::fresh(kind, eol))
                    .ok_or_else(not_found)?;
                tracing::debug!(instruction = text, "replaced analysis");
                return Ok(());
            }
        }

        let at = end_of_deck(stmts);
        let stmt = Statement::fresh(kind, self.doc.eol().clone());
        self.doc
            .insert(&[], at, stmt)
            .ok_or_else(|| EditError::InstructionNotFound(text.into()))?;
        tracing::debug!(instruction = text, "added instruction");
        Ok(())
    }

    /// Adds each directive in turn, stopping at the first error.
    pub fn add_instructions<'a>(
        &mut self,
        texts: impl IntoIterator<Item = &'a str>,
    ) -> EditResult<()> {
        for text in texts {
            self.add_instruction(text)?;
        }
        Ok(())
    }

    /// Removes the top-level directive matching `text`, ignoring case and spacing.
    pub fn remove_instruction(&mut self, text: &str) -> EditResult<()> {
        let wanted = normalize(text);
        let index = self
            .doc
            .statements()
            .iter()
            .position(|s| s.keyword().is_some() && normalize(&statement_text(s)) == wanted)
            .ok_or_else(|| EditError::InstructionNotFound(text.into()))?;
        self.doc
            .remove(&Location {
                scope: Vec::new(),
                index,
            })
            .ok_or_else(|| EditError::InstructionNotFound(text.into()))?;
        tracing::debug!(instruction = text, "removed instruction");
        Ok(())
    }
}

fn designators(stmts: &[Statement], prefixes: &str) -> Vec<ArcStr> {
    stmts
        .iter()
        .filter_map(Statement::as_instance)
        .filter(|inst| matches_prefix(&inst.designator, prefixes))
        .map(|inst| inst.designator.clone())
        .collect()
}

/// The index before the first top-level `.backanno`, else `.end`, else the end.
fn end_of_deck(stmts: &[Statement]) -> usize {
    let find = |keyword: &str| {
        stmts
            .iter()
            .position(|s| s.keyword().as_deref() == Some(keyword))
    };
    find(".backanno")
        .or_else(|| find(".end"))
        .unwrap_or(stmts.len())
}
