//! The in-memory deck: statement tree, subcircuit index and hierarchical lookup.

use std::path::PathBuf;

use arcstr::ArcStr;
use indexmap::IndexMap;
use thiserror::Error;
use unicase::UniCase;

use crate::expr::{EvalError, ParamTable};
use crate::parser::{Dialect, ParseWarning, Parser, Substr};
use crate::path::DesignatorPath;
use crate::statement::{CloneOrigin, Instance, Statement, StatementKind, Subckt};

/// The result type of document and editor operations.
pub type EditResult<T> = Result<T, EditError>;

/// The address of a scope: the indices of the subcircuit statements leading
/// to it, outermost first. The empty address is the top level.
pub type ScopeAddr = Vec<usize>;

/// The position of a statement in a [`Document`].
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Location {
    /// The scope holding the statement.
    pub scope: ScopeAddr,
    /// The index of the statement within its scope.
    pub index: usize,
}

/// An error looking up or editing a deck.
///
/// A failed operation leaves the document unchanged.
#[derive(Debug, Error)]
pub enum EditError {
    /// A path segment names no instance in its scope.
    #[error("designator `{0}` not found")]
    DesignatorNotFound(DesignatorPath),
    /// An instance references a subcircuit that is not visible from its scope.
    #[error("subcircuit `{name}` referenced by `{path}` is not defined")]
    SubcircuitNotDefined {
        /// The subcircuit name.
        name: ArcStr,
        /// The referencing instance.
        path: DesignatorPath,
    },
    /// A path descends into an instance that is not a subcircuit instance.
    #[error("`{0}` is not a subcircuit instance and cannot be descended into")]
    WrongArity(DesignatorPath),
    /// An instance with the same designator already exists in the scope.
    #[error("designator `{designator}` already exists in scope `{scope}`")]
    DuplicateDesignator {
        /// The duplicated designator.
        designator: ArcStr,
        /// The instance path of the scope; empty for the top level.
        scope: DesignatorPath,
    },
    /// No `.param` or `params:` entry declares the parameter.
    #[error("parameter `{0}` not found")]
    ParameterNotFound(ArcStr),
    /// No directive matches the given text.
    #[error("instruction `{0}` not found")]
    InstructionNotFound(ArcStr),
    /// Text supplied by the caller is not a statement of the expected kind.
    #[error("invalid statement `{text}`: {reason}")]
    InvalidStatement {
        /// The supplied text.
        text: ArcStr,
        /// Why it was rejected.
        reason: ArcStr,
    },
    /// A value field is not a plain number.
    #[error("value `{value}` of `{path}` is not numeric")]
    NotNumeric {
        /// The instance.
        path: DesignatorPath,
        /// Its value field.
        value: ArcStr,
    },
    /// An expression could not be resolved.
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// Error trying to read the given file.
    #[error("failed to read file at path `{path:?}`: {err:?}")]
    FailedToRead {
        /// The path we attempted to read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
    /// Error trying to write the given file.
    #[error("failed to write file at path `{path:?}`: {err:?}")]
    FailedToWrite {
        /// The path we attempted to write.
        path: PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

/// A parsed deck.
///
/// Statements are owned by their scope; instances refer to subcircuits by
/// name only, resolved through the scope chain on every lookup.
#[derive(Debug, Clone)]
pub struct Document {
    statements: Vec<Statement>,
    index: IndexMap<UniCase<ArcStr>, Vec<ScopeAddr>>,
    warnings: Vec<ParseWarning>,
    eol: ArcStr,
    dialect: Dialect,
}

impl Location {
    /// Adjusts this location for a statement inserted at `at` in `scope`.
    fn shift_for_insert(&mut self, scope: &[usize], at: usize) {
        shift_addr(&mut self.scope, scope, at);
        if self.scope == scope && self.index >= at {
            self.index += 1;
        }
    }
}

fn shift_addr(addr: &mut [usize], scope: &[usize], at: usize) {
    let depth = scope.len();
    if addr.len() > depth && addr.starts_with(scope) && addr[depth] >= at {
        addr[depth] += 1;
    }
}

impl Document {
    /// Parses a SPICE deck.
    ///
    /// Parsing never fails; see [`Document::warnings`] for lines that were
    /// kept verbatim without being understood.
    pub fn parse(text: impl Into<Substr>) -> Self {
        Self::parse_dialect(text, Dialect::default())
    }

    /// Parses a deck in the given dialect.
    pub fn parse_dialect(text: impl Into<Substr>, dialect: Dialect) -> Self {
        let parsed = Parser::parse(dialect, text);
        tracing::debug!(
            statements = parsed.statements.len(),
            warnings = parsed.warnings.len(),
            "parsed deck"
        );
        let mut doc = Self {
            statements: parsed.statements,
            index: IndexMap::new(),
            warnings: parsed.warnings,
            eol: parsed.eol,
            dialect,
        };
        doc.reindex();
        doc
    }

    /// The top-level statements.
    #[inline]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Lines that were kept verbatim because they could not be understood.
    #[inline]
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// The line terminator used for inserted statements.
    #[inline]
    pub fn eol(&self) -> &ArcStr {
        &self.eol
    }

    /// The dialect this deck was parsed as.
    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) fn reindex(&mut self) {
        fn walk(
            stmts: &[Statement],
            addr: &mut ScopeAddr,
            index: &mut IndexMap<UniCase<ArcStr>, Vec<ScopeAddr>>,
        ) {
            for (i, stmt) in stmts.iter().enumerate() {
                if let Some(subckt) = stmt.as_subckt() {
                    addr.push(i);
                    index
                        .entry(UniCase::new(subckt.name().clone()))
                        .or_default()
                        .push(addr.clone());
                    walk(subckt.body(), addr, index);
                    addr.pop();
                }
            }
        }
        self.index.clear();
        walk(&self.statements, &mut Vec::new(), &mut self.index);
    }

    /// The statements of the scope at `addr`.
    pub fn scope(&self, addr: &[usize]) -> Option<&[Statement]> {
        let mut stmts = self.statements.as_slice();
        for &i in addr {
            stmts = stmts.get(i)?.as_subckt()?.body();
        }
        Some(stmts)
    }

    pub(crate) fn scope_mut(&mut self, addr: &[usize]) -> Option<&mut Vec<Statement>> {
        let mut stmts = &mut self.statements;
        for &i in addr {
            stmts = &mut stmts.get_mut(i)?.subckt_mut()?.body;
        }
        Some(stmts)
    }

    /// The subcircuit defined at `addr`.
    pub fn subckt_at(&self, addr: &[usize]) -> Option<&Subckt> {
        let (last, parent) = addr.split_last()?;
        self.scope(parent)?.get(*last)?.as_subckt()
    }

    /// The statement at `loc`.
    pub fn statement(&self, loc: &Location) -> Option<&Statement> {
        self.scope(&loc.scope)?.get(loc.index)
    }

    pub(crate) fn statement_mut(&mut self, loc: &Location) -> Option<&mut Statement> {
        self.scope_mut(&loc.scope)?.get_mut(loc.index)
    }

    /// Inserts a statement, keeping the subcircuit index current.
    pub(crate) fn insert(&mut self, scope: &[usize], at: usize, stmt: Statement) -> Option<()> {
        let stmts = self.scope_mut(scope)?;
        let at = at.min(stmts.len());
        let is_subckt = stmt.as_subckt().is_some();
        stmts.insert(at, stmt);
        if is_subckt || stmts[at + 1..].iter().any(|s| s.as_subckt().is_some()) {
            self.reindex();
        }
        Some(())
    }

    /// Removes a statement, keeping the subcircuit index current.
    pub(crate) fn remove(&mut self, loc: &Location) -> Option<Statement> {
        let stmts = self.scope_mut(&loc.scope)?;
        if loc.index >= stmts.len() {
            return None;
        }
        let stmt = stmts.remove(loc.index);
        self.reindex();
        Some(stmt)
    }

    /// The top-level subcircuit definition with the given name.
    pub fn subckt(&self, name: &str) -> Option<&Subckt> {
        self.subckt_at(&self.resolve_subckt(name, &[])?)
    }

    /// Every subcircuit definition, grouped by name.
    pub fn subckts(&self) -> impl Iterator<Item = &Subckt> {
        self.index
            .values()
            .flatten()
            .filter_map(|addr| self.subckt_at(addr))
    }

    /// Resolves a subcircuit name as seen from `scope`.
    ///
    /// Definitions in `scope` shadow those of enclosing scopes; among
    /// definitions in the same scope the first one wins.
    pub fn resolve_subckt(&self, name: &str, scope: &[usize]) -> Option<ScopeAddr> {
        let candidates = self.index.get(&UniCase::new(ArcStr::from(name)))?;
        let mut best: Option<&ScopeAddr> = None;
        for addr in candidates {
            let parent = &addr[..addr.len() - 1];
            if !scope.starts_with(parent) {
                continue;
            }
            if best.map_or(true, |b| b.len() < addr.len()) {
                best = Some(addr);
            }
        }
        best.cloned()
    }

    /// The index of the instance named `designator` in `scope`.
    pub fn find_instance(&self, scope: &[usize], designator: &str) -> Option<usize> {
        self.scope(scope)?.iter().position(|stmt| {
            stmt.as_instance()
                .is_some_and(|inst| inst.designator.eq_ignore_ascii_case(designator))
        })
    }

    /// Steps through the subcircuit instance at `path[depth]`.
    ///
    /// Returns the index of the instance in `scope` and the address of the
    /// subcircuit it references.
    fn descend(
        &self,
        path: &DesignatorPath,
        depth: usize,
        scope: &[usize],
    ) -> EditResult<(usize, ScopeAddr)> {
        let here = path.prefix(depth + 1);
        let index = self
            .find_instance(scope, &path[depth])
            .ok_or_else(|| EditError::DesignatorNotFound(here.clone()))?;
        let inst = self
            .scope(scope)
            .and_then(|stmts| stmts[index].as_instance())
            .ok_or_else(|| EditError::DesignatorNotFound(here.clone()))?;
        if !inst.is_subckt_ref() {
            return Err(EditError::WrongArity(here));
        }
        let subckt = self
            .resolve_subckt(&inst.value, scope)
            .ok_or_else(|| EditError::SubcircuitNotDefined {
                name: inst.value.clone(),
                path: here,
            })?;
        Ok((index, subckt))
    }

    /// The scope holding the last designator of `path`.
    pub fn locate_scope(&self, path: &DesignatorPath) -> EditResult<ScopeAddr> {
        if path.is_empty() {
            return Err(EditError::DesignatorNotFound(path.clone()));
        }
        let mut scope = Vec::new();
        for depth in 0..path.len() - 1 {
            scope = self.descend(path, depth, &scope)?.1;
        }
        Ok(scope)
    }

    /// The location of the instance named by `path`.
    pub fn locate(&self, path: &DesignatorPath) -> EditResult<Location> {
        let scope = self.locate_scope(path)?;
        let leaf = &path[path.len() - 1];
        let index = self
            .find_instance(&scope, leaf)
            .ok_or_else(|| EditError::DesignatorNotFound(path.clone()))?;
        Ok(Location { scope, index })
    }

    /// The address of the subcircuit referenced by the instance named by `path`.
    pub fn subckt_of(&self, path: &DesignatorPath) -> EditResult<ScopeAddr> {
        if path.is_empty() {
            return Err(EditError::DesignatorNotFound(path.clone()));
        }
        let mut scope = Vec::new();
        for depth in 0..path.len() {
            scope = self.descend(path, depth, &scope)?.1;
        }
        Ok(scope)
    }

    /// The instance named by `path`.
    pub fn instance(&self, path: &DesignatorPath) -> EditResult<&Instance> {
        let loc = self.locate(path)?;
        self.statement(&loc)
            .and_then(Statement::as_instance)
            .ok_or_else(|| EditError::DesignatorNotFound(path.clone()))
    }

    /// The top-level `.param` assignments, in order.
    pub fn params(&self) -> impl Iterator<Item = (&ArcStr, &ArcStr)> {
        self.statements
            .iter()
            .filter_map(Statement::as_param)
            .flat_map(|decl| decl.assignments.iter().map(|(k, v)| (k, v)))
    }

    /// The parameters visible to the instance named by `path`.
    ///
    /// Top-level `.param`s come first. Each subcircuit level along the path
    /// then adds its `params:` defaults, the overrides given on the instance
    /// and the `.param`s of its body, inner declarations replacing outer ones.
    pub fn param_table(&self, path: &DesignatorPath) -> EditResult<ParamTable> {
        let mut table: ParamTable = self
            .params()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if path.is_empty() {
            return Ok(table);
        }
        let mut scope = Vec::new();
        for depth in 0..path.len() - 1 {
            let (index, sub_addr) = self.descend(path, depth, &scope)?;
            let subckt = self.subckt_at(&sub_addr).ok_or_else(|| {
                EditError::DesignatorNotFound(path.prefix(depth + 1))
            })?;
            table.extend(subckt.params().iter().cloned());
            if let Some(inst) = self.scope(&scope).and_then(|s| s[index].as_instance()) {
                table.extend(inst.params().map(|(k, v)| (k.clone(), v.clone())));
            }
            for decl in subckt.body().iter().filter_map(Statement::as_param) {
                table.extend(decl.assignments.iter().cloned());
            }
            scope = sub_addr;
        }
        Ok(table)
    }

    /// Makes the subcircuits along `path` private to it.
    ///
    /// Every segment of `path` must name a subcircuit instance. Afterwards,
    /// each instance along the path references a subcircuit used by no other
    /// path, so edits below it cannot leak to sibling instances. Copies are
    /// named after their origin and the path prefix (`ORIGIN_XU1_XDUT`),
    /// inserted after their origin between clone markers, and reused by
    /// later calls. Returns the name of the innermost subcircuit.
    pub fn clone_subckt_for_instance(&mut self, path: &DesignatorPath) -> EditResult<ArcStr> {
        if path.is_empty() {
            return Err(EditError::DesignatorNotFound(path.clone()));
        }
        // Check the whole path first so that a failure changes nothing.
        self.subckt_of(path)?;

        let mut scope: ScopeAddr = Vec::new();
        let mut name = ArcStr::default();
        for depth in 0..path.len() {
            let prefix = path.prefix(depth + 1);
            let (index, sub_addr) = self.descend(path, depth, &scope)?;
            let mut loc = Location {
                scope: scope.clone(),
                index,
            };
            let subckt = self
                .subckt_at(&sub_addr)
                .ok_or_else(|| EditError::DesignatorNotFound(prefix.clone()))?;
            if subckt
                .clone_of()
                .is_some_and(|origin| origin.path.matches(&prefix))
            {
                name = subckt.name().clone();
                scope = sub_addr;
                continue;
            }

            let origin = subckt
                .clone_of()
                .map(|c| c.origin.clone())
                .unwrap_or_else(|| subckt.name().clone());
            let target = match self.find_clone(&origin, &prefix, &loc.scope) {
                Some(addr) => addr,
                None => {
                    let clone_name = self.derive_name(&origin, &prefix);
                    let clone = subckt.specialize(
                        clone_name.clone(),
                        CloneOrigin {
                            origin: origin.clone(),
                            path: prefix.clone(),
                        },
                    );
                    let (parent, at) = self.clone_slot(&sub_addr, &origin);
                    let stmt = Statement::fresh(StatementKind::Subckt(clone), self.eol.clone());
                    self.insert(&parent, at, stmt)
                        .ok_or_else(|| EditError::DesignatorNotFound(prefix.clone()))?;
                    loc.shift_for_insert(&parent, at);
                    tracing::debug!(
                        name = %clone_name,
                        origin = %origin,
                        path = %prefix,
                        "specialized subcircuit"
                    );
                    let mut addr = parent;
                    addr.push(at);
                    addr
                }
            };

            let target_name = self
                .subckt_at(&target)
                .map(|s| s.name().clone())
                .ok_or_else(|| EditError::DesignatorNotFound(prefix.clone()))?;
            let current = self
                .statement(&loc)
                .and_then(Statement::as_instance)
                .map(|inst| inst.value.clone());
            if current.as_ref() != Some(&target_name) {
                if let Some(inst) = self.statement_mut(&loc).and_then(Statement::instance_mut) {
                    inst.value = target_name.clone();
                }
            }
            name = target_name;
            scope = target;
        }
        Ok(name)
    }

    /// An existing copy of `origin` made for `path`, visible from `scope`.
    fn find_clone(&self, origin: &str, path: &DesignatorPath, scope: &[usize]) -> Option<ScopeAddr> {
        self.index
            .values()
            .flatten()
            .filter(|addr| scope.starts_with(&addr[..addr.len() - 1]))
            .find(|addr| {
                self.subckt_at(addr)
                    .and_then(Subckt::clone_of)
                    .is_some_and(|c| c.origin.eq_ignore_ascii_case(origin) && c.path.matches(path))
            })
            .cloned()
    }

    /// Where a new copy of the subcircuit at `addr` goes: after it and after
    /// any copies of the same origin that already follow it.
    fn clone_slot(&self, addr: &[usize], origin: &str) -> (ScopeAddr, usize) {
        let (last, parent) = match addr.split_last() {
            Some((last, parent)) => (*last, parent.to_vec()),
            None => return (Vec::new(), self.statements.len()),
        };
        let stmts = self.scope(&parent).unwrap_or_default();
        let mut at = last + 1;
        while stmts
            .get(at)
            .and_then(Statement::as_subckt)
            .and_then(Subckt::clone_of)
            .is_some_and(|c| c.origin.eq_ignore_ascii_case(origin))
        {
            at += 1;
        }
        (parent, at)
    }

    /// A subcircuit name for a copy of `origin` made for `path`.
    fn derive_name(&self, origin: &str, path: &DesignatorPath) -> ArcStr {
        let base = arcstr::format!("{}_{}", origin, path.join("_"));
        let taken = |name: &ArcStr| self.index.contains_key(&UniCase::new(name.clone()));
        if !taken(&base) {
            return base;
        }
        let mut i = 1;
        loop {
            let name = arcstr::format!("{}_{}", base, i);
            if !taken(&name) {
                break name;
            }
            i += 1;
        }
    }
}
