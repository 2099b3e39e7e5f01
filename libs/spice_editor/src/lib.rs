//! Structural editor for SPICE netlists.
//!
//! A deck is parsed into a [`Document`] that keeps the source text of every
//! statement, edited through an [`Editor`], and rendered back out. Lines that
//! were not edited are reproduced byte-for-byte.
//!
//! Edits below a subcircuit instance specialize the subcircuits along the
//! instance path first, so that sibling instances sharing the same definition
//! are unaffected:
//!
//! ```
//! use spice_editor::Editor;
//!
//! let deck = "\
//! XA in out cell
//! XB in out cell
//! .subckt cell a b
//! R1 a b 1k
//! .ends cell
//! .end
//! ";
//! let mut editor = Editor::parse(deck);
//! editor.set_value("XA:R1", "2k").unwrap();
//! assert_eq!(editor.value("XA:R1").unwrap(), "2k");
//! assert_eq!(editor.value("XB:R1").unwrap(), "1k");
//! assert_eq!(editor.value("XA").unwrap(), "cell_XA");
//! ```
#![warn(missing_docs)]

pub mod conv;
pub mod document;
pub mod editor;
pub mod expr;
pub mod netlist;
pub mod parser;
pub mod path;
pub mod statement;
pub mod variants;

pub use conv::{format_eng, scan_eng};
pub use document::{Document, EditError, EditResult, Location};
pub use editor::Editor;
pub use expr::{resolve, EvalError, Function, FunctionRegistry, ParamTable};
pub use netlist::Netlister;
pub use parser::{Dialect, ParseWarning};
pub use path::DesignatorPath;
pub use statement::{
    Arg, CloneOrigin, Directive, Instance, ParamDecl, Statement, StatementKind, Subckt,
};
pub use variants::{Variant, Variants};
