//! Seam to the cell/formula engine.
//!
//! The scheduler never evaluates formulas itself. It drives any [`Sheet`]
//! implementation through `recalculate`, handing it a [`StepContext`] for the
//! scheduling side effects. [`ScriptSheet`] is a small ordered-cell engine
//! used by the CLI and the tests.

mod context;
mod script;
mod value;

pub use context::{Halt, SheetEntry, StepContext, StepEffects};
pub use script::{CellLookup, Formula, NativeFormula, ScriptSheet};
pub use value::{ErrorCode, Value};

use crate::error::Result;

/// A recalculable grid of cells
pub trait Sheet: Send {
    /// Evaluate cells in order starting at index `from`.
    ///
    /// Implementations must stop evaluating as soon as
    /// [`StepContext::is_stopped`] turns true.
    fn recalculate(&mut self, from: usize, ctx: &mut StepContext<'_>) -> Result<()>;

    /// Current value of a named cell
    fn value_at(&self, cell: &str) -> Option<Value>;

    /// Overwrite a cell's value
    fn set_value_at(&mut self, cell: &str, value: Value) -> Result<()>;

    /// Cell names in evaluation order
    fn cell_names(&self) -> Vec<String>;
}
