// Branch-wise reconciliation of loan, recovery and disbursement sheets.
//
// Sheets arrive as loose [`table::Table`]s, are normalized against a
// column schema, turned into typed records and then reconciled
// (overdue lists, 2nd-tranche status) or aggregated into per-branch
// summaries with recomputed grand totals.

pub mod aggregate;
pub mod config;
pub mod enrich;
pub mod error;
pub mod flags;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod reconcile;
pub mod records;
pub mod register;
pub mod risk;
pub mod rollup;
pub mod state;
pub mod table;
pub mod target;
pub mod tranche;
pub mod util;

pub use config::Config;
pub use error::{ReconError, Result};
pub use state::{AppState, SheetKind};
pub use table::Table;
