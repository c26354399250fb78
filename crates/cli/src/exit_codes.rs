//! CLI Exit Code Registry
//!
//! Single source of truth for `netinv` exit codes. Scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                              |
//! |---------|-----------|------------------------------------------|
//! | 0       | Universal | Success                                  |
//! | 1       | Universal | General error (unspecified)              |
//! | 2       | Universal | CLI usage error (bad args)               |
//! | 3       | Universal | I/O error (missing file, unreadable CSV) |
//! | 60-69   | import    | Batch import outcomes                    |

// =============================================================================
// Universal (0-3)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure (store errors, unsupported modes).
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unparseable option values.
pub const EXIT_USAGE: u8 = 2;

/// I/O error - missing database or input file, write failure.
pub const EXIT_IO: u8 = 3;

// =============================================================================
// Import (60-69)
// =============================================================================

/// Atomic batch rolled back because at least one row failed.
pub const EXIT_IMPORT_ABORTED: u8 = 60;

/// Per-row batch committed with some failed rows.
pub const EXIT_IMPORT_PARTIAL: u8 = 61;

/// Import config failed to parse or validate.
pub const EXIT_IMPORT_INVALID_CONFIG: u8 = 62;

/// Input header does not match the row schema.
pub const EXIT_IMPORT_SCHEMA_MISMATCH: u8 = 63;

/// Map a batch-level import error to its exit code.
pub fn import_exit_code(err: &netinv_recon::ImportError) -> u8 {
    use netinv_recon::ImportError;
    match err {
        ImportError::Aborted { .. } => EXIT_IMPORT_ABORTED,
        ImportError::ConfigParse(_) | ImportError::ConfigValidation(_) => {
            EXIT_IMPORT_INVALID_CONFIG
        }
        ImportError::SchemaMismatch(_) => EXIT_IMPORT_SCHEMA_MISMATCH,
        ImportError::Unsupported(_) | ImportError::Store(_) => EXIT_ERROR,
    }
}
