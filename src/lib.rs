/// Layout of a disassembly project on disk.
pub mod config;

/// Reading project files, with unsaved local copies taking precedence over the disk.
pub mod source;

/// Vocabulary of the assembler: mnemonics, directives, operators and numeric literals.
pub mod syntax;

/// Parses expressions into a tree and evaluates them.
///
/// For example, `MLEN(DMC01, DMC01_End)` becomes
///
/// ```text
/// ('', ROOT, l=[
///     ('MLEN', FUNCTION_NAME, l=[
///         ('()', FUNCTION_PARAMS, l=[
///             ('', LISTING, l=[('DMC01', SYMBOL, l=[]), ('DMC01_End', SYMBOL, l=[])])])])])
/// ```
pub mod formula;

/// Macro definitions and their expansion.
pub mod macros;

/// Computes the byte layout of the assembled ROM, the way the assembler would, in two passes.
///     - Pass 1: Definitions - labels, RAM variables, constants, functions and macros
///     - Pass 2: Byte accounting - how many bytes each line contributes
pub mod layout;

/// Progress of long running scans.
pub mod progress;

/// Definitions and references of every name in a project, with incremental updates.
pub mod index;

/// Keeps the index up to date on a background thread.
pub mod worker;

/// Text search through all project files.
pub mod search;

/// Logging and chrome tracing setup.
pub mod instrumentation;
