//! Shared constants: directive markers, runtime table names, naming limits.

/// Canonical source extension appended during resolution when absent.
pub const LUA_EXT: &str = ".lua";

/// Opening marker of a conditional directive block (`---@if NAME [literal]`).
pub const DIRECTIVE_IF: &str = "---@if";

/// Branch separator inside a directive block.
pub const DIRECTIVE_ELSE: &str = "---@else";

/// Closing marker of a directive block.
pub const DIRECTIVE_END: &str = "---@end";

/// Marker registering an exported symbol name (`---@export [NAME]`).
pub const EXPORT_MARKER: &str = "---@export";

/// Runtime table collecting registered export names.
pub const EXPORTS_TABLE: &str = "__EXPORTS";

/// Runtime table consulted by inline-mode module lookups.
pub const MODULES_TABLE: &str = "__modules";

/// Preload table that wrapped module fragments assign into.
pub const PRELOAD_TABLE: &str = "package.preload";

/// Compile-time helper splicing a file's contents as a Lua string literal.
pub const HELPER_EMBED: &str = "__embedfile";

/// Compile-time helper splicing a build variable as a Lua literal.
pub const HELPER_BUILDVALUE: &str = "__buildvalue";

/// Hex characters kept from the path hash of an out-of-tree file.
pub const EXT_HASH_LEN: usize = 10;

/// Separator between entries of the module search path.
pub const SEARCH_PATH_SEP: char = ';';

/// Placeholder substituted with the module name in search path templates.
pub const SEARCH_PATH_MARK: char = '?';
