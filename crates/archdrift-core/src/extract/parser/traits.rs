//! Core parser trait for language-agnostic code extraction.

use super::result::ParseResult;

/// Language-agnostic parser trait.
///
/// Implement this trait for each language to extract graph fragments from
/// source code. Each parser is responsible for:
///
/// 1. **Declarations**: classes (and their equivalents), functions, methods
/// 2. **Imports**: modules the file depends on
/// 3. **References**: calls and base types, left for the builder to resolve
/// 4. **Routes**: endpoints declared through the language's web frameworks
pub trait Parser: Send + Sync {
    /// Parse a source file.
    ///
    /// # Arguments
    /// * `path` - Path relative to the snapshot root (used for module naming)
    /// * `content` - Source code content
    ///
    /// # Returns
    /// * `Ok(ParseResult)` - Declarations, imports and references
    /// * `Err(String)` - Parse error message
    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, String>;

    /// Human-readable language name.
    fn language_name(&self) -> &'static str;

    /// File extensions this parser handles.
    fn supported_extensions(&self) -> &[&'static str];
}
