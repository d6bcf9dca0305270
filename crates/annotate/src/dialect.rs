use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

/// Tokens for a multi-line comment block (`/** ... */`, `"""` pairs, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTokens {
    pub open: &'static str,
    pub close: &'static str,
    /// Prefix repeated on every interior line (`" * "` for C-family blocks,
    /// empty for Python docstring-style blocks).
    pub line_prefix: &'static str,
}

/// Symmetric start/end pair wrapping a single logical comment
/// (`<!-- ... -->` markup comments, bare `/* ... */` in CSS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapTokens {
    pub start: &'static str,
    pub end: &'static str,
}

/// Comment syntax for one file type.
///
/// At least one of the three forms is always present; the registry refuses
/// to hold an empty dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentDialect {
    pub line_token: Option<&'static str>,
    pub block: Option<BlockTokens>,
    pub wrap: Option<WrapTokens>,
}

impl CommentDialect {
    const fn line(token: &'static str) -> Self {
        Self {
            line_token: Some(token),
            block: None,
            wrap: None,
        }
    }

    const fn with_block(
        token: &'static str,
        open: &'static str,
        close: &'static str,
        line_prefix: &'static str,
    ) -> Self {
        Self {
            line_token: Some(token),
            block: Some(BlockTokens {
                open,
                close,
                line_prefix,
            }),
            wrap: None,
        }
    }

    const fn wrap(start: &'static str, end: &'static str) -> Self {
        Self {
            line_token: None,
            block: None,
            wrap: Some(WrapTokens { start, end }),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.line_token.is_some() || self.block.is_some() || self.wrap.is_some()
    }
}

/// C-family doc block: `//` lines, `/** ... */` blocks.
const C_DOC: CommentDialect = CommentDialect::with_block("//", "/**", " */", " * ");
/// Plain C block: `//` lines, `/* ... */` blocks.
const C_PLAIN: CommentDialect = CommentDialect::with_block("//", "/*", " */", " * ");
const HASH: CommentDialect = CommentDialect::line("#");
const MARKUP: CommentDialect = CommentDialect::wrap("<!--", " -->");

/// Extension/filename keyed table of comment dialects.
///
/// Built once at startup; every lookup goes through [`DialectRegistry::resolve`].
pub struct DialectRegistry {
    by_extension: HashMap<&'static str, CommentDialect>,
    by_filename: HashMap<&'static str, CommentDialect>,
}

static BUILTIN: Lazy<DialectRegistry> = Lazy::new(DialectRegistry::build_builtin);

impl DialectRegistry {
    /// The built-in dialect table.
    pub fn builtin() -> &'static DialectRegistry {
        &BUILTIN
    }

    fn build_builtin() -> Self {
        let mut by_extension: HashMap<&'static str, CommentDialect> = HashMap::new();
        let mut by_filename: HashMap<&'static str, CommentDialect> = HashMap::new();

        for ext in [
            ".js", ".jsx", ".ts", ".tsx", ".java", ".cpp", ".cc", ".hpp", ".cs", ".php",
            ".swift", ".kt", ".dart", ".scala",
        ] {
            by_extension.insert(ext, C_DOC);
        }
        for ext in [".c", ".h", ".go", ".rs"] {
            by_extension.insert(ext, C_PLAIN);
        }
        for ext in [".scss", ".sass", ".less"] {
            by_extension.insert(ext, C_PLAIN);
        }

        by_extension.insert(".py", CommentDialect::with_block("#", "\"\"\"", "\"\"\"", ""));
        by_extension.insert(".rb", CommentDialect::with_block("#", "=begin", "=end", ""));
        by_extension.insert(".ps1", CommentDialect::with_block("#", "<#", "#>", ""));
        by_extension.insert(".sql", CommentDialect::with_block("--", "/*", " */", " * "));
        by_extension.insert(".lua", CommentDialect::with_block("--", "--[[", "]]", ""));
        by_extension.insert(".hs", CommentDialect::with_block("--", "{-", "-}", ""));
        by_extension.insert(".m", CommentDialect::with_block("%", "%{", "%}", ""));

        for ext in [
            ".sh", ".bash", ".zsh", ".yml", ".yaml", ".toml", ".r", ".pl",
        ] {
            by_extension.insert(ext, HASH);
        }

        by_extension.insert(".tex", CommentDialect::line("%"));
        by_extension.insert(".ini", CommentDialect::line(";"));
        by_extension.insert(".vim", CommentDialect::line("\""));

        for ext in [".html", ".htm", ".xml", ".svg", ".md", ".markdown"] {
            by_extension.insert(ext, MARKUP);
        }
        // CSS has no line comments; a bare `/* ... */` wraps the whole block.
        by_extension.insert(".css", CommentDialect::wrap("/*", " */"));

        // JSON is deliberately absent: standard JSON has no comment syntax.

        by_filename.insert("dockerfile", HASH);
        by_filename.insert("makefile", HASH);

        debug_assert!(by_extension.values().all(CommentDialect::is_valid));
        debug_assert!(by_filename.values().all(CommentDialect::is_valid));

        Self {
            by_extension,
            by_filename,
        }
    }

    /// Resolve the dialect for a path.
    ///
    /// Special filenames (`Dockerfile`, `Makefile`) win over extension
    /// matches; both lookups are case-insensitive. Returns `None` for
    /// unsupported paths, which callers treat as "never annotate".
    pub fn resolve(&self, path: impl AsRef<Path>) -> Option<&CommentDialect> {
        let path = path.as_ref();

        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            let lowered = name.to_lowercase();
            if let Some(dialect) = self.by_filename.get(lowered.as_str()) {
                return Some(dialect);
            }
        }

        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            let key = format!(".{}", ext.to_lowercase());
            if let Some(dialect) = self.by_extension.get(key.as_str()) {
                return Some(dialect);
            }
        }

        log::debug!("no comment dialect for {}", path.display());
        None
    }
}
