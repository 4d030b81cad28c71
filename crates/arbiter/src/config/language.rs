use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Default PATH for compiler and program processes
pub const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Base name of the source file for languages without an entry class
pub const SOURCE_STEM: &str = "solution";

/// Configuration for a programming language
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "LanguageDef")]
pub struct Language {
    /// Human-readable name for the language (e.g., "C++ 17 (GCC)")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// How the language is built and run
    pub toolchain: Toolchain,

    /// Name the public top-level class must carry (e.g. `Solution` for Java)
    pub entry_class: Option<String>,

    /// Wall-clock bound for the build step in milliseconds
    pub compile_timeout_ms: u64,

    /// Run timeout used when a request does not supply one
    pub default_run_timeout_ms: u64,
}

/// Compile/run command pair of a language
#[derive(Debug, Clone)]
pub enum Toolchain {
    /// Needs a build step before it can run
    Compiled { compile: CompileConfig, run: RunConfig },

    /// Runs straight from source
    Interpreted { run: RunConfig },
}

/// On-disk shape of a language table; `compile` is optional there
#[derive(Debug, Clone, Deserialize)]
struct LanguageDef {
    name: String,
    extension: FileExtension,
    #[serde(default)]
    compile: Option<CompileConfig>,
    run: RunConfig,
    #[serde(default)]
    entry_class: Option<String>,
    #[serde(default = "default_compile_timeout")]
    compile_timeout_ms: u64,
    #[serde(default = "default_run_timeout")]
    default_run_timeout_ms: u64,
}

impl From<LanguageDef> for Language {
    fn from(def: LanguageDef) -> Self {
        let toolchain = match def.compile {
            Some(compile) => Toolchain::Compiled {
                compile,
                run: def.run,
            },
            None => Toolchain::Interpreted { run: def.run },
        };
        Self {
            name: def.name,
            extension: def.extension,
            toolchain,
            entry_class: def.entry_class,
            compile_timeout_ms: def.compile_timeout_ms,
            default_run_timeout_ms: def.default_run_timeout_ms,
        }
    }
}

fn default_compile_timeout() -> u64 {
    10_000
}

fn default_run_timeout() -> u64 {
    5_000
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        matches!(self.toolchain, Toolchain::Compiled { .. })
    }

    /// Compile configuration, `None` for interpreted languages
    pub fn compile_config(&self) -> Option<&CompileConfig> {
        match &self.toolchain {
            Toolchain::Compiled { compile, .. } => Some(compile),
            Toolchain::Interpreted { .. } => None,
        }
    }

    /// Run configuration
    pub fn run_config(&self) -> &RunConfig {
        match &self.toolchain {
            Toolchain::Compiled { run, .. } | Toolchain::Interpreted { run } => run,
        }
    }

    /// Get the source file name for this language
    ///
    /// `solution.<ext>`, or `<EntryClass>.<ext>` when the toolchain ties the
    /// file name to the public class.
    pub fn source_name(&self) -> String {
        match self.entry_class {
            Some(ref class) => format!("{class}.{}", self.extension),
            None => format!("{SOURCE_STEM}.{}", self.extension),
        }
    }

    /// Name of the file the run command operates on
    ///
    /// The build artifact for compiled languages, the source otherwise.
    pub fn artifact_name(&self) -> String {
        match self.compile_config() {
            Some(compile) => compile.output_name.clone(),
            None => self.source_name(),
        }
    }

    /// Fully expanded compile command, `None` for interpreted languages
    pub fn compile_command(&self) -> Option<Vec<String>> {
        self.compile_config().map(|compile| {
            Self::expand_command(&compile.command, &self.source_name(), &compile.output_name)
        })
    }

    /// Fully expanded run command
    pub fn run_command(&self) -> Vec<String> {
        Self::expand_command(
            &self.run_config().command,
            &self.source_name(),
            &self.artifact_name(),
        )
    }

    /// Apply source rewrites required by the toolchain before writing
    pub fn prepare_source<'a>(&self, source: &'a str) -> Cow<'a, str> {
        match self.entry_class {
            Some(ref class) => rename_public_class(source, class),
            None => Cow::Borrowed(source),
        }
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], source: &str, binary: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{output}", binary)
                    .replace("{binary}", binary)
            })
            .collect()
    }
}

/// Rename the first `public class` declaration to `name`
///
/// Whole-word references to the old name (constructors, static calls) are
/// renamed along with it. Comments and string, text block and char literals
/// are left untouched.
pub fn rename_public_class<'a>(source: &'a str, name: &str) -> Cow<'a, str> {
    let code = mask_non_code(source);
    let Some(current) = public_class_name(&code) else {
        return Cow::Borrowed(source);
    };
    if current == name {
        return Cow::Borrowed(source);
    }

    let mut renamed = String::with_capacity(source.len() + name.len());
    let mut copied = 0;
    let mut search = 0;
    while let Some(found) = code[search..].find(current) {
        let start = search + found;
        let end = start + current.len();
        search = end;

        let before = code[..start].chars().next_back();
        let after = code[end..].chars().next();
        if before.is_some_and(is_ident_char) || after.is_some_and(is_ident_char) {
            continue;
        }
        renamed.push_str(&source[copied..start]);
        renamed.push_str(name);
        copied = end;
    }
    renamed.push_str(&source[copied..]);
    Cow::Owned(renamed)
}

/// Copy of `source` with comments and literals blanked to spaces
///
/// Byte offsets are preserved, so positions found in the result index
/// `source` directly.
fn mask_non_code(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut masked = String::with_capacity(source.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        let end = if rest.starts_with(b"//") {
            find_bytes(rest, b"\n").map_or(bytes.len(), |p| i + p)
        } else if rest.starts_with(b"/*") {
            find_bytes(&rest[2..], b"*/").map_or(bytes.len(), |p| i + p + 4)
        } else if rest.starts_with(b"\"\"\"") {
            literal_end(bytes, i + 3, b"\"\"\"")
        } else if rest.starts_with(b"\"") {
            literal_end(bytes, i + 1, b"\"")
        } else if rest.starts_with(b"'") {
            literal_end(bytes, i + 1, b"'")
        } else {
            i += 1;
            continue;
        };

        masked.push_str(&source[copied..i]);
        masked.extend(std::iter::repeat_n(' ', end - i));
        copied = end;
        i = end;
    }
    masked.push_str(&source[copied..]);
    masked
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Offset just past the closing delimiter, honoring backslash escapes
fn literal_end(bytes: &[u8], mut i: usize, close: &[u8]) -> usize {
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
        } else if bytes[i..].starts_with(close) {
            return i + close.len();
        } else {
            i += 1;
        }
    }
    bytes.len()
}

fn public_class_name(source: &str) -> Option<&str> {
    let mut search = source;
    while let Some(pos) = search.find("public") {
        let preceded = search[..pos].chars().next_back().is_some_and(is_ident_char);
        let tail = &search[pos + "public".len()..];
        search = tail;
        if preceded || !tail.starts_with(char::is_whitespace) {
            continue;
        }

        let mut words = tail.trim_start();
        // Modifiers may sit between `public` and `class`
        for modifier in ["final ", "abstract "] {
            if let Some(stripped) = words.strip_prefix(modifier) {
                words = stripped.trim_start();
            }
        }
        let Some(after_class) = words.strip_prefix("class") else {
            continue;
        };
        if !after_class.starts_with(char::is_whitespace) {
            continue;
        }

        let ident = after_class.trim_start();
        let end = ident
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(ident.len());
        if end > 0 {
            return Some(&ident[..end]);
        }
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// File extension without dot (e.g., "cpp")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}
    pub command: Vec<String>,

    /// Artifact produced by the compiler (e.g., "solution")
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// PATH for the compiler process
    #[serde(default = "default_path")]
    pub path: String,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}
    pub command: Vec<String>,

    /// Environment Variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// PATH environment variable for the program
    ///
    /// Defaults to "/usr/local/bin:/usr/bin:/bin" if not specified.
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    DEFAULT_PATH.to_owned()
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn file_extension_rejects_all_strings_with_slash(s in ".*/.*") {
            prop_assert!(FileExtension::new(&s).is_err());
        }

        #[test]
        fn file_extension_accepts_alphanumeric(s in "[a-zA-Z0-9_-]+") {
            prop_assert!(FileExtension::new(&s).is_ok());
        }

        #[test]
        fn expand_command_length_preserved(cmd_len in 1usize..10) {
            let cmd: Vec<String> = (0..cmd_len).map(|i| format!("arg{i}")).collect();
            let result = Language::expand_command(&cmd, "source", "binary");
            prop_assert_eq!(result.len(), cmd_len);
        }

        #[test]
        fn rename_public_class_is_idempotent(name in "[A-Z][a-zA-Z0-9]{0,12}") {
            let source = format!("public class {name} {{ {name} x; }}");
            let once = rename_public_class(&source, "Solution").into_owned();
            let twice = rename_public_class(&once, "Solution").into_owned();
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.starts_with("public class Solution"));
        }
    }
}
