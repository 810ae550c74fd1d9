use std::path::PathBuf;

/// Typed failure taxonomy for the analysis pipeline. Carried inside
/// `anyhow::Error` so call sites keep the usual `?` flow while callers
/// (and tests) can still downcast to the specific failure.
#[derive(Debug, thiserror::Error)]
pub enum MaatError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("expected reply file is missing: [{0}]")]
    MissingReply(PathBuf),

    #[error("cmake version [{found}] is not supported, minimum is [{required}]")]
    UnsupportedVersion { required: String, found: String },

    #[error("tool invocation failed: {tool}: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("unrecognized toolchain layout for compiler [{compiler}]: {message}")]
    UnknownToolchainLayout { compiler: PathBuf, message: String },

    #[error("no supported toolchain found in the toolchains reply")]
    NoSupportedToolchain,

    #[error("ruleset [{0}] was not found locally or in the official rulesets directory")]
    RulesetNotFound(String),

    #[error("failed to extract compiler environment: {0}")]
    EnvironmentExtraction(String),

    #[error("no analyzable sources were produced from the codemodel")]
    NoAnalyzableSources,
}

#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .expect("Short function name")
    }};
}

#[macro_export]
macro_rules! bail_loc {
    ($msg:expr) => {
        anyhow::bail!("[{}:{} - {}] {}", file!(), function_name!(), line!(), $msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        anyhow::bail!("[{}:{} - {}] {}", file!(), function_name!(), line!(), format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! anyhow_loc {
    ($msg:expr) => {
        anyhow::anyhow!("[{}:{} - {}] {}", file!(), function_name!(), line!(), $msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        anyhow::anyhow!("[{}:{} - {}] {}", file!(), function_name!(), line!(), format!($fmt, $($arg)*))
    };
}
