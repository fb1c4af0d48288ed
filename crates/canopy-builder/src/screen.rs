//! Pre-build command screening.
//!
//! Build commands come from user-controlled project configuration and run
//! inside the worker with network access and the worker's credentials in
//! the environment. The screen runs exactly once, before the build command
//! is spawned, and rejects the patterns worth stopping at the front door:
//! recursive filesystem destruction, piping remote code into a shell, and
//! piping the environment to a network tool. Anything subtler is the
//! sandbox's problem, not this filter's.

use std::sync::LazyLock;

use crate::error::{BuildError, BuildResult};

static DESTRUCTIVE_RM: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
    // rm with any flag spelling of recursive+force aimed at / or ~
    regex::Regex::new(r"rm\s+(-[a-zA-Z]*[rR][a-zA-Z]*f[a-zA-Z]*|-[a-zA-Z]*f[a-zA-Z]*[rR][a-zA-Z]*)\s+(/|~)(\s|$|\*)").ok()
});

static REMOTE_CODE_PIPE: LazyLock<Option<regex::Regex>> =
    LazyLock::new(|| regex::Regex::new(r"(curl|wget)\b[^|;&]*\|\s*(ba|z|da)?sh\b").ok());

static ENV_EXFILTRATION: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
    regex::Regex::new(r"\b(env|printenv)\b\s*\|\s*[^|]*\b(curl|wget|nc|ncat)\b").ok()
});

/// Screen a build command before execution.
///
/// Returns [`BuildError::SecurityAbort`] naming the matched category when
/// the command must not run.
pub fn screen_command(command: &str) -> BuildResult<()> {
    let matches = |pattern: &LazyLock<Option<regex::Regex>>| {
        pattern.as_ref().is_some_and(|re| re.is_match(command))
    };

    if matches(&DESTRUCTIVE_RM) {
        return Err(BuildError::SecurityAbort(
            "destructive filesystem command".to_owned(),
        ));
    }
    if matches(&REMOTE_CODE_PIPE) {
        return Err(BuildError::SecurityAbort(
            "remote code piped into a shell".to_owned(),
        ));
    }
    if matches(&ENV_EXFILTRATION) {
        return Err(BuildError::SecurityAbort(
            "environment piped to a network tool".to_owned(),
        ));
    }

    Ok(())
}
