// SPDX-License-Identifier: MIT

//! Platform studio-launcher resolution, kept pluggable per SPEC_FULL's C3
//! design note: the trait that decides *how to invoke* the studio lives
//! here, parallel to `fleet-port::ProtectionPolicy` deciding what's
//! protected — both are the same "pluggable backend" shape the teacher
//! uses for `AgentDef::build_command`.

use std::path::Path;

/// Resolves a `project_path` and chosen `port` into a spawnable command.
pub trait StudioCommand: Send + Sync {
    /// Returns `(program, args)`. The caller sets `current_dir` separately.
    fn build(&self, project_path: &Path, port: u16) -> (String, Vec<String>);
}

/// Invokes `npx remotion studio --port <n>`, the project-local Remotion
/// CLI being the studio launcher on every platform; only the `npx`
/// executable name differs (`npx.cmd` on Windows).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStudioCommand;

impl StudioCommand for DefaultStudioCommand {
    fn build(&self, _project_path: &Path, port: u16) -> (String, Vec<String>) {
        let program = if cfg!(windows) { "npx.cmd" } else { "npx" };
        let args = vec!["remotion".to_string(), "studio".to_string(), "--port".to_string(), port.to_string()];
        (program.to_string(), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_port_argument() {
        let cmd = DefaultStudioCommand;
        let (_, args) = cmd.build(Path::new("/tmp/project"), 3042);
        assert_eq!(args.last().map(String::as_str), Some("3042"));
    }
}
