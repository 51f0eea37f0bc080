#![allow(dead_code)]

use std::cell::RefCell;

use rollout_core::error::{ExitStatus, ProcessExecutionError};
use rollout_core::process::{CommandSpec, ProcessOutput, ProcessRunner};

enum Reply {
    Stdout(String),
    Fail(String),
}

/// Records every command and answers from a script keyed by command-line prefix.
///
/// Commands without a matching rule succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<(String, Reply)>>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, stdout: &str) {
        self.rules
            .borrow_mut()
            .push((prefix.to_string(), Reply::Stdout(stdout.to_string())));
    }

    pub fn fail(&self, prefix: &str, stderr: &str) {
        self.rules
            .borrow_mut()
            .push((prefix.to_string(), Reply::Fail(stderr.to_string())));
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToString::to_string).collect()
    }

    pub fn find(&self, prefix: &str) -> Option<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .find(|spec| spec.to_string().starts_with(prefix))
            .cloned()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|spec| spec.to_string().starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, ProcessExecutionError> {
        self.calls.borrow_mut().push(command.clone());
        let line = command.to_string();
        let rules = self.rules.borrow();
        let reply = rules
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply);

        match reply {
            Some(Reply::Stdout(stdout)) => Ok(ProcessOutput {
                stdout: stdout.clone(),
                stderr: String::new(),
            }),
            Some(Reply::Fail(stderr)) => Err(command.failure(ExitStatus::Code(1), stderr.clone())),
            None => Ok(ProcessOutput::default()),
        }
    }
}

/// `docker image inspect` output listing `layers`.
pub fn inspect_output(layers: &[&str]) -> String {
    let layers: Vec<String> = layers.iter().map(|layer| format!("\"{layer}\"")).collect();
    format!(
        r#"[{{"Id": "sha256:abc", "RootFS": {{"Type": "layers", "Layers": [{}]}}}}]"#,
        layers.join(", ")
    )
}
