//! Directive parsing: a script's text to an ordered list of [`Task`]s.
//!
//! ## Script Layout
//!
//! ```text
//! //# init --addresses A=0x42
//!
//! //# publish
//! module A::M {
//!     public fun answer(): u64 { 42 }
//! }
//!
//! //# #[expected_failure(abort_code = 7)]
//! //# run --signers A -- A::M::fail
//! ```
//!
//! Lines starting with `//#` are markers. Consecutive markers form one command
//! block; every other line up to the next block is the body. Marker text that
//! starts with `#[` is an annotation on the block's task.
//!
//! Commands are parsed with clap, so each directive's flags are validated here.
//! Values (aliases, literals, argument syntax) are left as text for the executor.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, ValueEnum};

use crate::errors::ParseError;

pub const DIRECTIVES: [&str; 5] = ["init", "publish", "run", "view", "print-bytecode"];

const MARKER: &str = "//#";

// =============================================================================
// Commands
// =============================================================================

/// One directive with its validated flags.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "task",
    no_binary_name = true,
    disable_help_subcommand = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub enum TaskCommand {
    /// Declare addresses and accounts and create the VM state.
    Init(InitCommand),
    /// Publish the module in the task body.
    Publish(PublishCommand),
    /// Run a published function, or the script in the task body.
    Run(RunCommand),
    /// Print a stored resource.
    View(ViewCommand),
    /// Compile the task body and print its listing.
    PrintBytecode(PrintBytecodeCommand),
}

#[derive(Debug, Clone, Default, Args)]
pub struct InitCommand {
    /// Named addresses as NAME=ADDRESS
    #[arg(long = "addresses", value_name = "NAME=ADDRESS", num_args = 1.., value_parser = parse_named_address)]
    pub addresses: Vec<(String, String)>,

    /// Accounts to create; addresses are derived from the names
    #[arg(long = "accounts", value_name = "NAME", num_args = 1..)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct PublishCommand {
    /// Step budget for the publish and its `init_module`
    #[arg(long = "gas-budget", value_name = "N")]
    pub gas_budget: Option<u64>,

    /// Skip the upgrade compatibility check
    #[arg(long = "force-publish")]
    pub force_publish: bool,

    /// Fail if a module with the same id is already published
    #[arg(long = "only-new-module")]
    pub only_new_module: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunCommand {
    /// Transaction signers (aliases or literal addresses)
    #[arg(long = "signers", value_name = "SIGNER", num_args = 1..)]
    pub signers: Vec<String>,

    /// Type arguments for a generic function or script
    #[arg(long = "type-args", value_name = "TYPE", num_args = 1..)]
    pub type_args: Vec<String>,

    /// Transaction arguments
    #[arg(long = "args", value_name = "ARG", num_args = 1..)]
    pub args: Vec<String>,

    /// Step budget for the transaction
    #[arg(long = "gas-budget", value_name = "N")]
    pub gas_budget: Option<u64>,

    /// Function to call as ADDRESS::MODULE::FUNCTION; without it the body is run as a script
    #[arg(value_name = "NAME")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ViewCommand {
    /// Account holding the resource
    #[arg(long = "address", value_name = "ADDRESS")]
    pub address: String,

    /// Resource type as ADDRESS::MODULE::STRUCT, with `<..>` for generic resources
    #[arg(long = "resource", value_name = "TYPE")]
    pub resource: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum UnitInput {
    Module,
    #[default]
    Script,
}

#[derive(Debug, Clone, Default, Args)]
pub struct PrintBytecodeCommand {
    /// What the body is expected to contain
    #[arg(long = "input", value_enum, default_value_t = UnitInput::Script)]
    pub input: UnitInput,
}

fn parse_named_address(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME=ADDRESS, found '{}'", s)),
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// One unit of a script.
#[derive(Debug, Clone)]
pub struct Task {
    /// 0-based position in the script.
    pub number: usize,
    /// The directive, used in rendered headers.
    pub name: String,
    pub start_line: usize,
    pub command_lines_stop: usize,
    pub stop_line: usize,
    pub command: TaskCommand,
    /// Annotation text without the surrounding `#[...]`.
    pub annotations: Vec<String>,
    /// Body text, blank-padded so its line numbers match the script.
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub path: PathBuf,
    pub tasks: Vec<Task>,
}

struct CommandLine<'a> {
    line: usize,
    column: usize,
    text: &'a str,
}

struct Block<'a> {
    start_line: usize,
    command_stop: usize,
    commands: Vec<CommandLine<'a>>,
    annotations: Vec<(usize, usize, &'a str)>,
}

/// Split `text` into tasks.
pub fn parse_script(path: &Path, text: &str) -> Result<Script, ParseError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks: Vec<Block> = Vec::new();
    let mut in_command = false;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        match marker_text(line) {
            Some((column, cmd)) => {
                if !in_command {
                    blocks.push(Block {
                        start_line: line_no,
                        command_stop: line_no,
                        commands: Vec::new(),
                        annotations: Vec::new(),
                    });
                    in_command = true;
                }
                let Some(block) = blocks.last_mut() else {
                    continue;
                };
                block.command_stop = line_no;
                if cmd.is_empty() {
                    continue;
                }
                if cmd.starts_with("#[") {
                    block.annotations.push((line_no, column, cmd));
                } else {
                    block.commands.push(CommandLine {
                        line: line_no,
                        column,
                        text: cmd,
                    });
                }
            }
            None => {
                if blocks.is_empty() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Err(ParseError::new(line_no, 1, "no initial command"));
                }
                in_command = false;
            }
        }
    }

    if blocks.is_empty() {
        return Err(ParseError::new(1, 1, "no initial command"));
    }

    let mut tasks = Vec::with_capacity(blocks.len());
    for (number, block) in blocks.iter().enumerate() {
        let body_end = blocks
            .get(number + 1)
            .map(|next| next.start_line - 1)
            .unwrap_or(lines.len());
        tasks.push(build_task(number, block, &lines, body_end)?);
    }

    Ok(Script {
        path: path.to_path_buf(),
        tasks,
    })
}

fn build_task(
    number: usize,
    block: &Block,
    lines: &[&str],
    body_end: usize,
) -> Result<Task, ParseError> {
    let Some(first) = block.commands.first() else {
        let (line, column) = block
            .annotations
            .first()
            .map(|(l, c, _)| (*l, *c))
            .unwrap_or((block.start_line, 1));
        return Err(ParseError::new(line, column, "annotation without a command"));
    };

    let mut annotations = Vec::with_capacity(block.annotations.len());
    for (line, column, text) in &block.annotations {
        let inner = text
            .strip_prefix("#[")
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| ParseError::new(*line, *column, "malformed annotation"))?;
        annotations.push(inner.trim().to_string());
    }

    let mut tokens = Vec::new();
    for cmd in &block.commands {
        tokens.extend(tokenize(cmd.text).map_err(|(offset, message)| {
            ParseError::new(cmd.line, cmd.column + offset, message)
        })?);
    }
    let directive = tokens.first().cloned().unwrap_or_default();
    if !DIRECTIVES.contains(&directive.as_str()) {
        return Err(ParseError::new(
            first.line,
            first.column,
            format!("unknown directive '{}'", directive),
        ));
    }
    let command = TaskCommand::try_parse_from(&tokens).map_err(|e| {
        ParseError::new(
            first.line,
            first.column,
            format!("invalid '{}' command: {}", directive, clap_message(&e)),
        )
    })?;

    let body_start = block.command_stop + 1;
    let body_lines: &[&str] = if body_start <= body_end {
        &lines[body_start - 1..body_end]
    } else {
        &[]
    };
    let last_text = body_lines.iter().rposition(|l| !l.trim().is_empty());
    let (body, stop_line) = match last_text {
        Some(pos) => {
            check_braces(body_lines, body_start)?;
            let mut padded = vec![""; block.command_stop];
            padded.extend_from_slice(body_lines);
            (Some(padded.join("\n")), body_start + pos)
        }
        None => (None, block.command_stop),
    };

    Ok(Task {
        number,
        name: directive,
        start_line: block.start_line,
        command_lines_stop: block.command_stop,
        stop_line,
        command,
        annotations,
        body,
    })
}

/// Text after `//#` and its 1-based column, when `line` is a marker.
fn marker_text(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix(MARKER)?;
    let cmd = rest.trim();
    let leading = line.len() - trimmed.len() + MARKER.len() + (rest.len() - rest.trim_start().len());
    let column = line[..leading].chars().count() + 1;
    Some((column, cmd))
}

fn clap_message(e: &clap::Error) -> String {
    let rendered = e.to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.trim_start_matches("error: ").trim().to_string()
}

/// Split on ASCII whitespace; double quotes group spaces and stay in the token.
/// Errors carry the 0-based offset of the problem.
fn tokenize(text: &str) -> Result<Vec<String>, (usize, String)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote_start: Option<usize> = None;
    let mut escaped = false;

    for (offset, c) in text.char_indices() {
        if quote_start.is_some() {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                quote_start = None;
            }
            continue;
        }
        if c.is_ascii_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c == '"' {
            quote_start = Some(offset);
        }
        current.push(c);
    }

    if let Some(offset) = quote_start {
        return Err((offset, "unterminated string".to_string()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Braces outside string literals and comments must balance.
fn check_braces(lines: &[&str], first_line: usize) -> Result<(), ParseError> {
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut in_block_comment = false;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = first_line + idx;
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        let mut in_string = false;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            if in_block_comment {
                if c == '*' && next == Some('/') {
                    in_block_comment = false;
                    i += 1;
                }
            } else if in_string {
                if c == '\\' {
                    i += 1;
                } else if c == '"' {
                    in_string = false;
                }
            } else {
                match (c, next) {
                    ('/', Some('/')) => break,
                    ('/', Some('*')) => {
                        in_block_comment = true;
                        i += 1;
                    }
                    ('"', _) => in_string = true,
                    ('{', _) => open.push((line_no, i + 1)),
                    ('}', _) => {
                        if open.pop().is_none() {
                            return Err(ParseError::new(line_no, i + 1, "unmatched '}'"));
                        }
                    }
                    _ => {}
                }
            }
            i += 1;
        }
    }

    match open.pop() {
        Some((line, column)) => Err(ParseError::new(line, column, "unterminated block")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Script, ParseError> {
        parse_script(Path::new("test.move"), text)
    }

    const BASIC: &str = "\
//# init --addresses A=0x42

//# publish
module A::M {
    public fun answer(): u64 { 42 }
}

//# run -- A::M::answer
";

    #[test]
    fn test_splits_tasks_with_spans() {
        let script = parse(BASIC).unwrap();
        assert_eq!(script.tasks.len(), 3);

        let init = &script.tasks[0];
        assert_eq!(init.name, "init");
        assert_eq!((init.start_line, init.stop_line), (1, 1));
        assert!(init.body.is_none());
        match &init.command {
            TaskCommand::Init(cmd) => {
                assert_eq!(cmd.addresses, vec![("A".to_string(), "0x42".to_string())])
            }
            other => panic!("unexpected command {:?}", other),
        }

        let publish = &script.tasks[1];
        assert_eq!(publish.number, 1);
        assert_eq!(publish.command_lines_stop, 3);
        assert_eq!(publish.stop_line, 6);
        let body = publish.body.as_deref().unwrap();
        let body_lines: Vec<&str> = body.lines().collect();
        assert_eq!(body_lines[3], "module A::M {");
        assert!(body_lines[..3].iter().all(|l| l.is_empty()));

        match &script.tasks[2].command {
            TaskCommand::Run(cmd) => assert_eq!(cmd.name.as_deref(), Some("A::M::answer")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_leading_blank_lines_are_skipped() {
        let script = parse("\n\n   \n//# init\n").unwrap();
        assert_eq!(script.tasks[0].start_line, 4);
    }

    #[test]
    fn test_no_initial_command() {
        let err = parse("\nmodule A::M {}\n//# init\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "no initial command");

        assert_eq!(parse("").unwrap_err().message, "no initial command");
    }

    #[test]
    fn test_consecutive_markers_join_and_carry_annotations() {
        let text = "\
//# init

//# #[expected_failure(abort_code = 7)]
//# run --signers 0x1
//#     --args 1 2
//#     -- 0x42::M::f
";
        let script = parse(text).unwrap();
        assert_eq!(script.tasks.len(), 2);
        let run = &script.tasks[1];
        assert_eq!(run.start_line, 3);
        assert_eq!(run.command_lines_stop, 6);
        assert_eq!(run.annotations, vec!["expected_failure(abort_code = 7)"]);
        match &run.command {
            TaskCommand::Run(cmd) => {
                assert_eq!(cmd.signers, vec!["0x1"]);
                assert_eq!(cmd.args, vec!["1", "2"]);
                assert_eq!(cmd.name.as_deref(), Some("0x42::M::f"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_directive_points_at_token() {
        let err = parse("//# init\n\n  //#   frobnicate --x\n").unwrap_err();
        assert_eq!((err.line, err.column), (3, 9));
        assert_eq!(err.message, "unknown directive 'frobnicate'");
    }

    #[test]
    fn test_malformed_flags_are_rejected() {
        let err = parse("//# init\n\n//# view --address A\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.starts_with("invalid 'view' command"), "{}", err.message);

        let err = parse("//# init --addresses A\n").unwrap_err();
        assert!(err.message.contains("NAME=ADDRESS"), "{}", err.message);

        let err = parse("//# publish --gas-budget lots\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_quoted_tokens_keep_spaces() {
        assert_eq!(
            tokenize(r#"run --args "a b" b"c d" x"00""#).unwrap(),
            vec!["run", "--args", "\"a b\"", "b\"c d\"", "x\"00\""]
        );
        assert_eq!(tokenize("run \"open").unwrap_err().0, 4);
    }

    #[test]
    fn test_unbalanced_braces() {
        let err = parse("//# init\n\n//# publish\nmodule A::M {\n    fun f() {\n}\n").unwrap_err();
        assert_eq!((err.line, err.column), (4, 13));
        assert_eq!(err.message, "unterminated block");

        let err = parse("//# publish\nmodule A::M {}\n}\n").unwrap_err();
        assert_eq!((err.line, err.column), (3, 1));
    }

    #[test]
    fn test_braces_in_strings_and_comments_are_ignored() {
        let text = "\
//# publish
module A::M {
    // }
    /* { */
    fun s(): vector<u8> { b\"}\" }
}
";
        assert!(parse(text).is_ok());
    }

    #[test]
    fn test_annotation_without_command() {
        let err = parse("//# init\n\n//# #[expected_failure]\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.message, "annotation without a command");
    }

    #[test]
    fn test_print_bytecode_input_flag() {
        let script = parse("//# print-bytecode --input module\nmodule 0x1::M {}\n").unwrap();
        match &script.tasks[0].command {
            TaskCommand::PrintBytecode(cmd) => assert_eq!(cmd.input, UnitInput::Module),
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(script.tasks[0].name, "print-bytecode");

        let script = parse("//# print-bytecode
script { fun main() {} }
").unwrap();
        match &script.tasks[0].command {
            TaskCommand::PrintBytecode(cmd) => assert_eq!(cmd.input, UnitInput::Script),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_type_args() {
        let script =
            parse("//# run --type-args u8 0x1::string::String --args 1 -- 0x42::M::f
").unwrap();
        match &script.tasks[0].command {
            TaskCommand::Run(cmd) => {
                assert_eq!(cmd.type_args, vec!["u8", "0x1::string::String"]);
                assert_eq!(cmd.args, vec!["1"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
