//! Human-readable renditions of commands, captured output and pipeline
//! failures.

use crate::stream::Env;

/// Render a captured output value for a diagnostic block.
///
/// An empty value renders as ` <empty>`; otherwise the value starts on
/// its own line and every line is indented by a tab.
pub fn fmtout(s: &str) -> String {
    if s.is_empty() {
        return " <empty>\n".to_string();
    }
    let s = s.trim_end_matches('\n');
    format!("\n\t{}\n", s.replace('\n', "\n\t"))
}

/// Shell-quote an argument vector.
pub fn shell_join(args: &[String]) -> String {
    shell_words::join(args)
}

/// Render an invocation: sorted environment assignments followed by the
/// shell-quoted argument vector.
pub fn describe_command(env: &Env, args: &[String]) -> String {
    let mut ret = String::new();
    for (k, v) in env.iter() {
        ret.push_str(k);
        ret.push('=');
        ret.push_str(&shell_words::quote(v));
        ret.push(' ');
    }
    ret.push_str(&shell_join(args));
    ret
}

/// Render a pipeline as `a | b | c`.
///
/// When `failed` names a stage, the error is printed after that stage
/// and the rest of the chain continues on the next line.
pub fn render_pipeline(stages: &[String], failed: Option<(usize, &str)>) -> String {
    let mut ret = String::new();
    let last = stages.len().saturating_sub(1);
    for (i, stage) in stages.iter().enumerate() {
        ret.push_str(stage);
        match failed {
            Some((off, err)) if off == i => {
                if i == last {
                    ret.push_str(" <- ");
                    ret.push_str(err);
                } else {
                    ret.push_str(" | <- ");
                    ret.push_str(err);
                    ret.push('\n');
                }
            }
            _ if i < last => ret.push_str(" | "),
            _ => {}
        }
    }
    ret
}

/// Trim trailing newlines from captured output.
pub(crate) fn trim_output(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\n')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fmtout_empty() {
        assert_eq!(fmtout(""), " <empty>\n");
    }

    #[test]
    fn test_fmtout_multiline() {
        assert_eq!(fmtout("a\nb\n\n"), "\n\ta\n\tb\n");
    }

    #[test]
    fn test_shell_join_quotes_spaces() {
        assert_eq!(
            shell_join(&strings(&["echo", "hello world"])),
            "echo 'hello world'"
        );
    }

    #[test]
    fn test_describe_command_sorts_env() {
        let mut env = Env::new();
        env.set("ZED", "1");
        env.set("ALPHA", "two words");
        assert_eq!(
            describe_command(&env, &strings(&["pwd"])),
            "ALPHA='two words' ZED=1 pwd"
        );
    }

    #[test]
    fn test_render_pipeline_plain() {
        let stages = strings(&["echo hi", "tr a-z A-Z"]);
        assert_eq!(render_pipeline(&stages, None), "echo hi | tr a-z A-Z");
    }

    #[test]
    fn test_render_pipeline_failure_in_middle() {
        let stages = strings(&["busybox ls /bad_directory", "tr a-z A-Z"]);
        assert_eq!(
            render_pipeline(&stages, Some((0, "exit status 1"))),
            "busybox ls /bad_directory | <- exit status 1\ntr a-z A-Z"
        );
    }

    #[test]
    fn test_render_pipeline_failure_at_end() {
        let stages = strings(&["<stream>", "false"]);
        assert_eq!(
            render_pipeline(&stages, Some((1, "exit status 1"))),
            "<stream> | false <- exit status 1"
        );
    }

    #[test]
    fn test_trim_output() {
        assert_eq!(trim_output(b"hello world\n\n"), "hello world");
        assert_eq!(trim_output(b"  keep  \n"), "  keep  ");
    }
}
