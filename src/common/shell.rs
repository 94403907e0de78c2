//! Shell quoting for echoing package manager command lines.

/// Quote a word only if the shell would treat it specially.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars().all(|c| {
        c.is_alphanumeric()
            || matches!(c, '-' | '_' | '=' | '/' | '.' | ':' | ',' | '+' | '@' | '~')
    }) {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Render a program and its arguments as one copy-pasteable line.
pub fn command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(|a| a.as_ref()))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}
