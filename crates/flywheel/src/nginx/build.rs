use crate::payload::Directive;
use std::fmt::Write as _;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Spaces per nesting level
    pub indent: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { indent: 4 }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("line {line}: directive without a name can not be rendered")]
    EmptyName { line: usize },
    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

/// Renders directives as configuration text, one directive per line
pub fn build(directives: &[Directive], options: &BuildOptions) -> Result<String, BuildError> {
    let mut output = String::new();
    render(&mut output, directives, options, 0)?;
    Ok(output)
}

/// [build] into a writer
pub fn build_to<W: std::io::Write>(
    writer: &mut W,
    directives: &[Directive],
    options: &BuildOptions,
) -> Result<(), BuildError> {
    let output = build(directives, options)?;
    writer.write_all(output.as_bytes())?;
    Ok(())
}

fn render(
    output: &mut String,
    directives: &[Directive],
    options: &BuildOptions,
    depth: usize,
) -> Result<(), BuildError> {
    let padding = " ".repeat(depth * options.indent);

    for directive in directives {
        output.push_str(&padding);

        if directive.is_comment() {
            output.push('#');
            output.push_str(directive.comment.as_deref().unwrap_or_default());
            output.push('\n');
            continue;
        }

        if directive.directive.is_empty() {
            return Err(BuildError::EmptyName {
                line: directive.line,
            });
        }

        output.push_str(&quote(&directive.directive));
        for arg in &directive.args {
            output.push(' ');
            output.push_str(&quote(arg));
        }

        match &directive.block {
            None => output.push_str(";\n"),
            Some(block) => {
                output.push_str(" {\n");
                render(output, block, options, depth + 1)?;
                // infallible for String
                let _ = writeln!(output, "{padding}}}");
            }
        }
    }

    Ok(())
}

/// Quotes `value` if the parser would not read it back as a single word
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.ends_with('\\')
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '#' | '"' | '\''));

    if !needs_quotes {
        return value.to_string();
    }

    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nginx::{parse_str, ParseOptions};
    use pretty_assertions::assert_eq;

    #[test]
    fn nested() {
        let directives = vec![
            Directive::comment(1, " generated"),
            Directive::new("user", 2, vec!["www".into(), "www".into()]),
            Directive::block(
                "events",
                3,
                vec![],
                vec![Directive::new("worker_connections", 4, vec!["4096".into()])],
            ),
        ];

        let expected = "# generated\nuser www www;\nevents {\n    worker_connections 4096;\n}\n";
        assert_eq!(build(&directives, &BuildOptions::default()).unwrap(), expected);
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote(r"\.php$"), r"\.php$");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("a b"), "\"a b\"");
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(quote("${host}"), "\"${host}\"");
    }

    #[test]
    fn quoted_args_parse_back() {
        let args: Vec<String> = ["a b", r#"q"uote"#, r"c\d e", "", "x;y", "end\\"]
            .iter()
            .map(|a| a.to_string())
            .collect();
        let directives = vec![Directive::new("log_format", 1, args)];

        let text = build(&directives, &BuildOptions::default()).unwrap();
        let parsed = parse_str(&text, &ParseOptions::default()).unwrap();

        assert_eq!(parsed, directives);
    }

    #[test]
    fn empty_name() {
        let directives = vec![Directive::new("", 7, vec![])];
        assert!(matches!(
            build(&directives, &BuildOptions::default()),
            Err(BuildError::EmptyName { line: 7 })
        ));
    }
}
