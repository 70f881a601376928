//! nginx-style configuration text <-> [Directive] trees
//!
//! Only the grammar is handled here: words, quoted strings, `;`, `{ }` blocks and `#` comments.
//! Directive names and argument counts are never checked.
mod build;
mod lex;

pub use build::{build, build_to, BuildError, BuildOptions};

use crate::payload::{Directive, Payload};
use lex::{Token, TokenKind};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Keep `#` comments as comment directives
    pub comments: bool,
    /// Do not follow `include` directives
    pub single_file: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            comments: true,
            single_file: false,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SyntaxError {
    #[error("line {0}: unterminated quoted string")]
    UnterminatedQuote(usize),
    #[error("line {0}: unexpected end of block")]
    UnexpectedBlockEnd(usize),
    #[error("line {0}: unexpected end of file, missing end of block")]
    UnclosedBlock(usize),
    #[error("line {0}: directive name expected")]
    MissingName(usize),
    #[error("line {0}: directive is not terminated by \";\"")]
    MissingTerminator(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("Unable to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration in {}", path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: SyntaxError,
    },
    #[error("Invalid include pattern {pattern:?}")]
    IncludePattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Parses configuration text without touching the filesystem
pub fn parse_str(input: &str, options: &ParseOptions) -> Result<Vec<Directive>, SyntaxError> {
    let tokens = lex::tokenize(input)?;
    let mut tokens = tokens.into_iter().peekable();
    let directives = parse_block(&mut tokens, options, None)?;
    Ok(directives)
}

/// Parses `path` and, unless [ParseOptions::single_file] is set, every file it includes
///
/// Include paths are resolved relative to the directory of `path`. Every file is stored under
/// its canonical path and added once; the `include` directive records the indices of the files
/// it pulled in.
#[tracing::instrument(level = "debug", skip(options))]
pub fn parse(path: &Path, options: &ParseOptions) -> Result<Payload, ParseError> {
    let root = path.canonicalize().map_err(|source| ParseError::Io {
        path: path.to_owned(),
        source,
    })?;
    let base = root.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut payload = Payload::default();
    payload.insert(root.clone(), parse_file(&root, options)?);

    if options.single_file {
        return Ok(payload);
    }

    let mut index = 0;
    while index < payload.config.len() {
        let mut parsed = std::mem::take(&mut payload.config[index].parsed);
        let result = resolve_includes(&mut parsed, &base, &mut payload, options);
        payload.config[index].parsed = parsed;
        result?;
        index += 1;
    }

    Ok(payload)
}

fn parse_file(path: &Path, options: &ParseOptions) -> Result<Vec<Directive>, ParseError> {
    tracing::info!(path=%path.display(), "parsing file");
    let contents = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_owned(),
        source,
    })?;

    parse_str(&contents, options).map_err(|source| ParseError::Syntax {
        path: path.to_owned(),
        source,
    })
}

fn resolve_includes(
    directives: &mut [Directive],
    base: &Path,
    payload: &mut Payload,
    options: &ParseOptions,
) -> Result<(), ParseError> {
    for directive in directives {
        if let Some(block) = directive.block.as_mut() {
            resolve_includes(block, base, payload, options)?;
            continue;
        }

        if directive.directive != "include" || directive.args.len() != 1 {
            continue;
        }

        let mut includes = vec![];
        for file in expand_include(&base.join(&directive.args[0]))? {
            // `./a.conf`, `a.conf` and `sub/../a.conf` are the same file
            let file = file
                .canonicalize()
                .map_err(|source| ParseError::Io { path: file, source })?;
            let index = match payload.config.iter().position(|c| c.file == file) {
                Some(existing) => existing,
                None => {
                    let parsed = parse_file(&file, options)?;
                    payload.insert(file, parsed)
                }
            };
            includes.push(index);
        }

        directive.includes = Some(includes);
    }

    Ok(())
}

/// Expands wildcards in the last path component, a literal path is returned as is
fn expand_include(pattern: &Path) -> Result<Vec<PathBuf>, ParseError> {
    let file_pattern = pattern
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !file_pattern.contains(['*', '?', '[']) {
        return Ok(vec![pattern.to_owned()]);
    }

    let matcher = globset::Glob::new(&file_pattern)
        .map_err(|source| ParseError::IncludePattern {
            pattern: pattern.display().to_string(),
            source,
        })?
        .compile_matcher();

    let dir = pattern.parent().unwrap_or(Path::new("."));
    let io_error = |source: std::io::Error| ParseError::Io {
        path: dir.to_owned(),
        source,
    };

    let mut files = vec![];
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_type().map_err(io_error)?.is_file() && matcher.is_match(entry.file_name()) {
            files.push(entry.path());
        }
    }
    files.sort();

    tracing::debug!(pattern=%pattern.display(), matches=files.len(), "include expanded");
    Ok(files)
}

type Tokens = std::iter::Peekable<std::vec::IntoIter<Token>>;

/// Parses directives until the end of input (`opened_at == None`) or the `}` closing the block
/// opened at line `opened_at`
fn parse_block(
    tokens: &mut Tokens,
    options: &ParseOptions,
    opened_at: Option<usize>,
) -> Result<Vec<Directive>, SyntaxError> {
    let mut directives = vec![];

    loop {
        let Some(token) = tokens.next() else {
            return match opened_at {
                Some(line) => Err(SyntaxError::UnclosedBlock(line)),
                None => Ok(directives),
            };
        };

        let (name, line) = match token.kind {
            TokenKind::BlockEnd => {
                return match opened_at {
                    Some(_) => Ok(directives),
                    None => Err(SyntaxError::UnexpectedBlockEnd(token.line)),
                }
            }
            TokenKind::Comment(text) => {
                if options.comments {
                    directives.push(Directive::comment(token.line, text));
                }
                continue;
            }
            TokenKind::Semicolon | TokenKind::BlockStart => {
                return Err(SyntaxError::MissingName(token.line))
            }
            TokenKind::Word { text, .. } => (text, token.line),
        };

        let mut args = vec![];
        let mut trailing_comments = vec![];
        let directive = loop {
            let Some(token) = tokens.next() else {
                return Err(SyntaxError::MissingTerminator(line));
            };

            match token.kind {
                TokenKind::Word { text, .. } => args.push(text),
                TokenKind::Comment(text) => {
                    trailing_comments.push(Directive::comment(token.line, text))
                }
                TokenKind::Semicolon => break Directive::new(name, line, args),
                TokenKind::BlockStart => {
                    let children = parse_block(tokens, options, Some(token.line))?;
                    break Directive::block(name, line, args, children);
                }
                TokenKind::BlockEnd => return Err(SyntaxError::MissingTerminator(line)),
            }
        };

        directives.push(directive);
        if options.comments {
            directives.append(&mut trailing_comments);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn nested_blocks() {
        let parsed = parse_str(
            "user www www;\nevents {\n    worker_connections 4096;\n}\n",
            &ParseOptions::default(),
        )
        .unwrap();

        assert_eq!(
            parsed,
            vec![
                Directive::new("user", 1, args(&["www", "www"])),
                Directive::block(
                    "events",
                    2,
                    vec![],
                    vec![Directive::new("worker_connections", 3, args(&["4096"]))]
                ),
            ]
        );
    }

    #[test]
    fn comments() {
        let input = "# top\nlisten 80; # same line\n";

        let parsed = parse_str(input, &ParseOptions::default()).unwrap();
        assert_eq!(
            parsed,
            vec![
                Directive::comment(1, " top"),
                Directive::new("listen", 2, args(&["80"])),
                Directive::comment(2, " same line"),
            ]
        );

        let options = ParseOptions {
            comments: false,
            ..Default::default()
        };
        let parsed = parse_str(input, &options).unwrap();
        assert_eq!(parsed, vec![Directive::new("listen", 2, args(&["80"]))]);
    }

    #[test]
    fn syntax_errors() {
        let options = ParseOptions::default();
        assert_eq!(
            parse_str("events {\n", &options).unwrap_err(),
            SyntaxError::UnclosedBlock(1)
        );
        assert_eq!(
            parse_str("listen 80;\n}", &options).unwrap_err(),
            SyntaxError::UnexpectedBlockEnd(2)
        );
        assert_eq!(
            parse_str("listen 80", &options).unwrap_err(),
            SyntaxError::MissingTerminator(1)
        );
        assert_eq!(
            parse_str("; listen 80;", &options).unwrap_err(),
            SyntaxError::MissingName(1)
        );
    }

    #[test]
    fn follows_includes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("conf.d")).unwrap();
        std::fs::write(
            dir.path().join("nginx.conf"),
            "http {\n    include conf.d/*.conf;\n    include proxy.conf;\n}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("proxy.conf"), "proxy_redirect off;\n").unwrap();
        std::fs::write(dir.path().join("conf.d/b.conf"), "listen 81;\n").unwrap();
        std::fs::write(dir.path().join("conf.d/a.conf"), "include proxy.conf;\n").unwrap();
        std::fs::write(dir.path().join("conf.d/skip.txt"), "not parsed").unwrap();

        let payload = parse(&dir.path().join("nginx.conf"), &ParseOptions::default()).unwrap();

        let base = dir.path().canonicalize().unwrap();
        let files: Vec<_> = payload.config.iter().map(|c| c.file.clone()).collect();
        assert_eq!(
            files,
            vec![
                base.join("nginx.conf"),
                base.join("conf.d/a.conf"),
                base.join("conf.d/b.conf"),
                base.join("proxy.conf"),
            ]
        );

        let http = payload.config[0].parsed[0].block.as_ref().unwrap();
        assert_eq!(http[0].includes, Some(vec![1, 2]));
        assert_eq!(http[1].includes, Some(vec![3]));
        // already loaded files are referenced, not parsed again
        assert_eq!(payload.config[1].parsed[0].includes, Some(vec![3]));
    }

    #[test]
    fn equivalent_include_paths_load_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("root/conf.d")).unwrap();
        std::fs::write(
            dir.path().join("root/nginx.conf"),
            "include proxy.conf;\ninclude ./proxy.conf;\ninclude conf.d/../proxy.conf;\ninclude ../up.conf;\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("root/proxy.conf"), "proxy_redirect off;\n").unwrap();
        std::fs::write(dir.path().join("up.conf"), "keepalive 1;\n").unwrap();

        let payload =
            parse(&dir.path().join("root/nginx.conf"), &ParseOptions::default()).unwrap();

        let base = dir.path().canonicalize().unwrap();
        let files: Vec<_> = payload.config.iter().map(|c| c.file.clone()).collect();
        assert_eq!(
            files,
            vec![
                base.join("root/nginx.conf"),
                base.join("root/proxy.conf"),
                base.join("up.conf"),
            ]
        );

        let includes: Vec<_> = payload.config[0]
            .parsed
            .iter()
            .map(|d| d.includes.clone())
            .collect();
        assert_eq!(
            includes,
            vec![Some(vec![1]), Some(vec![1]), Some(vec![1]), Some(vec![2])]
        );
    }

    #[test]
    fn single_file_ignores_includes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nginx.conf"), "include missing.conf;\n").unwrap();

        let options = ParseOptions {
            single_file: true,
            ..Default::default()
        };
        let payload = parse(&dir.path().join("nginx.conf"), &options).unwrap();

        assert_eq!(payload.config.len(), 1);
        assert_eq!(payload.config[0].parsed[0].includes, None);
    }

    #[test]
    fn missing_include_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nginx.conf"), "include missing.conf;\n").unwrap();

        let err = parse(&dir.path().join("nginx.conf"), &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }
}
