//! Named step outputs for the CI runner.
//!
//! With `GITHUB_OUTPUT` set, outputs are appended to that file
//! (`name=value`, or the `name<<DELIM` heredoc form for multi-line values);
//! otherwise they are printed to stdout as `name=value`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

/// Ordered `(name, value)` pairs.
pub type Outputs = Vec<(&'static str, String)>;

const DELIMITER_BASE: &str = "GARDENER_EOF";

/// Destination for step outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    File(PathBuf),
    Stdout,
}

impl OutputSink {
    pub fn write(&self, outputs: &[(&'static str, String)]) -> Result<()> {
        if outputs.is_empty() {
            return Ok(());
        }
        match self {
            Self::File(path) => {
                debug!(path = %path.display(), count = outputs.len(), "writing step outputs");
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("open outputs file {}", path.display()))?;
                write_outputs(&mut file, outputs)
                    .with_context(|| format!("write outputs file {}", path.display()))
            }
            Self::Stdout => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                for (name, value) in outputs {
                    writeln!(lock, "{name}={value}").context("write outputs to stdout")?;
                }
                Ok(())
            }
        }
    }
}

fn write_outputs<W: Write>(out: &mut W, outputs: &[(&'static str, String)]) -> io::Result<()> {
    for (name, value) in outputs {
        if value.contains('\n') {
            let delimiter = heredoc_delimiter(value);
            writeln!(out, "{name}<<{delimiter}")?;
            writeln!(out, "{}", value.trim_end_matches('\n'))?;
            writeln!(out, "{delimiter}")?;
        } else {
            writeln!(out, "{name}={value}")?;
        }
    }
    Ok(())
}

/// A delimiter that does not occur anywhere in `value`.
fn heredoc_delimiter(value: &str) -> String {
    let mut delimiter = DELIMITER_BASE.to_string();
    let mut suffix = 0u32;
    while value.contains(&delimiter) {
        suffix += 1;
        delimiter = format!("{DELIMITER_BASE}_{suffix}");
    }
    delimiter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_values_use_key_value_form() {
        let mut buf = Vec::new();
        write_outputs(
            &mut buf,
            &[("skipped", "false".to_string()), ("category", "lint".to_string())],
        )
        .expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "skipped=false\ncategory=lint\n");
    }

    #[test]
    fn multi_line_values_use_heredoc() {
        let mut buf = Vec::new();
        write_outputs(&mut buf, &[("prompt", "line one\nline two\n".to_string())]).expect("write");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "prompt<<GARDENER_EOF\nline one\nline two\nGARDENER_EOF\n"
        );
    }

    #[test]
    fn delimiter_avoids_collisions_with_value() {
        let value = "a\nGARDENER_EOF\nGARDENER_EOF_1\n";
        assert_eq!(heredoc_delimiter(value), "GARDENER_EOF_2");
    }

    #[test]
    fn file_sink_appends() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out");
        std::fs::write(&path, "existing=1\n").expect("seed");
        OutputSink::File(path.clone())
            .write(&[("pr_number", "7".to_string())])
            .expect("write");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "existing=1\npr_number=7\n"
        );
    }
}
