use anyhow::Result;
use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::decompression::{DecompressionReader, DeferredDecompress};

/// Where the records come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    Path(PathBuf),
}

impl Source {
    /// `-` selects stdin, anything else is a file path
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Source::Stdin
        } else {
            Source::Path(PathBuf::from(arg))
        }
    }

    /// Open the source for sequential reading.
    ///
    /// Failing here is fatal for the run and happens before any pipeline
    /// thread is spawned. Stdin is never read here, so an idle pipe cannot
    /// hold up the start of the run.
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self {
            Source::Stdin => Ok(Box::new(BufReader::new(DeferredDecompress::new(io::stdin())))),
            Source::Path(path) => Ok(Box::new(DecompressionReader::new(path)?)),
        }
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdin => f.write_str("<stdin>"),
            Source::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_arg() {
        assert_eq!(Source::from_arg("-"), Source::Stdin);
        assert_eq!(
            Source::from_arg("data/itcont.txt"),
            Source::Path(PathBuf::from("data/itcont.txt"))
        );
    }

    #[test]
    fn test_open_path_reads_lines() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "a|b")?;
        writeln!(file, "c|d")?;
        file.flush()?;

        let reader = Source::from(file.path()).open()?;
        let lines: Vec<String> = reader.lines().collect::<io::Result<_>>()?;
        assert_eq!(lines, vec!["a|b", "c|d"]);
        Ok(())
    }

    #[test]
    fn test_open_missing_path_fails() {
        let source = Source::from_arg("/no/such/source.txt");
        let err = source.open().err().unwrap();
        assert!(format!("{:#}", err).contains("/no/such/source.txt"));
        assert_eq!(source.to_string(), "/no/such/source.txt");
    }
}
